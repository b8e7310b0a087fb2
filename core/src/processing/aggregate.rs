use crate::math::StatsHelper;
use crate::model::{is_registered, AggregateMethod, AggregationPolicy, AggregationWindow, Dataset};
use crate::prelude::StageResult;
use crate::telemetry::LogManager;

/// Reduces consecutive windows of rows to one output row each.
///
/// Registered numeric channels are reduced with the configured method;
/// everything else (non-registered channels, auxiliary columns) takes the
/// window's first row value. `Index` and `Travelled` anchor to the first
/// row, so position is carried, never averaged.
pub struct AggregationEngine {
    logger: LogManager,
}

impl AggregationEngine {
    pub fn new() -> Self {
        Self {
            logger: LogManager::new(),
        }
    }

    pub fn aggregate(&self, data: &Dataset, policy: &AggregationPolicy) -> StageResult<Dataset> {
        policy.validate()?;
        if data.is_empty() {
            return Ok(data.empty_schema());
        }

        let windows = match policy.window {
            AggregationWindow::Rows(size) => Self::row_windows(data.len(), size),
            AggregationWindow::Distance(interval) => {
                Self::distance_windows(data.travelled(), interval)
            }
        };
        self.logger.record(&format!(
            "aggregating {} rows into {} windows",
            data.len(),
            windows.len()
        ));

        let index = windows
            .iter()
            .map(|&(start, _)| data.index()[start])
            .collect();
        let travelled = windows
            .iter()
            .map(|&(start, _)| data.travelled()[start])
            .collect();
        let mut output = Dataset::from_parts(index, travelled)?;

        let channel_names: Vec<String> = data.channel_names().map(str::to_string).collect();
        for name in channel_names {
            let Some(column) = data.channel(&name) else {
                continue;
            };
            let reduced: Vec<Option<f64>> = if is_registered(&name) {
                windows
                    .iter()
                    .map(|&(start, end)| {
                        let values: Vec<f64> =
                            column[start..end].iter().flatten().copied().collect();
                        if values.is_empty() {
                            None
                        } else {
                            Some(Self::reduce(&values, policy))
                        }
                    })
                    .collect()
            } else {
                windows.iter().map(|&(start, _)| column[start]).collect()
            };
            output.set_channel(&name, reduced)?;
        }

        let aux_names: Vec<String> = data.aux_names().map(str::to_string).collect();
        for name in aux_names {
            let Some(column) = data.aux(&name) else {
                continue;
            };
            let first_values = windows
                .iter()
                .map(|&(start, _)| column[start].clone())
                .collect();
            output.set_aux(&name, first_values)?;
        }

        Ok(output)
    }

    fn reduce(values: &[f64], policy: &AggregationPolicy) -> f64 {
        match policy.method {
            AggregateMethod::Median => StatsHelper::median(values),
            AggregateMethod::Mean => StatsHelper::mean(values),
            AggregateMethod::Ema => StatsHelper::ema(values, policy.ema_span),
        }
    }

    /// Consecutive, non-overlapping `size`-row windows; the final window may
    /// be short. Yields `ceil(len / size)` windows.
    fn row_windows(len: usize, size: usize) -> Vec<(usize, usize)> {
        (0..len)
            .step_by(size.max(1))
            .map(|start| (start, (start + size).min(len)))
            .collect()
    }

    /// Buckets rows by `floor((travelled - travelled[0]) / interval)`.
    /// Rows are already sorted by `travelled`, so each bucket is one
    /// contiguous span; empty buckets emit no window.
    fn distance_windows(travelled: &[f64], interval: f64) -> Vec<(usize, usize)> {
        let mut windows = Vec::new();
        let Some(&origin) = travelled.first() else {
            return windows;
        };
        let mut start = 0;
        let mut bucket = 0i64;
        for (row, &position) in travelled.iter().enumerate().skip(1) {
            let row_bucket = ((position - origin) / interval).floor() as i64;
            if row_bucket != bucket {
                windows.push((start, row));
                start = row;
                bucket = row_bucket;
            }
        }
        windows.push((start, travelled.len()));
        windows
    }
}

impl Default for AggregationEngine {
    fn default() -> Self {
        Self::new()
    }
}
