use crate::math::StatsHelper;
use crate::model::{ColumnOutlierPolicy, Dataset, OutlierSettings};
use crate::prelude::StageResult;
use crate::telemetry::LogManager;

/// Outlier detection and replacement: per column, an IQR pass followed by
/// a Z-score pass, the second observing the first's replacements.
pub struct OutlierEngine {
    logger: LogManager,
}

impl OutlierEngine {
    pub fn new() -> Self {
        Self {
            logger: LogManager::new(),
        }
    }

    /// Replaces outliers in the target columns. Row count and column set
    /// are preserved; columns absent from the dataset or without an
    /// effective policy are left untouched. Pure in (data, settings).
    pub fn apply(
        &self,
        data: &Dataset,
        targets: &[&str],
        settings: &OutlierSettings,
    ) -> StageResult<Dataset> {
        settings.validate()?;
        let mut output = data.clone();
        for column in targets {
            let Some(policy) = settings.policy_for(column) else {
                continue;
            };
            let Some(values) = data.channel(column) else {
                continue;
            };
            let (replaced, flags) = Self::process_column(values, &policy);
            if flags > 0 {
                self.logger
                    .record(&format!("outlier pass replaced {} values in {}", flags, column));
            }
            output.set_channel(column, replaced)?;
        }
        Ok(output)
    }

    fn process_column(
        values: &[Option<f64>],
        policy: &ColumnOutlierPolicy,
    ) -> (Vec<Option<f64>>, usize) {
        let original: Vec<f64> = values.iter().flatten().copied().collect();
        // Last-resort replacement: median of the valid original values,
        // computed once before any pass runs.
        let fallback = StatsHelper::median(&original);
        let mut current: Vec<Option<f64>> = values.to_vec();
        let mut total_flags = 0;

        if policy.use_iqr {
            let multiplier = policy.iqr_multiplier;
            total_flags += Self::run_pass(&mut current, fallback, |defined| {
                if defined.is_empty() {
                    return None;
                }
                let mut sorted = defined.to_vec();
                sorted.sort_by(f64::total_cmp);
                let (q1, q3) = StatsHelper::quartiles(&sorted);
                let iqr = q3 - q1;
                Some((q1 - multiplier * iqr, q3 + multiplier * iqr))
            });
        }
        if policy.use_z_score {
            let threshold = policy.z_score_threshold;
            total_flags += Self::run_pass(&mut current, fallback, |defined| {
                let std = StatsHelper::population_std(defined);
                if std == 0.0 {
                    return None;
                }
                let mean = StatsHelper::mean(defined);
                Some((mean - threshold * std, mean + threshold * std))
            });
        }
        (current, total_flags)
    }

    /// One detection pass: `bounds` maps the currently defined values to an
    /// acceptance interval (or `None` to skip the pass); values outside it
    /// are flagged and replaced from the nearest unflagged neighbours.
    fn run_pass<F>(current: &mut [Option<f64>], fallback: f64, bounds: F) -> usize
    where
        F: FnOnce(&[f64]) -> Option<(f64, f64)>,
    {
        let defined: Vec<f64> = current.iter().flatten().copied().collect();
        let Some((lo, hi)) = bounds(&defined) else {
            return 0;
        };
        let flagged: Vec<bool> = current
            .iter()
            .map(|value| matches!(value, Some(v) if *v < lo || *v > hi))
            .collect();
        let count = flagged.iter().filter(|&&flag| flag).count();
        if count == 0 {
            return 0;
        }
        // Replacements within a pass observe the pre-pass values, so the
        // scan order cannot influence the result.
        let snapshot: Vec<Option<f64>> = current.to_vec();
        for row in 0..current.len() {
            if !flagged[row] {
                continue;
            }
            let prev = (0..row)
                .rev()
                .find_map(|j| if flagged[j] { None } else { snapshot[j] });
            let next = (row + 1..current.len())
                .find_map(|j| if flagged[j] { None } else { snapshot[j] });
            current[row] = Some(match (prev, next) {
                (Some(p), Some(n)) => (p + n) / 2.0,
                (Some(p), None) => p,
                (None, Some(n)) => n,
                (None, None) => fallback,
            });
        }
        count
    }
}

impl Default for OutlierEngine {
    fn default() -> Self {
        Self::new()
    }
}
