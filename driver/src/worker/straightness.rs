use trackcore::compute::ProgressUpdate;
use trackcore::math::StatsHelper;
use trackcore::model::{AnalysisWindowPolicy, CorrectionFactor, Dataset};
use trackcore::prelude::{StageError, StageResult};

/// Straightness: per spatial interval, the population standard deviation
/// of the `Level3` and `Level4` rail readings. Output rows sit at the
/// interval midpoint; intervals without rows emit nothing.
pub fn compute(
    data: &Dataset,
    window: &AnalysisWindowPolicy,
    correction: Option<CorrectionFactor>,
    progress: Option<&dyn Fn(ProgressUpdate)>,
) -> StageResult<Dataset> {
    if data.is_empty() {
        return Ok(Dataset::new());
    }
    let level3 = channel(data, "Level3")?;
    let level4 = channel(data, "Level4")?;
    let factor = correction.unwrap_or_default();

    let intervals = spatial_intervals(data.travelled(), window.interval_m);
    let total = intervals.len();
    let mut output = Dataset::new();
    for (done, interval) in intervals.into_iter().enumerate() {
        let rows = interval.start_row..interval.end_row;
        let deviation3 = factor.apply(windowed_std(&level3[rows.clone()]));
        let deviation4 = factor.apply(windowed_std(&level4[rows]));
        output.push_row(
            data.index()[interval.start_row],
            interval.midpoint,
            &[("Level3", Some(deviation3)), ("Level4", Some(deviation4))],
        );
        if let Some(report) = progress {
            report(ProgressUpdate {
                done: done + 1,
                total,
            });
        }
    }
    Ok(output)
}

/// Deviation over the defined readings of one interval; fewer than two
/// readings deviate by zero.
fn windowed_std(values: &[Option<f64>]) -> f64 {
    let defined: Vec<f64> = values.iter().flatten().copied().collect();
    if defined.len() <= 1 {
        return 0.0;
    }
    StatsHelper::population_std(&defined)
}

pub(crate) struct SpatialInterval {
    pub start_row: usize,
    pub end_row: usize,
    pub midpoint: f64,
}

/// Non-empty `[start, start + interval)` spans walked from the first
/// `travelled` value. Rows are already sorted by position, so each span
/// is one contiguous row range.
pub(crate) fn spatial_intervals(travelled: &[f64], interval: f64) -> Vec<SpatialInterval> {
    let mut intervals = Vec::new();
    let (Some(&min), Some(&max)) = (travelled.first(), travelled.last()) else {
        return intervals;
    };
    let mut start = min;
    let mut row = 0;
    while start < max {
        let end = start + interval;
        let start_row = row;
        while row < travelled.len() && travelled[row] < end {
            row += 1;
        }
        if row > start_row {
            intervals.push(SpatialInterval {
                start_row,
                end_row: row,
                midpoint: (start + end) / 2.0,
            });
        }
        start = end;
    }
    intervals
}

fn channel<'a>(data: &'a Dataset, name: &str) -> StageResult<&'a [Option<f64>]> {
    data.channel(name)
        .ok_or_else(|| StageError::Computation(format!("missing channel {}", name)))
}
