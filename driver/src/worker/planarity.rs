use trackcore::compute::ProgressUpdate;
use trackcore::math::StatsHelper;
use trackcore::model::{AggregateMethod, AnalysisWindowPolicy, CorrectionFactor, Dataset};
use trackcore::prelude::{StageError, StageResult};

use crate::worker::straightness::spatial_intervals;

/// Half wheelbase and half track width in millimeters: the longitudinal
/// and lateral offsets of the four wheel contact points.
const HALF_WHEELBASE_MM: f64 = 1500.0;
const HALF_TRACK_MM: f64 = 750.0;

/// Planarity: aggregate the `Level1`/`Level2` rail levels per spatial
/// interval, then treat each consecutive interval pair as the four wheel
/// contact heights of a vehicle. Fit a plane through every
/// three-point subset and take the largest z-axis distance of the
/// excluded corner as `PL`.
pub fn compute(
    data: &Dataset,
    window: &AnalysisWindowPolicy,
    correction: Option<CorrectionFactor>,
    progress: Option<&dyn Fn(ProgressUpdate)>,
) -> StageResult<Dataset> {
    if data.is_empty() {
        return Ok(Dataset::new());
    }
    let level1 = channel(data, "Level1")?;
    let level2 = channel(data, "Level2")?;
    let factor = correction.unwrap_or_default();

    let windows: Vec<AggregatedWindow> = spatial_intervals(data.travelled(), window.interval_m)
        .into_iter()
        .map(|interval| {
            let rows = interval.start_row..interval.end_row;
            AggregatedWindow {
                index: data.index()[interval.start_row],
                travelled: interval.midpoint,
                level1: reduce(&level1[rows.clone()], window),
                level2: reduce(&level2[rows], window),
            }
        })
        .collect();

    let total = windows.len().saturating_sub(1);
    let mut output = Dataset::new();
    for (done, pair) in windows.windows(2).enumerate() {
        let (previous, current) = (&pair[0], &pair[1]);
        // Front corners carry the current window, rear corners the
        // previous one; left is Level2, right is Level1.
        let front_left = [HALF_WHEELBASE_MM, HALF_TRACK_MM, current.level2];
        let front_right = [HALF_WHEELBASE_MM, -HALF_TRACK_MM, current.level1];
        let rear_left = [-HALF_WHEELBASE_MM, HALF_TRACK_MM, previous.level2];
        let rear_right = [-HALF_WHEELBASE_MM, -HALF_TRACK_MM, previous.level1];
        let corners = [front_left, front_right, rear_left, rear_right];

        let mut planarity = 0.0f64;
        for excluded in 0..4 {
            let kept: Vec<[f64; 3]> = (0..4)
                .filter(|&corner| corner != excluded)
                .map(|corner| corners[corner])
                .collect();
            let plane = plane_from_points(kept[0], kept[1], kept[2]);
            planarity = planarity.max(z_axis_distance(plane, corners[excluded]).abs());
        }

        output.push_row(
            current.index,
            current.travelled,
            &[
                ("Level1", Some(current.level1)),
                ("Level2", Some(current.level2)),
                ("FLH", Some(front_left[2])),
                ("FRH", Some(front_right[2])),
                ("RLH", Some(rear_left[2])),
                ("RRH", Some(rear_right[2])),
                ("PL", Some(factor.apply(planarity))),
            ],
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

struct AggregatedWindow {
    index: u64,
    travelled: f64,
    level1: f64,
    level2: f64,
}

fn reduce(values: &[Option<f64>], window: &AnalysisWindowPolicy) -> f64 {
    let defined: Vec<f64> = values.iter().flatten().copied().collect();
    if defined.is_empty() {
        return 0.0;
    }
    match window.method {
        AggregateMethod::Median => StatsHelper::median(&defined),
        AggregateMethod::Mean => StatsHelper::mean(&defined),
        AggregateMethod::Ema => StatsHelper::ema(&defined, window.ema_span),
    }
}

/// Plane `ax + by + cz + d = 0` through three points, normal normalized.
fn plane_from_points(p1: [f64; 3], p2: [f64; 3], p3: [f64; 3]) -> [f64; 4] {
    let v1 = [p2[0] - p1[0], p2[1] - p1[1], p2[2] - p1[2]];
    let v2 = [p3[0] - p1[0], p3[1] - p1[1], p3[2] - p1[2]];
    let mut normal = [
        v1[1] * v2[2] - v1[2] * v2[1],
        v1[2] * v2[0] - v1[0] * v2[2],
        v1[0] * v2[1] - v1[1] * v2[0],
    ];
    let magnitude =
        (normal[0] * normal[0] + normal[1] * normal[1] + normal[2] * normal[2]).sqrt();
    if magnitude > 1e-12 {
        for component in &mut normal {
            *component /= magnitude;
        }
    }
    let d = -(normal[0] * p1[0] + normal[1] * p1[1] + normal[2] * p1[2]);
    [normal[0], normal[1], normal[2], d]
}

/// Signed distance from `point` to the plane along the z axis. A plane
/// parallel to z has no such distance and reports zero.
fn z_axis_distance(plane: [f64; 4], point: [f64; 3]) -> f64 {
    let [a, b, c, d] = plane;
    if c.abs() < 1e-12 {
        return 0.0;
    }
    let plane_z = -(a * point[0] + b * point[1] + d) / c;
    point[2] - plane_z
}

fn channel<'a>(data: &'a Dataset, name: &str) -> StageResult<&'a [Option<f64>]> {
    data.channel(name)
        .ok_or_else(|| StageError::Computation(format!("missing channel {}", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(rows: &[(f64, f64, f64)]) -> Dataset {
        let mut data = Dataset::new();
        for (row, &(travelled, level1, level2)) in rows.iter().enumerate() {
            data.push_row(
                row as u64 + 1,
                travelled,
                &[("Level1", Some(level1)), ("Level2", Some(level2))],
            );
        }
        data
    }

    fn meter_window() -> AnalysisWindowPolicy {
        AnalysisWindowPolicy {
            interval_m: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn coplanar_corners_have_zero_planarity() {
        let data = dataset(&[(0.0, 2.0, 2.0), (0.5, 2.0, 2.0), (1.0, 2.0, 2.0), (1.5, 2.0, 2.0)]);
        let output = compute(&data, &meter_window(), None, None).unwrap();
        assert_eq!(output.len(), 1);
        assert_eq!(output.channel("PL").unwrap(), &[Some(0.0)]);
        assert_eq!(output.channel("FLH").unwrap(), &[Some(2.0)]);
        assert_eq!(output.channel("RRH").unwrap(), &[Some(2.0)]);
    }

    #[test]
    fn one_lifted_corner_measures_its_height() {
        // Three corners at zero, the front-left (current Level2) at 4 mm:
        // the plane through the flat corners puts the twist at exactly 4.
        let data = dataset(&[(0.0, 0.0, 0.0), (0.5, 0.0, 0.0), (1.0, 0.0, 4.0), (1.5, 0.0, 4.0)]);
        let output = compute(&data, &meter_window(), None, None).unwrap();
        assert_eq!(output.len(), 1);
        let pl = output.channel("PL").unwrap()[0].unwrap();
        assert!((pl - 4.0).abs() < 1e-9, "PL was {}", pl);
        assert_eq!(output.travelled(), &[1.5]);
        assert_eq!(output.index(), &[3]);
    }

    #[test]
    fn correction_applies_to_the_planarity_only() {
        let data = dataset(&[(0.0, 0.0, 0.0), (0.5, 0.0, 0.0), (1.0, 0.0, 4.0), (1.5, 0.0, 4.0)]);
        let output = compute(
            &data,
            &meter_window(),
            Some(CorrectionFactor::new(0.5, 1.0)),
            None,
        )
        .unwrap();
        let pl = output.channel("PL").unwrap()[0].unwrap();
        assert!((pl - 3.0).abs() < 1e-9);
        // The aggregated rail levels stay raw.
        assert_eq!(output.channel("Level2").unwrap(), &[Some(4.0)]);
    }

    #[test]
    fn window_method_controls_the_aggregation() {
        // Mean of [0, 6] differs from their median companion cases.
        let data = dataset(&[(0.0, 0.0, 0.0), (0.5, 6.0, 0.0), (1.0, 1.0, 1.0), (1.5, 1.0, 1.0)]);
        let mut window = meter_window();
        window.method = AggregateMethod::Mean;
        let output = compute(&data, &window, None, None).unwrap();
        // Rear-right height is the previous window's Level1 mean.
        assert_eq!(output.channel("RRH").unwrap(), &[Some(3.0)]);
    }

    #[test]
    fn fewer_than_two_windows_yield_no_rows() {
        let data = dataset(&[(0.0, 1.0, 1.0), (0.2, 1.0, 1.0)]);
        let output = compute(&data, &meter_window(), None, None).unwrap();
        assert!(output.is_empty());
    }
}
