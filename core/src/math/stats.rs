/// Shared statistics used by the outlier, aggregation, and analysis code.
/// All helpers treat an empty slice as zero rather than panicking.
pub struct StatsHelper;

impl StatsHelper {
    pub fn mean(values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        values.iter().sum::<f64>() / values.len() as f64
    }

    /// Population standard deviation (divides by n, not n - 1).
    pub fn population_std(values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let mean = Self::mean(values);
        let variance = values
            .iter()
            .map(|value| (value - mean) * (value - mean))
            .sum::<f64>()
            / values.len() as f64;
        variance.sqrt()
    }

    /// Even count -> mean of the two central values, odd -> the central one.
    pub fn median(values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    }

    /// Quartiles by floor index over an ascending sample.
    pub fn quartiles(sorted: &[f64]) -> (f64, f64) {
        if sorted.is_empty() {
            return (0.0, 0.0);
        }
        let n = sorted.len() as f64;
        let q1 = sorted[(0.25 * n) as usize];
        let q3 = sorted[(0.75 * n) as usize];
        (q1, q3)
    }

    /// Exponential moving average seeded with the first value;
    /// `alpha = 2 / (span + 1)`. Returns the final accumulator.
    pub fn ema(values: &[f64], span: usize) -> f64 {
        let Some((&first, rest)) = values.split_first() else {
            return 0.0;
        };
        let alpha = 2.0 / (span as f64 + 1.0);
        rest.iter()
            .fold(first, |ema, &value| alpha * value + (1.0 - alpha) * ema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_and_std_of_empty_are_zero() {
        assert_eq!(StatsHelper::mean(&[]), 0.0);
        assert_eq!(StatsHelper::population_std(&[]), 0.0);
    }

    #[test]
    fn population_std_divides_by_n() {
        // Variance of [2, 4] around 3 is 1 with the population estimator.
        assert_eq!(StatsHelper::population_std(&[2.0, 4.0]), 1.0);
    }

    #[test]
    fn median_handles_even_and_odd_counts() {
        assert_eq!(StatsHelper::median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(StatsHelper::median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
    }

    #[test]
    fn quartiles_use_floor_indexing() {
        let sorted = [1.0, 2.0, 2.0, 3.0, 3.0, 3.0, 4.0, 4.0, 100.0];
        let (q1, q3) = StatsHelper::quartiles(&sorted);
        assert_eq!(q1, 2.0);
        assert_eq!(q3, 4.0);
    }

    #[test]
    fn ema_seeds_with_first_value() {
        assert_eq!(StatsHelper::ema(&[5.0], 3), 5.0);
        // span 1 -> alpha 1 -> the last value wins outright.
        assert_eq!(StatsHelper::ema(&[5.0, 7.0, 9.0], 1), 9.0);
    }
}
