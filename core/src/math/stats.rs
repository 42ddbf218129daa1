pub struct StatsHelper;

impl StatsHelper {
    pub fn mean(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    /// Population variance.
    pub fn variance(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let mean = Self::mean(samples);
        samples.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / samples.len() as f64
    }

    pub fn std_dev(samples: &[f64]) -> f64 {
        Self::variance(samples).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_empty_is_zero() {
        assert_eq!(StatsHelper::mean(&[]), 0.0);
        assert_eq!(StatsHelper::variance(&[]), 0.0);
    }

    #[test]
    fn variance_of_constant_sequence_is_zero() {
        assert_eq!(StatsHelper::variance(&[3.0, 3.0, 3.0]), 0.0);
    }

    #[test]
    fn std_dev_matches_known_sequence() {
        // Population std of [2, 4, 4, 4, 5, 5, 7, 9] is exactly 2.
        let samples = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((StatsHelper::std_dev(&samples) - 2.0).abs() < 1e-12);
    }
}
