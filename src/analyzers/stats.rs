//! Statistics helpers shared by the analyzers
//!
//! Mean and population standard deviation go through `statrs`. Every helper
//! returns 0.0 on empty input instead of NaN so confidence math stays finite.

use statrs::statistics::Statistics;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().mean()
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.iter().population_std_dev()
}

/// Percentile with linear interpolation between closest ranks
///
/// `pct` is in [0, 100]. Input does not need to be sorted.
pub fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(f64::total_cmp);

    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;

    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// (value - mean) / std_dev, or 0.0 when the baseline has no spread
pub fn z_score(value: f64, mean: f64, std_dev: f64) -> f64 {
    if std_dev <= f64::EPSILON || !std_dev.is_finite() {
        return 0.0;
    }
    (value - mean) / std_dev
}

/// Simple exponential smoothing seeded with the first sample
///
/// s_0 = x_0, s_t = alpha * x_t + (1 - alpha) * s_{t-1}
pub fn exponential_smoothing(values: &[f64], alpha: f64) -> Option<f64> {
    let (first, rest) = values.split_first()?;
    Some(
        rest.iter()
            .fold(*first, |level, x| alpha * x + (1.0 - alpha) * level),
    )
}

/// std_dev / |mean|, or 0.0 for a zero mean
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    let m = mean(values);
    if m.abs() <= f64::EPSILON {
        return 0.0;
    }
    std_dev(values) / m.abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_std_dev() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&values) - 5.0).abs() < 1e-12);
        assert!((std_dev(&values) - 2.0).abs() < 1e-12);
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(std_dev(&[3.0]), 0.0);
    }

    #[test]
    fn test_percentile_interpolates() {
        let values = [10.0, 1.0, 4.0, 7.0];
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 100.0), 10.0);
        // rank 1.5 between 4 and 7
        assert!((percentile(&values, 50.0) - 5.5).abs() < 1e-12);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_z_score_zero_spread() {
        assert_eq!(z_score(10.0, 5.0, 0.0), 0.0);
        assert!((z_score(11.0, 5.0, 2.0) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_smoothing_constant_series_converges() {
        let series = vec![42.0; 50];
        let level = exponential_smoothing(&series, 0.3).unwrap();
        assert!((level - 42.0).abs() < 1e-9);
    }

    #[test]
    fn test_smoothing_recurrence() {
        // s0 = 10, s1 = 0.3*20 + 0.7*10 = 13
        let level = exponential_smoothing(&[10.0, 20.0], 0.3).unwrap();
        assert!((level - 13.0).abs() < 1e-12);
        assert!(exponential_smoothing(&[], 0.3).is_none());
    }

    #[test]
    fn test_coefficient_of_variation() {
        assert_eq!(coefficient_of_variation(&[5.0, 5.0, 5.0]), 0.0);
        assert_eq!(coefficient_of_variation(&[0.0, 0.0]), 0.0);
        let cv = coefficient_of_variation(&[8.0, 12.0]);
        assert!((cv - 0.2).abs() < 1e-12);
    }
}
