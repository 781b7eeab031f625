//! Shared confidence scoring primitives
//!
//! Stateless helpers used by every analyzer's ad hoc confidence formula.
//! The three-factor publication blend lives in `publication` and is a
//! separate stage applied to already-produced signals.

use serde::{Deserialize, Serialize};

pub mod publication;
pub mod quiet_mode;

pub use publication::{PublicationScore, PublicationScorer};
pub use quiet_mode::{AnomalyFlag, QuietModeDecision, QuietModeDetector, QuietModeInput};

/// Default multiplier applied to anomalous scores
pub const DEFAULT_ANOMALY_PENALTY: f64 = 0.8;

/// Confidence bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    /// score < 0.70
    Low,
    /// 0.70 <= score < 0.85
    Medium,
    /// score >= 0.85
    High,
}

/// Clamp to [0, 1]; NaN maps to 0
pub fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Weighted mean of factors, clamped to [0, 1]
///
/// Returns 0.0 when lengths differ or the weights sum to zero.
pub fn weighted_blend(factors: &[f64], weights: &[f64]) -> f64 {
    if factors.len() != weights.len() || factors.is_empty() {
        return 0.0;
    }

    let weight_sum: f64 = weights.iter().sum();
    if weight_sum <= 0.0 {
        return 0.0;
    }

    let weighted: f64 = factors
        .iter()
        .zip(weights)
        .map(|(f, w)| clamp01(*f) * w)
        .sum();

    clamp01(weighted / weight_sum)
}

/// Scale a score down when the underlying observation is anomalous
pub fn apply_anomaly_penalty(score: f64, is_anomaly: bool, factor: f64) -> f64 {
    if is_anomaly {
        clamp01(score * factor)
    } else {
        clamp01(score)
    }
}

pub fn classify_level(score: f64) -> ConfidenceLevel {
    let score = clamp01(score);
    if score >= 0.85 {
        ConfidenceLevel::High
    } else if score >= 0.70 {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    }
}

/// Whether a score clears the publication threshold after the anomaly penalty
pub fn should_publish(score: f64, threshold: f64, is_anomaly: bool) -> bool {
    should_publish_with_penalty(score, threshold, is_anomaly, DEFAULT_ANOMALY_PENALTY)
}

/// `should_publish` with a configured penalty factor
pub fn should_publish_with_penalty(
    score: f64,
    threshold: f64,
    is_anomaly: bool,
    penalty_factor: f64,
) -> bool {
    apply_anomaly_penalty(score, is_anomaly, penalty_factor) >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp01() {
        assert_eq!(clamp01(1.5), 1.0);
        assert_eq!(clamp01(-0.2), 0.0);
        assert_eq!(clamp01(0.42), 0.42);
        assert_eq!(clamp01(f64::NAN), 0.0);
        assert_eq!(clamp01(f64::INFINITY), 1.0);
    }

    #[test]
    fn test_weighted_blend() {
        let score = weighted_blend(&[1.0, 0.5, 0.0], &[0.5, 0.25, 0.25]);
        assert!((score - 0.625).abs() < 1e-12);

        assert_eq!(weighted_blend(&[1.0], &[0.5, 0.5]), 0.0);
        assert_eq!(weighted_blend(&[1.0, 1.0], &[0.0, 0.0]), 0.0);
        assert_eq!(weighted_blend(&[], &[]), 0.0);
    }

    #[test]
    fn test_blend_stays_in_range() {
        let score = weighted_blend(&[7.0, -3.0], &[1.0, 1.0]);
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_anomaly_penalty() {
        assert!((apply_anomaly_penalty(0.9, true, 0.8) - 0.72).abs() < 1e-12);
        assert_eq!(apply_anomaly_penalty(0.9, false, 0.8), 0.9);
        assert_eq!(apply_anomaly_penalty(1.4, false, 0.8), 1.0);
    }

    #[test]
    fn test_classify_level_boundaries() {
        assert_eq!(classify_level(0.69), ConfidenceLevel::Low);
        assert_eq!(classify_level(0.70), ConfidenceLevel::Medium);
        assert_eq!(classify_level(0.84), ConfidenceLevel::Medium);
        assert_eq!(classify_level(0.85), ConfidenceLevel::High);
    }

    #[test]
    fn test_should_publish() {
        assert!(should_publish(0.75, 0.70, false));
        // 0.75 * 0.8 = 0.6
        assert!(!should_publish(0.75, 0.70, true));
        assert!(should_publish(0.9, 0.70, true));
        assert!(!should_publish(0.5, 0.70, false));
    }
}
