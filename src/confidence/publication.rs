//! Publication scoring for already-produced signals
//!
//! A three-factor blend (signal strength, historical accuracy, data quality)
//! used when ranking stored signals for downstream publication. This is a
//! separate stage from the per-analyzer confidence formulas and does not
//! feed back into a signal's own `confidence`. Anomalous records are scaled
//! by the configured penalty before the publish threshold is checked.

use serde::Serialize;

use super::{
    apply_anomaly_penalty, classify_level, clamp01, should_publish_with_penalty, weighted_blend,
    ConfidenceLevel,
};
use crate::config::{ConfidenceConfig, PublicationConfig};
use crate::signal::SignalRecord;

/// Breakdown of a publication score
#[derive(Debug, Clone, Serialize)]
pub struct PublicationScore {
    pub signal_id: String,
    pub signal_strength: f64,
    pub historical_accuracy: f64,
    pub data_quality: f64,
    pub anomalous: bool,
    /// Blended score, after the anomaly penalty
    pub score: f64,
    pub level: ConfidenceLevel,
    pub publish: bool,
}

/// Scores stored signals for publication
pub struct PublicationScorer {
    config: PublicationConfig,
    publish_threshold: f64,
    anomaly_penalty_factor: f64,
}

impl PublicationScorer {
    pub fn new(config: PublicationConfig, confidence: &ConfidenceConfig) -> Self {
        Self {
            config,
            publish_threshold: confidence.publish_threshold,
            anomaly_penalty_factor: confidence.anomaly_penalty_factor,
        }
    }

    fn weights(&self) -> [f64; 3] {
        [
            self.config.signal_strength_weight,
            self.config.historical_accuracy_weight,
            self.config.data_quality_weight,
        ]
    }

    /// Score one record
    pub fn score(&self, record: &SignalRecord) -> PublicationScore {
        let signal_strength = clamp01(record.confidence);
        let historical_accuracy = clamp01(self.config.accuracy_for(record.signal_type));
        let data_quality = clamp01(
            record
                .metadata_f64("data_quality")
                .unwrap_or(self.config.default_data_quality),
        );

        let anomalous = record.is_anomalous();

        let blended = weighted_blend(
            &[signal_strength, historical_accuracy, data_quality],
            &self.weights(),
        );
        let score = apply_anomaly_penalty(blended, anomalous, self.anomaly_penalty_factor);

        PublicationScore {
            signal_id: record.signal_id.clone(),
            signal_strength,
            historical_accuracy,
            data_quality,
            anomalous,
            score,
            level: classify_level(score),
            publish: should_publish_with_penalty(
                blended,
                self.publish_threshold,
                anomalous,
                self.anomaly_penalty_factor,
            ),
        }
    }

    /// Score and order records, best first
    pub fn rank<'a>(&self, records: &'a [SignalRecord]) -> Vec<(&'a SignalRecord, PublicationScore)> {
        let mut scored: Vec<_> = records.iter().map(|r| (r, self.score(r))).collect();
        scored.sort_by(|a, b| b.1.score.total_cmp(&a.1.score));
        scored
    }
}
