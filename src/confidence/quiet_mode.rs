//! Quiet mode - cycle-wide emission suppression
//!
//! When input data looks too volatile or too poor to trust, the cycle emits
//! nothing at all rather than a degraded signal. The detector inspects raw
//! data independently of any analyzer's confidence formula.

use serde::{Deserialize, Serialize};

use crate::config::ConfidenceConfig;
use crate::context::{data_quality_score, BlockContext};
use crate::signal::{Signal, SignalPayload};

/// An anomaly observation and how far it deviates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFlag {
    pub is_anomaly: bool,
    /// Deviation in standard deviations
    pub deviation_sigma: f64,
}

/// Raw inputs inspected by the detector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuietModeInput {
    /// Mempool average fee change over 24h, in percent
    pub change_24h_pct: Option<f64>,
    pub anomaly: Option<AnomalyFlag>,
    pub reorg: bool,
    pub data_quality: Option<f64>,
}

impl QuietModeInput {
    /// Derive the detector input for one block cycle
    pub fn from_cycle(ctx: &BlockContext, signals: &[Signal]) -> Self {
        let anomaly = signals
            .iter()
            .filter_map(|s| match &s.payload {
                SignalPayload::ExchangeFlow(flow) if flow.is_anomaly => Some(flow.z_score.abs()),
                _ => None,
            })
            .fold(None, |max: Option<f64>, z| Some(max.map_or(z, |m| m.max(z))))
            .map(|deviation_sigma| AnomalyFlag {
                is_anomaly: true,
                deviation_sigma,
            });

        Self {
            change_24h_pct: ctx.mempool_change_24h_pct(),
            anomaly,
            reorg: ctx.block.reorg,
            data_quality: Some(data_quality_score(ctx)),
        }
    }
}

/// Detector verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuietModeDecision {
    pub tripped: bool,
    pub reason: Option<String>,
}

impl QuietModeDecision {
    fn clear() -> Self {
        Self {
            tripped: false,
            reason: None,
        }
    }

    fn trip(reason: String) -> Self {
        Self {
            tripped: true,
            reason: Some(reason),
        }
    }
}

/// Decides whether a cycle must stay quiet
#[derive(Debug, Clone)]
pub struct QuietModeDetector {
    max_fee_change_24h_pct: f64,
    spike_threshold_sigma: f64,
    min_data_quality: f64,
}

impl Default for QuietModeDetector {
    fn default() -> Self {
        Self::new(&ConfidenceConfig::default())
    }
}

impl QuietModeDetector {
    pub fn new(config: &ConfidenceConfig) -> Self {
        Self {
            max_fee_change_24h_pct: config.max_fee_change_24h_pct,
            spike_threshold_sigma: config.spike_threshold_sigma,
            min_data_quality: config.min_data_quality,
        }
    }

    /// Check each trip condition in order; the first hit wins
    pub fn detect(&self, input: &QuietModeInput) -> QuietModeDecision {
        if let Some(change) = input.change_24h_pct {
            if change.abs() > self.max_fee_change_24h_pct {
                return QuietModeDecision::trip(format!(
                    "Extreme fee volatility: 24h change {:.1}% exceeds {:.0}%",
                    change, self.max_fee_change_24h_pct
                ));
            }
        }

        if let Some(anomaly) = input.anomaly {
            if anomaly.is_anomaly && anomaly.deviation_sigma > self.spike_threshold_sigma {
                return QuietModeDecision::trip(format!(
                    "Anomaly spike of {:.2}σ exceeds {:.1}σ",
                    anomaly.deviation_sigma, self.spike_threshold_sigma
                ));
            }
        }

        if input.reorg {
            return QuietModeDecision::trip("Chain reorganization detected".to_string());
        }

        if let Some(quality) = input.data_quality {
            if quality < self.min_data_quality {
                return QuietModeDecision::trip(format!(
                    "Data quality {:.2} below {:.2}",
                    quality, self.min_data_quality
                ));
            }
        }

        QuietModeDecision::clear()
    }
}
