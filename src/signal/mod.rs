//! Signals - the pipeline's sole output entity
//!
//! A signal is a confidence-scored, typed observation about one block's
//! on-chain activity. Analyzers create signals; the signal store persists
//! them; downstream consumers own them after a successful write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::confidence::{classify_level, clamp01, ConfidenceLevel};
use crate::context::ProcessingContext;
use crate::error::{Error, Result};

pub mod payload;
pub mod record;

pub use payload::{
    ExchangeFlowPayload, FeePercentiles, FlowDirection, FlowPattern, Forecast, ForecastMethod,
    InclusionEstimate, MempoolPayload, PressureBand, SignalPayload, TreasuryPayload, WhalePattern,
    WhalePayload, WhaleTier,
};
pub use record::SignalRecord;

/// The six analyzer variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    /// Fee pressure in the mempool
    Mempool,
    /// Exchange inflow/outflow anomalies
    ExchangeFlow,
    /// Known miner addresses moving funds
    MinerTreasury,
    /// Large wallets accumulating over days
    WhaleAccumulation,
    /// Known corporate treasuries moving funds
    CorporateTreasury,
    /// Short-horizon forecasts
    Predictive,
}

impl SignalType {
    pub const ALL: [SignalType; 6] = [
        SignalType::Mempool,
        SignalType::ExchangeFlow,
        SignalType::MinerTreasury,
        SignalType::WhaleAccumulation,
        SignalType::CorporateTreasury,
        SignalType::Predictive,
    ];

    /// Wire name (snake_case)
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Mempool => "mempool",
            SignalType::ExchangeFlow => "exchange_flow",
            SignalType::MinerTreasury => "miner_treasury",
            SignalType::WhaleAccumulation => "whale_accumulation",
            SignalType::CorporateTreasury => "corporate_treasury",
            SignalType::Predictive => "predictive",
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        SignalType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| Error::Validation(format!("Unknown signal type: {}", s)))
    }
}

/// A computed signal with evidence and lifecycle flags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Opaque unique identifier, fixed at creation
    pub id: String,
    /// Typed payload; determines the signal type
    pub payload: SignalPayload,
    /// Confidence in this signal (0.0 to 1.0)
    pub confidence: f64,
    /// Height of the block this signal describes (> 0)
    pub block_height: u64,
    /// Evidentiary transaction ids
    pub transaction_ids: Vec<String>,
    /// Evidentiary entity ids
    pub entity_ids: Vec<String>,
    pub is_predictive: bool,
    /// (lower, upper), only set on predictive signals
    pub prediction_interval: Option<(f64, f64)>,
    /// Wall clock for live processing, original block time for backfill
    pub created_at: DateTime<Utc>,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    /// Forward-compatible extras
    #[serde(default)]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl Signal {
    /// Create a new signal
    pub fn new(
        payload: SignalPayload,
        confidence: f64,
        block_height: u64,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        if block_height == 0 {
            return Err(Error::Validation(
                "Signal block_height must be greater than zero".to_string(),
            ));
        }

        let is_predictive = matches!(payload, SignalPayload::Predictive(_));

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            payload,
            confidence: clamp01(confidence),
            block_height,
            transaction_ids: Vec::new(),
            entity_ids: Vec::new(),
            is_predictive,
            prediction_interval: None,
            created_at,
            processed: false,
            processed_at: None,
            extensions: BTreeMap::new(),
        })
    }

    /// Create a signal stamped with the cycle's block height and signal time
    pub fn for_context(
        payload: SignalPayload,
        confidence: f64,
        ctx: &ProcessingContext,
    ) -> Result<Self> {
        Self::new(payload, confidence, ctx.block_height(), ctx.signal_time)
    }

    /// Signal type derived from the payload
    pub fn signal_type(&self) -> SignalType {
        self.payload.signal_type()
    }

    /// Attach evidentiary transaction ids
    pub fn with_transactions<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.transaction_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Attach evidentiary entity ids
    pub fn with_entities<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entity_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Set the prediction interval (ignored for non-predictive signals)
    pub fn with_prediction_interval(mut self, lower: f64, upper: f64) -> Self {
        if self.is_predictive {
            self.prediction_interval = Some((lower.min(upper), lower.max(upper)));
        }
        self
    }

    /// Add a forward-compatible extension value
    pub fn with_extension(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }

    /// Low / medium / high bucket for this signal's confidence
    pub fn confidence_level(&self) -> ConfidenceLevel {
        classify_level(self.confidence)
    }

    /// Reset the downstream-consumption flag after a failed write
    pub fn mark_unprocessed(&mut self) {
        self.processed = false;
        self.processed_at = None;
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} (conf: {:.2}, {:?})",
            self.signal_type(),
            self.block_height,
            self.confidence,
            self.confidence_level()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn treasury_payload() -> SignalPayload {
        SignalPayload::MinerTreasury(TreasuryPayload {
            entity_id: "pool-a".into(),
            entity_name: "Pool A".into(),
            direction: FlowDirection::Distribution,
            amount: 120.0,
            txid: "abc".into(),
            address: "1Pool".into(),
        })
    }

    #[test]
    fn test_signal_creation() {
        let signal = Signal::new(treasury_payload(), 0.8, 840_000, Utc::now()).unwrap();
        assert_eq!(signal.signal_type(), SignalType::MinerTreasury);
        assert!(!signal.processed);
        assert!(signal.processed_at.is_none());
        assert!(!signal.is_predictive);
        assert!(!signal.id.is_empty());
    }

    #[test]
    fn test_signal_clamping() {
        let high = Signal::new(treasury_payload(), 1.7, 1, Utc::now()).unwrap();
        let low = Signal::new(treasury_payload(), -0.3, 1, Utc::now()).unwrap();
        assert_eq!(high.confidence, 1.0);
        assert_eq!(low.confidence, 0.0);
    }

    #[test]
    fn test_zero_height_rejected() {
        let result = Signal::new(treasury_payload(), 0.8, 0, Utc::now());
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_prediction_interval_only_on_predictive() {
        let plain = Signal::new(treasury_payload(), 0.8, 1, Utc::now())
            .unwrap()
            .with_prediction_interval(1.0, 2.0);
        assert!(plain.prediction_interval.is_none());

        let forecast = SignalPayload::Predictive(Forecast::FeeForecast {
            forecast: 20.0,
            lower: 12.0,
            upper: 28.0,
            model_confidence: 0.6,
            sample_count: 50,
            method: ForecastMethod::ExponentialSmoothing,
        });
        let predictive = Signal::new(forecast, 0.6, 1, Utc::now())
            .unwrap()
            .with_prediction_interval(28.0, 12.0);
        assert!(predictive.is_predictive);
        assert_eq!(predictive.prediction_interval, Some((12.0, 28.0)));
    }

    #[test]
    fn test_signal_type_parse() {
        assert_eq!(
            "exchange-flow".parse::<SignalType>().unwrap(),
            SignalType::ExchangeFlow
        );
        assert_eq!(" Predictive ".parse::<SignalType>().unwrap(), SignalType::Predictive);
        assert!("lightning".parse::<SignalType>().is_err());
    }

    #[test]
    fn test_unique_ids() {
        let a = Signal::new(treasury_payload(), 0.8, 1, Utc::now()).unwrap();
        let b = Signal::new(treasury_payload(), 0.8, 1, Utc::now()).unwrap();
        assert_ne!(a.id, b.id);
    }
}
