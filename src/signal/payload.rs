//! Typed payloads carried by each signal variant
//!
//! Each variant declares its own required fields, so consumers never search an
//! untyped map for keys. Forward-compatible extras go in `Signal::extensions`.

use serde::{Deserialize, Serialize};

use super::SignalType;

/// Payload keyed by signal type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalPayload {
    Mempool(MempoolPayload),
    ExchangeFlow(ExchangeFlowPayload),
    MinerTreasury(TreasuryPayload),
    WhaleAccumulation(WhalePayload),
    CorporateTreasury(TreasuryPayload),
    Predictive(Forecast),
}

impl SignalPayload {
    /// The signal type this payload belongs to
    pub fn signal_type(&self) -> SignalType {
        match self {
            SignalPayload::Mempool(_) => SignalType::Mempool,
            SignalPayload::ExchangeFlow(_) => SignalType::ExchangeFlow,
            SignalPayload::MinerTreasury(_) => SignalType::MinerTreasury,
            SignalPayload::WhaleAccumulation(_) => SignalType::WhaleAccumulation,
            SignalPayload::CorporateTreasury(_) => SignalType::CorporateTreasury,
            SignalPayload::Predictive(_) => SignalType::Predictive,
        }
    }
}

/// Fee-rate quantiles (sat/vB)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeePercentiles {
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
}

/// Expected confirmation delay for a given fee rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InclusionEstimate {
    /// Quantile label the fee rate was taken from (e.g. "p75")
    pub level: String,
    pub fee_rate: f64,
    pub blocks: u32,
    pub minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MempoolPayload {
    pub percentiles: FeePercentiles,
    pub tx_count: u64,
    pub size_bytes: u64,
    pub avg_fee_rate: f64,
    pub historical_avg_fee_rate: Option<f64>,
    /// Change of the average fee rate against history, in percent (25.0 = +25%)
    pub fee_change_pct: f64,
    pub is_spike: bool,
    pub inclusion_estimates: Vec<InclusionEstimate>,
}

/// Independent exchange-flow patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowPattern {
    LargeSingleTransaction,
    VolumeSpike,
    RapidAccumulation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeFlowPayload {
    pub entity_id: String,
    pub entity_name: Option<String>,
    pub inflow: f64,
    pub outflow: f64,
    pub net_flow: f64,
    pub tx_count: u64,
    pub z_score: f64,
    pub is_anomaly: bool,
    pub patterns: Vec<FlowPattern>,
    pub sample_count: usize,
}

/// Direction of a treasury movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowDirection {
    /// Entity address received funds
    Accumulation,
    /// Entity address spent funds
    Distribution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreasuryPayload {
    pub entity_id: String,
    pub entity_name: String,
    pub direction: FlowDirection,
    pub amount: f64,
    pub txid: String,
    pub address: String,
}

/// Wallet balance tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhaleTier {
    None,
    Whale,
    Large,
    Mega,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhalePattern {
    Accelerating,
    LargeSingleDay,
    ConsistentSmall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhalePayload {
    pub address: String,
    pub balance: f64,
    pub tier: WhaleTier,
    pub change_7d: f64,
    pub streak_days: u32,
    pub streak_total: f64,
    pub patterns: Vec<WhalePattern>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMethod {
    ExponentialSmoothing,
    /// Too little history; the current value is carried forward
    FallbackCurrent,
}

/// Liquidity pressure band, from the exchange-inflow point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureBand {
    HighSelling,
    ModerateSelling,
    Neutral,
    ModerateBuying,
    HighBuying,
}

impl PressureBand {
    /// Classify a pressure index in [0,1]
    pub fn from_index(index: f64) -> Self {
        if index >= 0.7 {
            PressureBand::HighSelling
        } else if index >= 0.6 {
            PressureBand::ModerateSelling
        } else if index > 0.4 {
            PressureBand::Neutral
        } else if index > 0.3 {
            PressureBand::ModerateBuying
        } else {
            PressureBand::HighBuying
        }
    }
}

/// Short-horizon forecasts produced by the predictive analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum Forecast {
    FeeForecast {
        forecast: f64,
        lower: f64,
        upper: f64,
        model_confidence: f64,
        sample_count: usize,
        method: ForecastMethod,
    },
    LiquidityPressure {
        index: f64,
        z_score: f64,
        band: PressureBand,
        current_net_flow: f64,
        model_confidence: f64,
        sample_count: usize,
    },
}
