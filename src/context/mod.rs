//! Per-cycle input data
//!
//! A `BlockContext` is supplied by the block context provider and never
//! mutated by the pipeline. Each cycle wraps it in a `ProcessingContext`
//! carrying the correlation id and the timestamp signals are stamped with.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::signal::FeePercentiles;

pub mod provider;
pub mod registry;

pub use provider::{BlockContextProvider, JsonFileProvider};
pub use registry::{EntityKind, EntityRegistry, KnownEntity};

/// Block identity and summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub hash: String,
    pub height: u64,
    pub timestamp: DateTime<Utc>,
    pub size: u64,
    pub tx_count: u64,
    pub total_fees: f64,
    /// Set by the provider when this block replaced a reorged one
    #[serde(default)]
    pub reorg: bool,
}

/// Fee-rate snapshot of the mempool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MempoolSnapshot {
    pub timestamp: DateTime<Utc>,
    pub tx_count: u64,
    pub size_bytes: u64,
    pub avg_fee_rate: f64,
    /// Raw per-transaction fee rates, when the provider has them
    #[serde(default)]
    pub fee_rates: Vec<f64>,
    /// Pre-computed quantiles, used when raw rates are absent
    #[serde(default)]
    pub percentiles: Option<FeePercentiles>,
}

/// Current-block flow for one tracked exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeFlowSnapshot {
    pub entity_id: String,
    #[serde(default)]
    pub entity_name: Option<String>,
    pub inflow: f64,
    pub outflow: f64,
    pub tx_count: u64,
    pub avg_tx_size: f64,
    #[serde(default)]
    pub known_entity: bool,
}

impl ExchangeFlowSnapshot {
    pub fn net_flow(&self) -> f64 {
        self.inflow - self.outflow
    }
}

/// Historical flow sample for one exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSample {
    pub timestamp: DateTime<Utc>,
    pub inflow: f64,
    pub outflow: f64,
    pub avg_tx_size: f64,
}

impl FlowSample {
    pub fn net_flow(&self) -> f64 {
        self.inflow - self.outflow
    }
}

/// Current balance view of a large wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhaleSnapshot {
    pub address: String,
    pub balance: f64,
    pub change_7d: f64,
}

/// Daily historical balance sample for a wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhaleSample {
    pub timestamp: DateTime<Utc>,
    pub balance: f64,
    pub change_7d: f64,
}

/// Transaction input or output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxIo {
    #[serde(default)]
    pub address: Option<String>,
    pub value: f64,
}

/// Raw transaction included in the block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub txid: String,
    #[serde(default)]
    pub inputs: Vec<TxIo>,
    #[serde(default)]
    pub outputs: Vec<TxIo>,
}

impl RawTransaction {
    pub fn total_output(&self) -> f64 {
        self.outputs.iter().map(|o| o.value).sum()
    }
}

/// Historical-data bundle keyed by domain
///
/// A missing domain means that analyzer family is skipped for the cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricalData {
    #[serde(default)]
    pub mempool_data: Option<MempoolSnapshot>,
    #[serde(default)]
    pub historical_mempool: Option<Vec<MempoolSnapshot>>,
    #[serde(default)]
    pub exchange_flows: Option<Vec<ExchangeFlowSnapshot>>,
    #[serde(default)]
    pub historical_exchange_flows: Option<HashMap<String, Vec<FlowSample>>>,
    #[serde(default)]
    pub whale_data: Option<Vec<WhaleSnapshot>>,
    #[serde(default)]
    pub historical_whale: Option<HashMap<String, Vec<WhaleSample>>>,
    #[serde(default)]
    pub transactions: Option<Vec<RawTransaction>>,
}

impl HistoricalData {
    /// Historical mempool series, oldest first
    pub fn mempool_history(&self) -> &[MempoolSnapshot] {
        self.historical_mempool.as_deref().unwrap_or(&[])
    }

    /// Historical flow series for one exchange
    pub fn flow_history(&self, entity_id: &str) -> &[FlowSample] {
        self.historical_exchange_flows
            .as_ref()
            .and_then(|h| h.get(entity_id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Historical balance series for one wallet
    pub fn whale_history(&self, address: &str) -> &[WhaleSample] {
        self.historical_whale
            .as_ref()
            .and_then(|h| h.get(address))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Read-only input for one block cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockContext {
    pub block: BlockHeader,
    /// Neighbouring blocks (±N)
    #[serde(default)]
    pub window: Vec<BlockHeader>,
    #[serde(default)]
    pub historical: HistoricalData,
}

impl BlockContext {
    pub fn new(block: BlockHeader) -> Self {
        Self {
            block,
            window: Vec::new(),
            historical: HistoricalData::default(),
        }
    }

    /// Reject malformed input; fatal only for this block's cycle
    pub fn validate(&self) -> Result<()> {
        let block = &self.block;

        if block.height == 0 {
            return Err(Error::Validation("Block height must be > 0".to_string()));
        }
        if block.hash.trim().is_empty() {
            return Err(Error::Validation(format!(
                "Block {} has an empty hash",
                block.height
            )));
        }
        if !block.total_fees.is_finite() || block.total_fees < 0.0 {
            return Err(Error::Validation(format!(
                "Block {} has invalid total_fees {}",
                block.height, block.total_fees
            )));
        }

        for neighbour in &self.window {
            if neighbour.height == block.height || neighbour.height == 0 {
                return Err(Error::Validation(format!(
                    "Block {} window contains invalid height {}",
                    block.height, neighbour.height
                )));
            }
        }

        if let Some(mempool) = &self.historical.mempool_data {
            if !mempool.avg_fee_rate.is_finite() || mempool.avg_fee_rate < 0.0 {
                return Err(Error::Validation(format!(
                    "Mempool avg_fee_rate {} is invalid",
                    mempool.avg_fee_rate
                )));
            }
        }

        if let Some(flows) = &self.historical.exchange_flows {
            for flow in flows {
                if flow.inflow < 0.0 || flow.outflow < 0.0 || !flow.inflow.is_finite() {
                    return Err(Error::Validation(format!(
                        "Exchange flow for {} has negative or non-finite volume",
                        flow.entity_id
                    )));
                }
            }
        }

        Ok(())
    }

    /// Mempool fee-rate change over ~24h, in percent
    ///
    /// Uses the historical snapshot closest to 24h before the current one.
    pub fn mempool_change_24h_pct(&self) -> Option<f64> {
        let current = self.historical.mempool_data.as_ref()?;
        let target = current.timestamp - Duration::hours(24);

        let baseline = self
            .historical
            .mempool_history()
            .iter()
            .filter(|s| s.timestamp <= current.timestamp - Duration::hours(12))
            .min_by_key(|s| (s.timestamp - target).num_seconds().abs())?;

        if baseline.avg_fee_rate <= 0.0 {
            return None;
        }

        Some((current.avg_fee_rate - baseline.avg_fee_rate) / baseline.avg_fee_rate * 100.0)
    }
}

/// Score in [0,1] describing how trustworthy the cycle's input looks
pub fn data_quality_score(ctx: &BlockContext) -> f64 {
    let historical = &ctx.historical;
    let mut score: f64 = 1.0;

    let has_any = historical.mempool_data.is_some()
        || historical.exchange_flows.is_some()
        || historical.whale_data.is_some()
        || historical.transactions.is_some();
    if !has_any {
        return 0.4;
    }

    if ctx.block.tx_count == 0 {
        score -= 0.3;
    }

    if let Some(mempool) = &historical.mempool_data {
        if mempool.tx_count == 0 || mempool.avg_fee_rate <= 0.0 {
            score -= 0.2;
        }
        if (ctx.block.timestamp - mempool.timestamp).num_minutes().abs() > 60 {
            score -= 0.2;
        }
        if historical.mempool_history().is_empty() {
            score -= 0.1;
        }
    }

    if historical.exchange_flows.is_some()
        && historical
            .historical_exchange_flows
            .as_ref()
            .map_or(true, HashMap::is_empty)
    {
        score -= 0.1;
    }

    if historical.whale_data.is_some()
        && historical
            .historical_whale
            .as_ref()
            .map_or(true, HashMap::is_empty)
    {
        score -= 0.1;
    }

    score.clamp(0.0, 1.0)
}

/// A block context plus per-cycle identity, shared read-only by all analyzers
#[derive(Debug, Clone)]
pub struct ProcessingContext {
    /// Threaded through every log line of the cycle
    pub correlation_id: String,
    /// Wall-clock time the cycle started
    pub processed_at: DateTime<Utc>,
    /// Timestamp given to every signal created in this cycle
    pub signal_time: DateTime<Utc>,
    pub block: Arc<BlockContext>,
}

impl ProcessingContext {
    /// Live processing: signals carry wall-clock time
    pub fn live(block: Arc<BlockContext>) -> Self {
        let now = Utc::now();
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            processed_at: now,
            signal_time: now,
            block,
        }
    }

    /// Historical replay: signals carry the original block timestamp
    pub fn replay(block: Arc<BlockContext>) -> Self {
        let signal_time = block.block.timestamp;
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            processed_at: Utc::now(),
            signal_time,
            block,
        }
    }

    pub fn block_height(&self) -> u64 {
        self.block.block.height
    }

    pub fn historical(&self) -> &HistoricalData {
        &self.block.historical
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Shared builders for tests across modules

    use super::*;
    use chrono::TimeZone;

    pub fn block_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    pub fn header(height: u64, timestamp: DateTime<Utc>) -> BlockHeader {
        BlockHeader {
            hash: format!("{:064x}", height),
            height,
            timestamp,
            size: 1_500_000,
            tx_count: 3_000,
            total_fees: 0.25,
            reorg: false,
        }
    }

    pub fn block_context(height: u64) -> BlockContext {
        BlockContext::new(header(height, block_time()))
    }

    pub fn mempool_snapshot(timestamp: DateTime<Utc>, avg_fee_rate: f64) -> MempoolSnapshot {
        MempoolSnapshot {
            timestamp,
            tx_count: 1_200,
            size_bytes: 2_000_000,
            avg_fee_rate,
            fee_rates: Vec::new(),
            percentiles: None,
        }
    }

    pub fn processing(ctx: BlockContext) -> ProcessingContext {
        ProcessingContext::live(Arc::new(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_validate_rejects_zero_height() {
        let ctx = block_context(0);
        assert!(matches!(ctx.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_empty_hash() {
        let mut ctx = block_context(10);
        ctx.block.hash = "  ".into();
        assert!(matches!(ctx.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        let mut ctx = block_context(10);
        ctx.window = vec![header(9, block_time()), header(11, block_time())];
        assert!(ctx.validate().is_ok());
    }

    #[test]
    fn test_replay_uses_block_timestamp() {
        let ctx = Arc::new(block_context(5));
        let replay = ProcessingContext::replay(ctx.clone());
        assert_eq!(replay.signal_time, block_time());

        let live = ProcessingContext::live(ctx);
        assert_ne!(live.signal_time, block_time());
    }

    #[test]
    fn test_mempool_change_24h() {
        let now = block_time();
        let mut ctx = block_context(5);
        ctx.historical.mempool_data = Some(mempool_snapshot(now, 45.0));
        ctx.historical.historical_mempool = Some(vec![
            mempool_snapshot(now - Duration::hours(30), 8.0),
            mempool_snapshot(now - Duration::hours(24), 10.0),
            mempool_snapshot(now - Duration::hours(2), 40.0),
        ]);

        let change = ctx.mempool_change_24h_pct().unwrap();
        assert!((change - 350.0).abs() < 1e-9);
    }

    #[test]
    fn test_mempool_change_needs_old_baseline() {
        let now = block_time();
        let mut ctx = block_context(5);
        ctx.historical.mempool_data = Some(mempool_snapshot(now, 45.0));
        ctx.historical.historical_mempool =
            Some(vec![mempool_snapshot(now - Duration::hours(1), 40.0)]);

        assert!(ctx.mempool_change_24h_pct().is_none());
    }

    #[test]
    fn test_data_quality_empty_context_is_low() {
        let ctx = block_context(5);
        assert!(data_quality_score(&ctx) < 0.5);
    }

    #[test]
    fn test_data_quality_full_context_is_high() {
        let now = block_time();
        let mut ctx = block_context(5);
        ctx.historical.mempool_data = Some(mempool_snapshot(now, 12.0));
        ctx.historical.historical_mempool =
            Some(vec![mempool_snapshot(now - Duration::hours(1), 11.0)]);
        assert_eq!(data_quality_score(&ctx), 1.0);
    }
}
