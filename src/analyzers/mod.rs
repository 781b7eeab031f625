//! Signal analyzers
//!
//! Each analyzer derives zero or more confidence-scored signals from one
//! block cycle. Analyzers share no mutable state and run concurrently under
//! the pipeline orchestrator; a failing analyzer only loses its own signals.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::context::{EntityRegistry, ProcessingContext};
use crate::error::Result;
use crate::signal::{Signal, SignalType};

pub mod exchange_flow;
pub mod mempool;
pub mod predictive;
pub mod stats;
pub mod treasury;
pub mod whale;

pub use exchange_flow::ExchangeFlowAnalyzer;
pub use mempool::MempoolAnalyzer;
pub use predictive::PredictiveAnalyzer;
pub use treasury::{CorporateTreasuryAnalyzer, MinerTreasuryAnalyzer};
pub use whale::WhaleAnalyzer;

/// Trait for signal analyzers
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyzer name for logging
    fn name(&self) -> &'static str;

    /// Signal type this analyzer produces
    fn signal_type(&self) -> SignalType;

    /// Derive signals for one block cycle
    ///
    /// Missing domain data means the analyzer has nothing to say and returns
    /// an empty vec, not an error.
    async fn analyze(&self, ctx: &ProcessingContext) -> Result<Vec<Signal>>;
}

/// Construct every analyzer enabled in the pipeline config
pub fn build_enabled(config: &Config, registry: Arc<EntityRegistry>) -> Vec<Arc<dyn Analyzer>> {
    config
        .pipeline
        .enabled_analyzers
        .iter()
        .map(|signal_type| -> Arc<dyn Analyzer> {
            match signal_type {
                SignalType::Mempool => Arc::new(MempoolAnalyzer::new(config.mempool.clone())),
                SignalType::ExchangeFlow => Arc::new(ExchangeFlowAnalyzer::new(
                    config.exchange_flow.clone(),
                    registry.clone(),
                )),
                SignalType::MinerTreasury => {
                    Arc::new(MinerTreasuryAnalyzer::new(registry.clone()))
                }
                SignalType::WhaleAccumulation => {
                    Arc::new(WhaleAnalyzer::new(config.whale.clone()))
                }
                SignalType::CorporateTreasury => {
                    Arc::new(CorporateTreasuryAnalyzer::new(registry.clone()))
                }
                SignalType::Predictive => Arc::new(PredictiveAnalyzer::new(
                    config.predictive.clone(),
                    config.mempool.block_interval_minutes,
                )),
            }
        })
        .collect()
}
