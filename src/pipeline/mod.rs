//! Per-block pipeline orchestration
//!
//! One cycle validates the block, fans out to every analyzer as its own task
//! with a timeout, joins them all, checks quiet mode and persists whatever
//! the surviving analyzers produced. A failing analyzer costs only its own
//! signals.

use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::analyzers::Analyzer;
use crate::config::PipelineConfig;
use crate::confidence::{QuietModeDetector, QuietModeInput};
use crate::context::{data_quality_score, ProcessingContext};
use crate::error::{Error, Result};
use crate::signal::{Signal, SignalType};
use crate::store::SignalStore;

pub mod runner;

pub use runner::{BlockRunner, RunSummary};

/// How one analyzer fared in a cycle
#[derive(Debug, Clone)]
pub struct AnalyzerOutcome {
    pub name: &'static str,
    pub signal_type: SignalType,
    pub signal_count: usize,
    pub elapsed: Duration,
    pub error: Option<String>,
}

impl AnalyzerOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of one block cycle
#[derive(Debug, Clone)]
pub struct CycleResult {
    pub correlation_id: String,
    pub block_height: u64,
    /// Every signal the analyzers produced, persisted or not
    pub signals: Vec<Signal>,
    pub persisted: usize,
    pub persist_attempts: u32,
    pub analyzers: Vec<AnalyzerOutcome>,
    /// Reason emission was suppressed, if quiet mode tripped
    pub quiet_mode: Option<String>,
    pub persistence_error: Option<String>,
    pub elapsed: Duration,
    /// False only when every analyzer that ran failed
    pub success: bool,
}

impl CycleResult {
    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    pub fn failed_analyzers(&self) -> impl Iterator<Item = &AnalyzerOutcome> {
        self.analyzers.iter().filter(|a| !a.is_ok())
    }

    pub fn count_for(&self, signal_type: SignalType) -> usize {
        self.signals
            .iter()
            .filter(|s| s.signal_type() == signal_type)
            .count()
    }
}

/// Runs every enabled analyzer for a block and hands the results to the store
pub struct PipelineOrchestrator {
    analyzers: Vec<Arc<dyn Analyzer>>,
    store: SignalStore,
    detector: QuietModeDetector,
    config: PipelineConfig,
}

impl PipelineOrchestrator {
    pub fn new(
        analyzers: Vec<Arc<dyn Analyzer>>,
        store: SignalStore,
        detector: QuietModeDetector,
        config: PipelineConfig,
    ) -> Self {
        Self {
            analyzers,
            store,
            detector,
            config,
        }
    }

    pub fn analyzer_names(&self) -> Vec<&'static str> {
        self.analyzers.iter().map(|a| a.name()).collect()
    }

    pub fn store(&self) -> &SignalStore {
        &self.store
    }

    /// Fan out to every analyzer and join
    async fn run_analyzers(
        &self,
        ctx: &ProcessingContext,
        filter: Option<&[SignalType]>,
    ) -> (Vec<Signal>, Vec<AnalyzerOutcome>) {
        let timeout = Duration::from_millis(self.config.analyzer_timeout_ms);

        let selected: Vec<Arc<dyn Analyzer>> = self
            .analyzers
            .iter()
            .filter(|a| filter.map_or(true, |types| types.contains(&a.signal_type())))
            .cloned()
            .collect();

        let tasks = selected.iter().map(|analyzer| {
            let analyzer = analyzer.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                let start = Instant::now();
                let result = match tokio::time::timeout(timeout, analyzer.analyze(&ctx)).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::AnalyzerTimeout {
                        analyzer: analyzer.name().to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    }),
                };
                (result, start.elapsed())
            })
        });

        let results = join_all(tasks).await;

        let mut signals = Vec::new();
        let mut outcomes = Vec::with_capacity(selected.len());

        for (analyzer, joined) in selected.iter().zip(results) {
            let (result, elapsed) = match joined {
                Ok(output) => output,
                Err(e) => (
                    Err(Error::analyzer(analyzer.name(), format!("task aborted: {}", e))),
                    Duration::ZERO,
                ),
            };

            let outcome = match result {
                Ok(produced) => {
                    let count = produced.len();
                    debug!(
                        correlation_id = %ctx.correlation_id,
                        block_height = ctx.block_height(),
                        analyzer = analyzer.name(),
                        signals = count,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Analyzer finished"
                    );
                    signals.extend(produced);
                    AnalyzerOutcome {
                        name: analyzer.name(),
                        signal_type: analyzer.signal_type(),
                        signal_count: count,
                        elapsed,
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(
                        correlation_id = %ctx.correlation_id,
                        block_height = ctx.block_height(),
                        analyzer = analyzer.name(),
                        error = %e,
                        "Analyzer failed, continuing without its signals"
                    );
                    AnalyzerOutcome {
                        name: analyzer.name(),
                        signal_type: analyzer.signal_type(),
                        signal_count: 0,
                        elapsed,
                        error: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }

        (signals, outcomes)
    }

    /// Process one block
    ///
    /// Only a validation failure is returned as an error. Analyzer failures
    /// and persistence failures are reported inside the `CycleResult`.
    pub async fn process_block(
        &self,
        ctx: &ProcessingContext,
        filter: Option<&[SignalType]>,
    ) -> Result<CycleResult> {
        let start = Instant::now();

        if let Err(e) = ctx.block.validate() {
            error!(
                correlation_id = %ctx.correlation_id,
                block_height = ctx.block_height(),
                error = %e,
                "Block context rejected"
            );
            return Err(e);
        }

        let (mut signals, outcomes) = self.run_analyzers(ctx, filter).await;

        let data_quality = data_quality_score(&ctx.block);
        for signal in signals.iter_mut() {
            signal
                .extensions
                .insert("data_quality".to_string(), json!(data_quality));
        }

        let success = outcomes.is_empty() || outcomes.iter().any(AnalyzerOutcome::is_ok);

        let mut result = CycleResult {
            correlation_id: ctx.correlation_id.clone(),
            block_height: ctx.block_height(),
            signals: Vec::new(),
            persisted: 0,
            persist_attempts: 0,
            analyzers: outcomes,
            quiet_mode: None,
            persistence_error: None,
            elapsed: Duration::ZERO,
            success,
        };

        if self.config.quiet_mode_enabled {
            let decision = self
                .detector
                .detect(&QuietModeInput::from_cycle(&ctx.block, &signals));
            if decision.tripped {
                info!(
                    correlation_id = %ctx.correlation_id,
                    block_height = ctx.block_height(),
                    reason = decision.reason.as_deref().unwrap_or_default(),
                    suppressed = signals.len(),
                    "Quiet mode tripped, suppressing emission"
                );
                result.quiet_mode = decision.reason;
                result.signals = signals;
                result.elapsed = start.elapsed();
                return Ok(result);
            }
        }

        match self.store.persist(&mut signals).await {
            Ok(outcome) => {
                result.persisted = outcome.written;
                result.persist_attempts = outcome.attempts;
            }
            Err(e) => {
                error!(
                    correlation_id = %ctx.correlation_id,
                    block_height = ctx.block_height(),
                    error = %e,
                    "Failed to persist cycle signals"
                );
                if let Error::PersistenceExhausted { attempts, .. } = &e {
                    result.persist_attempts = *attempts;
                }
                result.persistence_error = Some(e.to_string());
            }
        }

        result.signals = signals;
        result.elapsed = start.elapsed();

        info!(
            correlation_id = %result.correlation_id,
            block_height = result.block_height,
            signals = result.signal_count(),
            persisted = result.persisted,
            failed_analyzers = result.failed_analyzers().count(),
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Block cycle complete"
        );

        Ok(result)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Behavior, ScriptedAnalyzer};
    use super::*;
    use crate::config::StoreConfig;
    use crate::context::fixtures::*;
    use crate::context::BlockContext;
    use crate::store::testing::FlakySink;
    use crate::store::{MemorySignalStore, SignalSink};
    use chrono::Duration as ChronoDuration;

    /// A block with fresh mempool data so quiet mode stays clear
    fn healthy_block(height: u64) -> BlockContext {
        let mut ctx = block_context(height);
        ctx.historical.mempool_data = Some(mempool_snapshot(block_time(), 12.0));
        ctx.historical.historical_mempool = Some(vec![mempool_snapshot(
            block_time() - ChronoDuration::hours(1),
            11.0,
        )]);
        ctx
    }

    fn orchestrator(
        analyzers: Vec<Arc<dyn Analyzer>>,
        sink: Arc<dyn SignalSink>,
    ) -> PipelineOrchestrator {
        PipelineOrchestrator::new(
            analyzers,
            SignalStore::new(sink, &StoreConfig::default()),
            QuietModeDetector::default(),
            PipelineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_failing_analyzer_is_isolated() {
        let sink = Arc::new(MemorySignalStore::new());
        let pipeline = orchestrator(
            vec![
                ScriptedAnalyzer::new("a", SignalType::Mempool, Behavior::Emit(2)),
                ScriptedAnalyzer::new("b", SignalType::ExchangeFlow, Behavior::Fail),
                ScriptedAnalyzer::new("c", SignalType::WhaleAccumulation, Behavior::Emit(1)),
            ],
            sink.clone(),
        );

        let result = pipeline
            .process_block(&processing(healthy_block(800_000)), None)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.signal_count(), 3);
        assert_eq!(result.persisted, 3);
        assert_eq!(sink.len().await, 3);

        let failed: Vec<_> = result.failed_analyzers().map(|a| a.name).collect();
        assert_eq!(failed, vec!["b"]);
        assert_eq!(result.analyzers[0].signal_count, 2);
        assert_eq!(result.analyzers[2].signal_count, 1);
    }

    #[tokio::test]
    async fn test_panicking_analyzer_is_isolated() {
        let sink = Arc::new(MemorySignalStore::new());
        let pipeline = orchestrator(
            vec![
                ScriptedAnalyzer::new("ok", SignalType::Mempool, Behavior::Emit(1)),
                ScriptedAnalyzer::new("bad", SignalType::Predictive, Behavior::Panic),
            ],
            sink,
        );

        let result = pipeline
            .process_block(&processing(healthy_block(800_000)), None)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.signal_count(), 1);
        assert!(result.analyzers[1].error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_analyzer_times_out() {
        let sink = Arc::new(MemorySignalStore::new());
        let pipeline = orchestrator(
            vec![
                ScriptedAnalyzer::new("fast", SignalType::Mempool, Behavior::Emit(1)),
                ScriptedAnalyzer::new(
                    "slow",
                    SignalType::Predictive,
                    Behavior::Sleep(Duration::from_secs(60)),
                ),
            ],
            sink,
        );

        let result = pipeline
            .process_block(&processing(healthy_block(800_000)), None)
            .await
            .unwrap();

        assert_eq!(result.signal_count(), 1);
        let slow = &result.analyzers[1];
        assert!(slow.error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_all_failing_is_unsuccessful() {
        let pipeline = orchestrator(
            vec![ScriptedAnalyzer::new("b", SignalType::Mempool, Behavior::Fail)],
            Arc::new(MemorySignalStore::new()),
        );
        let result = pipeline
            .process_block(&processing(healthy_block(800_000)), None)
            .await
            .unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_filter_limits_analyzers() {
        let skipped = ScriptedAnalyzer::tracked("a", SignalType::Mempool, Behavior::Emit(1));
        let pipeline = orchestrator(
            vec![
                skipped.clone() as Arc<dyn Analyzer>,
                ScriptedAnalyzer::new("c", SignalType::WhaleAccumulation, Behavior::Emit(4)),
            ],
            Arc::new(MemorySignalStore::new()),
        );
        let result = pipeline
            .process_block(
                &processing(healthy_block(800_000)),
                Some(&[SignalType::WhaleAccumulation][..]),
            )
            .await
            .unwrap();
        assert_eq!(result.analyzers.len(), 1);
        assert_eq!(result.analyzers[0].name, "c");
        assert_eq!(result.analyzers[0].signal_count, 4);
        assert_eq!(result.count_for(SignalType::WhaleAccumulation), 4);
        assert_eq!(result.count_for(SignalType::Mempool), 0);
        assert_eq!(skipped.runs(), 0);
    }

    #[tokio::test]
    async fn test_quiet_mode_suppresses_persistence() {
        let sink = Arc::new(MemorySignalStore::new());
        let pipeline = orchestrator(
            vec![ScriptedAnalyzer::new("a", SignalType::Mempool, Behavior::Emit(2))],
            sink.clone(),
        );

        let mut block = healthy_block(800_000);
        block.block.reorg = true;

        let result = pipeline.process_block(&processing(block), None).await.unwrap();
        assert!(result.quiet_mode.unwrap().contains("reorganization"));
        assert_eq!(result.persisted, 0);
        assert!(sink.is_empty().await);
    }

    #[tokio::test]
    async fn test_low_quality_input_trips_quiet_mode() {
        let sink = Arc::new(MemorySignalStore::new());
        let pipeline = orchestrator(
            vec![ScriptedAnalyzer::new("a", SignalType::Mempool, Behavior::Emit(1))],
            sink.clone(),
        );

        // No domain data at all
        let result = pipeline
            .process_block(&processing(block_context(800_000)), None)
            .await
            .unwrap();
        assert!(result.quiet_mode.is_some());
        assert!(sink.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistence_failure_is_reported_not_raised() {
        let sink = Arc::new(FlakySink::always_failing());
        let pipeline = orchestrator(
            vec![ScriptedAnalyzer::new("a", SignalType::Mempool, Behavior::Emit(2))],
            sink,
        );

        let result = pipeline
            .process_block(&processing(healthy_block(800_000)), None)
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.persistence_error.is_some());
        assert_eq!(result.persist_attempts, 4);
        assert!(result.signals.iter().all(|s| !s.processed));
    }

    #[tokio::test]
    async fn test_invalid_block_is_fatal_for_cycle() {
        let pipeline = orchestrator(
            vec![ScriptedAnalyzer::new("a", SignalType::Mempool, Behavior::Emit(1))],
            Arc::new(MemorySignalStore::new()),
        );
        let mut block = healthy_block(800_000);
        block.block.hash.clear();

        let err = pipeline
            .process_block(&processing(block), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_signals_carry_data_quality() {
        let sink = Arc::new(MemorySignalStore::new());
        let pipeline = orchestrator(
            vec![ScriptedAnalyzer::new("a", SignalType::Mempool, Behavior::Emit(1))],
            sink.clone(),
        );
        pipeline
            .process_block(&processing(healthy_block(800_000)), None)
            .await
            .unwrap();

        let records = sink.records().await;
        assert_eq!(records[0].metadata_f64("data_quality"), Some(1.0));
    }
}
