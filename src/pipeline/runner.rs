//! Live block processing
//!
//! Live cycles are independent, so several blocks run at once up to the
//! configured limit. Failures are logged and counted; the runner always
//! moves on to the remaining blocks.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

use super::{CycleResult, PipelineOrchestrator};
use crate::context::{BlockContextProvider, ProcessingContext};
use crate::error::Result;

/// Totals for a live run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub blocks_processed: usize,
    pub blocks_failed: usize,
    pub signals_generated: usize,
    pub signals_persisted: usize,
    pub quiet_cycles: usize,
    pub persistence_failures: usize,
    pub errors: Vec<String>,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

impl RunSummary {
    fn record(&mut self, height: u64, outcome: Result<CycleResult>) {
        match outcome {
            Ok(cycle) => {
                self.blocks_processed += 1;
                self.signals_generated += cycle.signal_count();
                self.signals_persisted += cycle.persisted;
                if cycle.quiet_mode.is_some() {
                    self.quiet_cycles += 1;
                }
                if let Some(e) = cycle.persistence_error {
                    self.persistence_failures += 1;
                    self.errors.push(format!("block {}: {}", height, e));
                }
            }
            Err(e) => {
                self.blocks_failed += 1;
                self.errors.push(format!("block {}: {}", height, e));
            }
        }
    }
}

/// Runs the orchestrator over many independent blocks
pub struct BlockRunner {
    orchestrator: Arc<PipelineOrchestrator>,
    provider: Arc<dyn BlockContextProvider>,
    max_concurrent_blocks: usize,
}

impl BlockRunner {
    pub fn new(
        orchestrator: Arc<PipelineOrchestrator>,
        provider: Arc<dyn BlockContextProvider>,
        max_concurrent_blocks: usize,
    ) -> Self {
        Self {
            orchestrator,
            provider,
            max_concurrent_blocks: max_concurrent_blocks.max(1),
        }
    }

    async fn process_height(&self, height: u64) -> Result<CycleResult> {
        let block = self.provider.context_for(height).await?;
        let ctx = ProcessingContext::live(block);
        self.orchestrator.process_block(&ctx, None).await
    }

    /// Process the given heights concurrently
    pub async fn run(&self, heights: Vec<u64>) -> RunSummary {
        let start = Instant::now();
        info!(
            blocks = heights.len(),
            concurrency = self.max_concurrent_blocks,
            "Starting live run"
        );

        let outcomes: Vec<(u64, Result<CycleResult>)> = stream::iter(heights)
            .map(|height| async move { (height, self.process_height(height).await) })
            .buffer_unordered(self.max_concurrent_blocks)
            .collect()
            .await;

        let mut summary = RunSummary::default();
        for (height, outcome) in outcomes {
            if let Err(e) = &outcome {
                error!(block_height = height, error = %e, "Block cycle failed");
            }
            summary.record(height, outcome);
        }
        summary.duration = start.elapsed();

        info!(
            processed = summary.blocks_processed,
            failed = summary.blocks_failed,
            signals = summary.signals_generated,
            persisted = summary.signals_persisted,
            duration_ms = summary.duration.as_millis() as u64,
            "Live run complete"
        );

        summary
    }
}

/// Duration serialization in seconds for serde
pub(crate) mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }
}
