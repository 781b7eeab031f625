//! Historical backfill
//!
//! Replays the live pipeline over a date range one block at a time, oldest
//! first, sleeping between blocks to respect the configured throughput cap.
//! Signals keep the original block timestamp as their creation time.

use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::BackfillConfig;
use crate::context::{BlockContextProvider, ProcessingContext};
use crate::error::{Error, Result};
use crate::pipeline::runner::duration_secs;
use crate::pipeline::PipelineOrchestrator;
use crate::signal::SignalType;

/// Outcome of a backfill run
#[derive(Debug, Clone, Serialize)]
pub struct BackfillSummary {
    pub blocks_processed: usize,
    pub signals_generated: usize,
    pub signals_persisted: usize,
    pub quiet_cycles: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    /// One entry per block that failed to load, validate or persist
    pub errors: Vec<String>,
}

pub struct BackfillController {
    orchestrator: Arc<PipelineOrchestrator>,
    provider: Arc<dyn BlockContextProvider>,
    config: BackfillConfig,
}

impl BackfillController {
    pub fn new(
        orchestrator: Arc<PipelineOrchestrator>,
        provider: Arc<dyn BlockContextProvider>,
        config: BackfillConfig,
    ) -> Self {
        Self {
            orchestrator,
            provider,
            config,
        }
    }

    /// Replay every block between two dates, inclusive
    pub async fn backfill(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        signal_types: Option<Vec<SignalType>>,
    ) -> Result<BackfillSummary> {
        if start_date > end_date {
            return Err(Error::Validation(format!(
                "Backfill start {} is after end {}",
                start_date, end_date
            )));
        }

        let started = Instant::now();
        let heights = self.provider.heights_between(start_date, end_date).await?;
        let delay = self.config.inter_block_delay();

        info!(
            start = %start_date,
            end = %end_date,
            blocks = heights.len(),
            rate_limit = self.config.rate_limit_blocks_per_minute,
            "Starting backfill"
        );

        let mut summary = BackfillSummary {
            blocks_processed: 0,
            signals_generated: 0,
            signals_persisted: 0,
            quiet_cycles: 0,
            start_date,
            end_date,
            duration: Duration::ZERO,
            errors: Vec::new(),
        };

        let filter = signal_types.as_deref();

        for (i, height) in heights.iter().copied().enumerate() {
            if i > 0 {
                tokio::time::sleep(delay).await;
            }

            let block = match self.provider.context_for(height).await {
                Ok(block) => block,
                Err(e) => {
                    warn!(block_height = height, error = %e, "Skipping block");
                    summary.errors.push(format!("block {}: {}", height, e));
                    continue;
                }
            };

            let ctx = ProcessingContext::replay(block);
            match self.orchestrator.process_block(&ctx, filter).await {
                Ok(cycle) => {
                    summary.blocks_processed += 1;
                    summary.signals_generated += cycle.signal_count();
                    summary.signals_persisted += cycle.persisted;
                    if cycle.quiet_mode.is_some() {
                        summary.quiet_cycles += 1;
                    }
                    if let Some(e) = cycle.persistence_error {
                        summary.errors.push(format!("block {}: {}", height, e));
                    }
                }
                Err(e) => {
                    summary.errors.push(format!("block {}: {}", height, e));
                }
            }

            if (i + 1) % 100 == 0 {
                info!(
                    done = i + 1,
                    total = heights.len(),
                    signals = summary.signals_generated,
                    "Backfill progress"
                );
            }
        }

        summary.duration = started.elapsed();

        info!(
            blocks = summary.blocks_processed,
            signals = summary.signals_generated,
            errors = summary.errors.len(),
            duration_secs = summary.duration.as_secs_f64(),
            "Backfill complete"
        );

        Ok(summary)
    }
}
