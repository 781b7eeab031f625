//! Durable signal storage
//!
//! `SignalSink` is the raw write/query surface. `SignalStore` wraps a sink
//! with bounded exponential-backoff retry that replays the whole batch on
//! every attempt.

use async_trait::async_trait;
use backoff::future::retry_notify;
use backoff::ExponentialBackoffBuilder;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::signal::{Signal, SignalRecord};

pub mod jsonl;
pub mod memory;

pub use jsonl::JsonlSignalStore;
pub use memory::MemorySignalStore;

/// Backing storage for signal records
#[async_trait]
pub trait SignalSink: Send + Sync {
    /// Sink name for logging
    fn name(&self) -> &'static str;

    /// Write one batch as a single operation
    async fn write_batch(&self, records: &[SignalRecord]) -> Result<()>;

    /// Unprocessed records, oldest `created_at` first
    async fn pending(&self, limit: usize) -> Result<Vec<SignalRecord>>;

    /// Flag records as consumed; returns how many were newly marked
    ///
    /// Only the downstream consumer calls this. The pipeline never does.
    async fn mark_processed(&self, ids: &[String], at: DateTime<Utc>) -> Result<usize>;
}

/// Result of a successful persist
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistOutcome {
    pub written: usize,
    pub attempts: u32,
    /// Backoff delays slept between attempts
    pub delays: Vec<Duration>,
}

/// Retrying writer over a sink
#[derive(Clone)]
pub struct SignalStore {
    sink: Arc<dyn SignalSink>,
    max_retries: u32,
    base_delay: Duration,
}

impl SignalStore {
    pub fn new(sink: Arc<dyn SignalSink>, config: &StoreConfig) -> Self {
        Self {
            sink,
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }

    pub fn sink(&self) -> &Arc<dyn SignalSink> {
        &self.sink
    }

    /// Persist a cycle's signals, retrying the whole batch
    ///
    /// Delays double from the base delay (1s, 2s, 4s by default). When every
    /// attempt fails the signals are flagged unprocessed and
    /// `PersistenceExhausted` is returned.
    pub async fn persist(&self, signals: &mut [Signal]) -> Result<PersistOutcome> {
        if signals.is_empty() {
            return Ok(PersistOutcome::default());
        }

        let records = match signals
            .iter()
            .map(SignalRecord::try_from)
            .collect::<Result<Vec<_>>>()
        {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "Failed to encode signal batch");
                for signal in signals.iter_mut() {
                    signal.mark_unprocessed();
                }
                return Err(e);
            }
        };

        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.base_delay)
            .with_randomization_factor(0.0)
            .with_multiplier(2.0)
            .with_max_interval(self.base_delay.saturating_mul(2u32.saturating_pow(self.max_retries)))
            .with_max_elapsed_time(None)
            .build();

        let attempts = AtomicU32::new(0);
        let mut delays = Vec::new();
        let sink = &self.sink;
        let batch = records.as_slice();
        let max_retries = self.max_retries;

        let result = retry_notify(
            backoff,
            || {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    match sink.write_batch(batch).await {
                        Ok(()) => Ok(()),
                        Err(e) if e.is_retryable() && attempt <= max_retries => {
                            Err(backoff::Error::transient(e))
                        }
                        Err(e) => Err(backoff::Error::permanent(e)),
                    }
                }
            },
            |e: Error, delay: Duration| {
                warn!(
                    sink = sink.name(),
                    attempt = attempts.load(Ordering::SeqCst),
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Signal batch write failed, retrying"
                );
                delays.push(delay);
            },
        )
        .await;

        let attempts = attempts.load(Ordering::SeqCst);

        match result {
            Ok(()) => {
                debug!(
                    sink = self.sink.name(),
                    written = records.len(),
                    attempts,
                    "Signal batch persisted"
                );
                Ok(PersistOutcome {
                    written: records.len(),
                    attempts,
                    delays,
                })
            }
            Err(e) => {
                error!(
                    sink = self.sink.name(),
                    batch = records.len(),
                    attempts,
                    error = %e,
                    "Signal batch persistence exhausted"
                );
                for signal in signals.iter_mut() {
                    signal.mark_unprocessed();
                }
                Err(Error::PersistenceExhausted {
                    attempts,
                    last_error: e.to_string(),
                })
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FlakySink;
    use super::*;
    use crate::context::fixtures::*;
    use crate::signal::{
        FeePercentiles, Forecast, MempoolPayload, PressureBand, SignalPayload, SignalType,
    };

    fn signal(height: u64) -> Signal {
        let payload = SignalPayload::Mempool(MempoolPayload {
            percentiles: FeePercentiles::default(),
            tx_count: 10,
            size_bytes: 10,
            avg_fee_rate: 1.0,
            historical_avg_fee_rate: None,
            fee_change_pct: 0.0,
            is_spike: false,
            inclusion_estimates: Vec::new(),
        });
        Signal::new(payload, 0.8, height, block_time()).unwrap()
    }

    fn store(sink: Arc<dyn SignalSink>) -> SignalStore {
        SignalStore::new(sink, &StoreConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt() {
        let sink = Arc::new(FlakySink::new(2));
        let store = store(sink.clone());
        let mut signals = vec![signal(100), signal(100)];

        let start = tokio::time::Instant::now();
        let outcome = store.persist(&mut signals).await.unwrap();

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.written, 2);
        assert_eq!(
            outcome.delays,
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
        assert!(start.elapsed() >= Duration::from_secs(3));
        // Whole batch replayed, written once
        assert_eq!(sink.inner.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_marks_unprocessed() {
        let sink = Arc::new(FlakySink::always_failing());
        let store = store(sink.clone());
        let mut signals = vec![signal(100)];
        signals[0].processed = true;
        signals[0].processed_at = Some(block_time());

        let err = store.persist(&mut signals).await.unwrap_err();
        match err {
            Error::PersistenceExhausted { attempts, .. } => assert_eq!(attempts, 4),
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(sink.calls(), 4);
        assert!(!signals[0].processed);
        assert!(signals[0].processed_at.is_none());
    }

    #[tokio::test]
    async fn test_predictive_signal_persists_with_payload() {
        let sink = Arc::new(MemorySignalStore::new());
        let payload = SignalPayload::Predictive(Forecast::LiquidityPressure {
            index: 0.72,
            z_score: 1.4,
            band: PressureBand::HighSelling,
            current_net_flow: 310.0,
            model_confidence: 0.6,
            sample_count: 40,
        });
        let mut signals = vec![Signal::new(payload, 0.6, 100, block_time()).unwrap()];

        let outcome = store(sink.clone()).persist(&mut signals).await.unwrap();
        assert_eq!(outcome.written, 1);

        let stored = sink.pending(10).await.unwrap();
        assert_eq!(stored[0].signal_type, SignalType::Predictive);
        assert_eq!(stored[0].metadata["model"], "liquidity_pressure");
        assert_eq!(stored[0].metadata["band"], "high_selling");
        assert_eq!(stored[0].metadata_f64("index"), Some(0.72));
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let sink = Arc::new(FlakySink::always_failing());
        let outcome = store(sink.clone()).persist(&mut []).await.unwrap();
        assert_eq!(outcome.attempts, 0);
        assert_eq!(sink.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_fails_once() {
        let sink = Arc::new(FlakySink::new(1));
        let config = StoreConfig {
            max_retries: 0,
            ..StoreConfig::default()
        };
        let store = SignalStore::new(sink.clone(), &config);
        let err = store.persist(&mut [signal(7)]).await.unwrap_err();
        assert!(matches!(err, Error::PersistenceExhausted { attempts: 1, .. }));
    }
}
