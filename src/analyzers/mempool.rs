//! Mempool fee-pressure analyzer
//!
//! Summarizes the current fee-rate distribution, flags spikes against the
//! historical average and estimates how many blocks each fee level waits.

use async_trait::async_trait;
use tracing::debug;

use super::stats::{mean, percentile};
use super::Analyzer;
use crate::config::MempoolConfig;
use crate::confidence::clamp01;
use crate::context::{MempoolSnapshot, ProcessingContext};
use crate::error::{Error, Result};
use crate::signal::{FeePercentiles, InclusionEstimate, MempoolPayload, Signal, SignalPayload, SignalType};

pub struct MempoolAnalyzer {
    config: MempoolConfig,
}

impl MempoolAnalyzer {
    pub fn new(config: MempoolConfig) -> Self {
        Self { config }
    }

    /// Quantiles from raw fee rates, else the provider's precomputed ones
    fn percentiles(snapshot: &MempoolSnapshot) -> Option<FeePercentiles> {
        if !snapshot.fee_rates.is_empty() {
            let rates = &snapshot.fee_rates;
            return Some(FeePercentiles {
                p10: percentile(rates, 10.0),
                p25: percentile(rates, 25.0),
                p50: percentile(rates, 50.0),
                p75: percentile(rates, 75.0),
                p90: percentile(rates, 90.0),
            });
        }
        snapshot.percentiles
    }

    /// Blocks until inclusion for a fee rate
    fn blocks_for_fee(fee_rate: f64, p: &FeePercentiles) -> u32 {
        if fee_rate >= p.p90 {
            1
        } else if fee_rate >= p.p75 {
            2
        } else if fee_rate >= p.p50 {
            3
        } else if fee_rate >= p.p25 {
            6
        } else {
            12
        }
    }

    fn inclusion_estimates(&self, p: &FeePercentiles) -> Vec<InclusionEstimate> {
        [
            ("p90", p.p90),
            ("p75", p.p75),
            ("p50", p.p50),
            ("p25", p.p25),
            ("p10", p.p10),
        ]
        .into_iter()
        .map(|(level, fee_rate)| {
            let blocks = Self::blocks_for_fee(fee_rate, p);
            InclusionEstimate {
                level: level.to_string(),
                fee_rate,
                blocks,
                minutes: blocks as f64 * self.config.block_interval_minutes,
            }
        })
        .collect()
    }

    fn confidence(
        snapshot: &MempoolSnapshot,
        p: &FeePercentiles,
        historical_avg: Option<f64>,
    ) -> f64 {
        let mut confidence: f64 = 0.5;

        if snapshot.tx_count > 1000 {
            confidence += 0.2;
        } else if snapshot.tx_count > 500 {
            confidence += 0.1;
        }

        if p.p50 > 0.0 {
            let spread = p.p90 / p.p50;
            if (1.5..=3.0).contains(&spread) {
                confidence += 0.2;
            } else if !(1.5..=5.0).contains(&spread) {
                confidence -= 0.1;
            }
        }

        if let Some(hist) = historical_avg.filter(|h| *h > 0.0) {
            let ratio = snapshot.avg_fee_rate / hist;
            if !(0.5..=2.0).contains(&ratio) {
                confidence -= 0.1;
            }
        }

        clamp01(confidence)
    }
}

#[async_trait]
impl Analyzer for MempoolAnalyzer {
    fn name(&self) -> &'static str {
        "mempool"
    }

    fn signal_type(&self) -> SignalType {
        SignalType::Mempool
    }

    async fn analyze(&self, ctx: &ProcessingContext) -> Result<Vec<Signal>> {
        let Some(snapshot) = ctx.historical().mempool_data.as_ref() else {
            return Ok(Vec::new());
        };

        let percentiles = Self::percentiles(snapshot).ok_or_else(|| {
            Error::ContextUnavailable("mempool snapshot has neither fee rates nor quantiles".into())
        })?;

        let history: Vec<f64> = ctx
            .historical()
            .mempool_history()
            .iter()
            .map(|s| s.avg_fee_rate)
            .collect();
        let historical_avg = (!history.is_empty()).then(|| mean(&history));

        let fee_change = match historical_avg {
            Some(hist) if hist > 0.0 => (snapshot.avg_fee_rate - hist) / hist,
            _ => 0.0,
        };
        let is_spike = fee_change > self.config.spike_threshold;

        let confidence = Self::confidence(snapshot, &percentiles, historical_avg);

        debug!(
            block_height = ctx.block_height(),
            avg_fee_rate = snapshot.avg_fee_rate,
            fee_change_pct = fee_change * 100.0,
            is_spike,
            confidence,
            "Mempool analyzed"
        );

        let payload = MempoolPayload {
            percentiles,
            tx_count: snapshot.tx_count,
            size_bytes: snapshot.size_bytes,
            avg_fee_rate: snapshot.avg_fee_rate,
            historical_avg_fee_rate: historical_avg,
            fee_change_pct: fee_change * 100.0,
            is_spike,
            inclusion_estimates: self.inclusion_estimates(&percentiles),
        };

        let signal = Signal::for_context(SignalPayload::Mempool(payload), confidence, ctx)?;
        Ok(vec![signal])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::fixtures::*;
    use chrono::Duration;

    fn analyzer() -> MempoolAnalyzer {
        MempoolAnalyzer::new(MempoolConfig::default())
    }

    fn snapshot_with_rates(rates: Vec<f64>, avg: f64, tx_count: u64) -> MempoolSnapshot {
        MempoolSnapshot {
            fee_rates: rates,
            tx_count,
            ..mempool_snapshot(block_time(), avg)
        }
    }

    fn payload(signal: &Signal) -> &MempoolPayload {
        match &signal.payload {
            SignalPayload::Mempool(p) => p,
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_mempool_data_is_skipped() {
        let ctx = processing(block_context(800_000));
        assert!(analyzer().analyze(&ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_quantiles_is_context_error() {
        let mut ctx = block_context(800_000);
        ctx.historical.mempool_data = Some(mempool_snapshot(block_time(), 20.0));
        let result = analyzer().analyze(&processing(ctx)).await;
        assert!(matches!(result, Err(Error::ContextUnavailable(_))));
    }

    #[tokio::test]
    async fn test_spike_and_confidence() {
        let mut ctx = block_context(800_000);
        // p50 = 11, p90 = 19 -> stable spread
        let rates: Vec<f64> = (1..=21).map(|v| v as f64).collect();
        ctx.historical.mempool_data = Some(snapshot_with_rates(rates, 13.0, 1500));
        ctx.historical.historical_mempool = Some(
            (1..=6)
                .map(|h| mempool_snapshot(block_time() - Duration::hours(h), 10.0))
                .collect(),
        );

        let signals = analyzer().analyze(&processing(ctx)).await.unwrap();
        assert_eq!(signals.len(), 1);

        let p = payload(&signals[0]);
        assert!(p.is_spike);
        assert!((p.fee_change_pct - 30.0).abs() < 1e-9);
        assert_eq!(p.historical_avg_fee_rate, Some(10.0));
        // 0.5 + 0.2 (tx_count) + 0.2 (spread 19/11 in range)
        assert!((signals[0].confidence - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_large_deviation_penalized() {
        let mut ctx = block_context(800_000);
        let rates: Vec<f64> = (1..=21).map(|v| v as f64).collect();
        ctx.historical.mempool_data = Some(snapshot_with_rates(rates, 25.0, 1500));
        ctx.historical.historical_mempool =
            Some(vec![mempool_snapshot(block_time() - Duration::hours(1), 10.0)]);

        let signals = analyzer().analyze(&processing(ctx)).await.unwrap();
        // 0.9 - 0.1 for > 2x the historical average
        assert!((signals[0].confidence - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_provider_quantiles_used_when_no_raw_rates() {
        let mut ctx = block_context(800_000);
        let mut snapshot = mempool_snapshot(block_time(), 8.0);
        snapshot.tx_count = 300;
        snapshot.percentiles = Some(FeePercentiles {
            p10: 1.0,
            p25: 2.0,
            p50: 3.0,
            p75: 10.0,
            p90: 30.0,
        });
        ctx.historical.mempool_data = Some(snapshot);

        let signals = analyzer().analyze(&processing(ctx)).await.unwrap();
        let p = payload(&signals[0]);
        assert_eq!(p.percentiles.p90, 30.0);
        assert!(!p.is_spike);
        // 0.5 - 0.1 for a 10x spread
        assert!((signals[0].confidence - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_inclusion_tiers() {
        let p = FeePercentiles {
            p10: 1.0,
            p25: 2.0,
            p50: 5.0,
            p75: 10.0,
            p90: 20.0,
        };
        let estimates = analyzer().inclusion_estimates(&p);
        let blocks: Vec<_> = estimates.iter().map(|e| e.blocks).collect();
        assert_eq!(blocks, vec![1, 2, 3, 6, 12]);
        assert_eq!(estimates[4].minutes, 120.0);
        assert_eq!(MempoolAnalyzer::blocks_for_fee(15.0, &p), 2);
    }

    #[tokio::test]
    async fn test_confidence_always_in_range() {
        for (tx_count, avg, hist) in [(0u64, 0.0, 1000.0), (5000, 1e6, 0.01), (700, 3.0, 3.0)] {
            let mut ctx = block_context(800_000);
            ctx.historical.mempool_data =
                Some(snapshot_with_rates(vec![0.0, 0.5, 1e5], avg, tx_count));
            ctx.historical.historical_mempool =
                Some(vec![mempool_snapshot(block_time() - Duration::hours(2), hist)]);
            let signals = analyzer().analyze(&processing(ctx)).await.unwrap();
            assert!((0.0..=1.0).contains(&signals[0].confidence));
        }
    }
}
