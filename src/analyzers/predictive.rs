//! Short-horizon forecasts
//!
//! Two independent forecasts per block: the next block's average fee rate
//! and an exchange liquidity pressure index. Each is gated on its own model
//! confidence and dropped entirely when the model is not trusted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

use super::stats::{coefficient_of_variation, exponential_smoothing, mean, std_dev, z_score};
use super::Analyzer;
use crate::config::PredictiveConfig;
use crate::confidence::clamp01;
use crate::context::ProcessingContext;
use crate::error::Result;
use crate::signal::{Forecast, ForecastMethod, PressureBand, Signal, SignalPayload, SignalType};

/// Samples used for the recent coefficient of variation
const RECENT_WINDOW: usize = 12;

/// Lowest fee rate a forecast interval may report
const MIN_FEE_RATE: f64 = 1.0;

/// Two-sided 95% normal quantile
const Z_95: f64 = 1.96;

pub struct PredictiveAnalyzer {
    config: PredictiveConfig,
    block_interval_minutes: f64,
}

impl PredictiveAnalyzer {
    pub fn new(config: PredictiveConfig, block_interval_minutes: f64) -> Self {
        Self {
            config,
            block_interval_minutes,
        }
    }

    fn history_bonus(sample_count: usize) -> f64 {
        if sample_count >= 144 {
            0.2
        } else if sample_count >= 72 {
            0.1
        } else {
            0.0
        }
    }

    /// Next-block fee forecast with a 95% interval
    pub fn fee_forecast(&self, ctx: &ProcessingContext) -> Option<(Forecast, (f64, f64))> {
        let historical = ctx.historical();
        let current = historical.mempool_data.as_ref();

        let mut snapshots = historical.mempool_history().to_vec();
        snapshots.sort_by_key(|s| s.timestamp);
        let history: Vec<f64> = snapshots.iter().map(|s| s.avg_fee_rate).collect();

        if history.len() < self.config.min_history_samples {
            let current = current?;
            let forecast = Forecast::FeeForecast {
                forecast: current.avg_fee_rate,
                lower: current.avg_fee_rate,
                upper: current.avg_fee_rate,
                model_confidence: self.config.fallback_confidence,
                sample_count: history.len(),
                method: ForecastMethod::FallbackCurrent,
            };
            return Some((forecast, (current.avg_fee_rate, current.avg_fee_rate)));
        }

        let mut series = history.clone();
        if let Some(current) = current {
            series.push(current.avg_fee_rate);
        }
        let level = exponential_smoothing(&series, self.config.smoothing_alpha)?;

        let spread = Z_95 * std_dev(&history);
        let lower = (level - spread).max(MIN_FEE_RATE);
        let upper = (level + spread).max(lower);

        let recent = &history[history.len().saturating_sub(RECENT_WINDOW)..];
        let cv = coefficient_of_variation(recent);

        let mut model_confidence = 0.4 + Self::history_bonus(history.len());
        if cv < 0.2 {
            model_confidence += 0.2;
        } else if cv < 0.5 {
            model_confidence += 0.1;
        }
        if current.is_some_and(|c| c.tx_count < 500) {
            model_confidence -= 0.1;
        }

        let forecast = Forecast::FeeForecast {
            forecast: level,
            lower,
            upper,
            model_confidence: clamp01(model_confidence),
            sample_count: history.len(),
            method: ForecastMethod::ExponentialSmoothing,
        };
        Some((forecast, (lower, upper)))
    }

    /// Net exchange inflow pressure mapped onto [0, 1]
    pub fn liquidity_pressure(&self, ctx: &ProcessingContext) -> Option<Forecast> {
        let historical = ctx.historical();
        let flows = historical.exchange_flows.as_ref()?;
        if flows.is_empty() {
            return None;
        }
        let current_net_flow: f64 = flows.iter().map(|f| f.net_flow()).sum();

        let mut by_time: BTreeMap<DateTime<Utc>, f64> = BTreeMap::new();
        if let Some(history) = historical.historical_exchange_flows.as_ref() {
            for sample in history.values().flatten() {
                *by_time.entry(sample.timestamp).or_insert(0.0) += sample.net_flow();
            }
        }
        let series: Vec<f64> = by_time.into_values().collect();

        let sd = std_dev(&series);
        let (z, model_confidence) = if series.len() < 10 || sd <= f64::EPSILON {
            (0.0, self.config.fallback_confidence)
        } else {
            let z = z_score(current_net_flow, mean(&series), sd);
            let mut confidence = 0.5 + Self::history_bonus(series.len());
            if z.abs() >= 1.0 {
                confidence += 0.1;
            }
            (z, clamp01(confidence))
        };

        let index = clamp01(0.5 + z / 6.0);

        Some(Forecast::LiquidityPressure {
            index,
            z_score: z,
            band: PressureBand::from_index(index),
            current_net_flow,
            model_confidence,
            sample_count: series.len(),
        })
    }

    /// Build a signal for a forecast that clears the model-confidence gate
    pub fn emit(
        &self,
        ctx: &ProcessingContext,
        forecast: Forecast,
        interval: Option<(f64, f64)>,
    ) -> Result<Option<Signal>> {
        let model_confidence = match &forecast {
            Forecast::FeeForecast {
                model_confidence, ..
            }
            | Forecast::LiquidityPressure {
                model_confidence, ..
            } => *model_confidence,
        };

        if model_confidence < self.config.min_model_confidence {
            debug!(
                block_height = ctx.block_height(),
                model_confidence,
                threshold = self.config.min_model_confidence,
                "Forecast suppressed"
            );
            return Ok(None);
        }

        let horizon = matches!(forecast, Forecast::FeeForecast { .. });
        let mut signal =
            Signal::for_context(SignalPayload::Predictive(forecast), model_confidence, ctx)?;
        if let Some((lower, upper)) = interval {
            signal = signal.with_prediction_interval(lower, upper);
        }
        if horizon {
            signal = signal.with_extension(
                "horizon",
                json!({ "blocks": 1, "minutes": self.block_interval_minutes }),
            );
        }
        Ok(Some(signal))
    }
}

#[async_trait]
impl Analyzer for PredictiveAnalyzer {
    fn name(&self) -> &'static str {
        "predictive"
    }

    fn signal_type(&self) -> SignalType {
        SignalType::Predictive
    }

    async fn analyze(&self, ctx: &ProcessingContext) -> Result<Vec<Signal>> {
        let mut signals = Vec::new();

        if let Some((forecast, interval)) = self.fee_forecast(ctx) {
            signals.extend(self.emit(ctx, forecast, Some(interval))?);
        }

        if let Some(forecast) = self.liquidity_pressure(ctx) {
            signals.extend(self.emit(ctx, forecast, None)?);
        }

        Ok(signals)
    }
}
