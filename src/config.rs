//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::signal::SignalType;

/// Main configuration structure
///
/// Built once at startup and handed to each component's constructor.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
    #[serde(default)]
    pub publication: PublicationConfig,
    #[serde(default)]
    pub mempool: MempoolConfig,
    #[serde(default)]
    pub exchange_flow: ExchangeFlowConfig,
    #[serde(default)]
    pub whale: WhaleConfig,
    #[serde(default)]
    pub treasury: TreasuryConfig,
    #[serde(default)]
    pub predictive: PredictiveConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub backfill: BackfillConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_enabled_analyzers")]
    pub enabled_analyzers: Vec<SignalType>,
    #[serde(default = "default_analyzer_timeout_ms")]
    pub analyzer_timeout_ms: u64,
    /// Independent live blocks processed at once
    #[serde(default = "default_max_concurrent_blocks")]
    pub max_concurrent_blocks: usize,
    #[serde(default = "default_true")]
    pub quiet_mode_enabled: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enabled_analyzers: default_enabled_analyzers(),
            analyzer_timeout_ms: default_analyzer_timeout_ms(),
            max_concurrent_blocks: default_max_concurrent_blocks(),
            quiet_mode_enabled: true,
        }
    }
}

impl PipelineConfig {
    pub fn is_enabled(&self, signal_type: SignalType) -> bool {
        self.enabled_analyzers.contains(&signal_type)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfidenceConfig {
    #[serde(default = "default_publish_threshold")]
    pub publish_threshold: f64,
    #[serde(default = "default_anomaly_penalty_factor")]
    pub anomaly_penalty_factor: f64,
    /// Anomaly deviation (in standard deviations) that trips quiet mode
    #[serde(default = "default_spike_threshold_sigma")]
    pub spike_threshold_sigma: f64,
    /// Mempool 24h fee change magnitude (percent) that trips quiet mode
    #[serde(default = "default_max_fee_change_24h_pct")]
    pub max_fee_change_24h_pct: f64,
    #[serde(default = "default_min_data_quality")]
    pub min_data_quality: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            publish_threshold: default_publish_threshold(),
            anomaly_penalty_factor: default_anomaly_penalty_factor(),
            spike_threshold_sigma: default_spike_threshold_sigma(),
            max_fee_change_24h_pct: default_max_fee_change_24h_pct(),
            min_data_quality: default_min_data_quality(),
        }
    }
}

/// Weights for scoring already-produced signals for publication
#[derive(Debug, Clone, Deserialize)]
pub struct PublicationConfig {
    #[serde(default = "default_weight_signal_strength")]
    pub signal_strength_weight: f64,
    #[serde(default = "default_weight_historical_accuracy")]
    pub historical_accuracy_weight: f64,
    #[serde(default = "default_weight_data_quality")]
    pub data_quality_weight: f64,
    /// Historical accuracy per signal type (snake_case keys)
    #[serde(default)]
    pub historical_accuracy: HashMap<String, f64>,
    #[serde(default = "default_historical_accuracy")]
    pub default_historical_accuracy: f64,
    #[serde(default = "default_data_quality")]
    pub default_data_quality: f64,
}

impl Default for PublicationConfig {
    fn default() -> Self {
        Self {
            signal_strength_weight: default_weight_signal_strength(),
            historical_accuracy_weight: default_weight_historical_accuracy(),
            data_quality_weight: default_weight_data_quality(),
            historical_accuracy: HashMap::new(),
            default_historical_accuracy: default_historical_accuracy(),
            default_data_quality: default_data_quality(),
        }
    }
}

impl PublicationConfig {
    /// Historical accuracy for a signal type, falling back to the default
    pub fn accuracy_for(&self, signal_type: SignalType) -> f64 {
        self.historical_accuracy
            .get(signal_type.as_str())
            .copied()
            .unwrap_or(self.default_historical_accuracy)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MempoolConfig {
    /// Relative increase over the historical average that counts as a spike
    #[serde(default = "default_spike_threshold")]
    pub spike_threshold: f64,
    #[serde(default = "default_block_interval_minutes")]
    pub block_interval_minutes: f64,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            spike_threshold: default_spike_threshold(),
            block_interval_minutes: default_block_interval_minutes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeFlowConfig {
    #[serde(default = "default_flow_min_history")]
    pub min_history_samples: usize,
    #[serde(default = "default_anomaly_z_threshold")]
    pub anomaly_z_threshold: f64,
    #[serde(default = "default_large_flow_threshold")]
    pub large_flow_threshold: f64,
}

impl Default for ExchangeFlowConfig {
    fn default() -> Self {
        Self {
            min_history_samples: default_flow_min_history(),
            anomaly_z_threshold: default_anomaly_z_threshold(),
            large_flow_threshold: default_large_flow_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhaleConfig {
    #[serde(default = "default_whale_min_history")]
    pub min_history_samples: usize,
    #[serde(default = "default_mega_threshold")]
    pub mega_threshold: f64,
    #[serde(default = "default_large_threshold")]
    pub large_threshold: f64,
    #[serde(default = "default_whale_threshold")]
    pub whale_threshold: f64,
}

impl Default for WhaleConfig {
    fn default() -> Self {
        Self {
            min_history_samples: default_whale_min_history(),
            mega_threshold: default_mega_threshold(),
            large_threshold: default_large_threshold(),
            whale_threshold: default_whale_threshold(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TreasuryConfig {
    /// JSON file of known entities and their addresses
    #[serde(default)]
    pub registry_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictiveConfig {
    /// Forecasts below this model confidence are suppressed entirely
    #[serde(default = "default_min_model_confidence")]
    pub min_model_confidence: f64,
    #[serde(default = "default_smoothing_alpha")]
    pub smoothing_alpha: f64,
    #[serde(default = "default_predictive_min_history")]
    pub min_history_samples: usize,
    #[serde(default = "default_fallback_confidence")]
    pub fallback_confidence: f64,
}

impl Default for PredictiveConfig {
    fn default() -> Self {
        Self {
            min_model_confidence: default_min_model_confidence(),
            smoothing_alpha: default_smoothing_alpha(),
            min_history_samples: default_predictive_min_history(),
            fallback_confidence: default_fallback_confidence(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
    /// Retries after the first failed attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackfillConfig {
    #[serde(default = "default_rate_limit")]
    pub rate_limit_blocks_per_minute: u32,
    /// Ask for confirmation above this many days unless forced
    #[serde(default = "default_confirm_above_days")]
    pub confirm_above_days: i64,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            rate_limit_blocks_per_minute: default_rate_limit(),
            confirm_above_days: default_confirm_above_days(),
        }
    }
}

impl BackfillConfig {
    /// Pause between consecutive blocks
    pub fn inter_block_delay(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(60.0 / self.rate_limit_blocks_per_minute.max(1) as f64)
    }
}

// Default value functions
fn default_enabled_analyzers() -> Vec<SignalType> {
    SignalType::ALL.to_vec()
}

fn default_analyzer_timeout_ms() -> u64 {
    5000
}

fn default_max_concurrent_blocks() -> usize {
    4
}

fn default_publish_threshold() -> f64 {
    0.70
}

fn default_anomaly_penalty_factor() -> f64 {
    0.8
}

fn default_spike_threshold_sigma() -> f64 {
    3.0
}

fn default_max_fee_change_24h_pct() -> f64 {
    300.0
}

fn default_min_data_quality() -> f64 {
    0.5
}

fn default_weight_signal_strength() -> f64 {
    0.40
}

fn default_weight_historical_accuracy() -> f64 {
    0.35
}

fn default_weight_data_quality() -> f64 {
    0.25
}

fn default_historical_accuracy() -> f64 {
    0.75
}

fn default_data_quality() -> f64 {
    0.8
}

fn default_spike_threshold() -> f64 {
    0.2
}

fn default_block_interval_minutes() -> f64 {
    10.0
}

fn default_flow_min_history() -> usize {
    10
}

fn default_anomaly_z_threshold() -> f64 {
    2.5
}

fn default_large_flow_threshold() -> f64 {
    100.0
}

fn default_whale_min_history() -> usize {
    7
}

fn default_mega_threshold() -> f64 {
    10_000.0
}

fn default_large_threshold() -> f64 {
    1_000.0
}

fn default_whale_threshold() -> f64 {
    100.0
}

fn default_min_model_confidence() -> f64 {
    0.5
}

fn default_smoothing_alpha() -> f64 {
    0.3
}

fn default_predictive_min_history() -> usize {
    10
}

fn default_fallback_confidence() -> f64 {
    0.3
}

fn default_store_path() -> String {
    "data/signals.jsonl".into()
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_rate_limit() -> u32 {
    60
}

fn default_confirm_above_days() -> i64 {
    30
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("store.path", default_store_path())?
            .set_default("store.max_retries", default_max_retries() as i64)?
            .set_default("store.base_delay_ms", default_base_delay_ms() as i64)?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix SIGNALS_)
            .add_source(
                config::Environment::with_prefix("SIGNALS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let unit_fields = [
            ("confidence.publish_threshold", self.confidence.publish_threshold),
            ("confidence.anomaly_penalty_factor", self.confidence.anomaly_penalty_factor),
            ("confidence.min_data_quality", self.confidence.min_data_quality),
            ("predictive.min_model_confidence", self.predictive.min_model_confidence),
            ("predictive.fallback_confidence", self.predictive.fallback_confidence),
            ("publication.default_historical_accuracy", self.publication.default_historical_accuracy),
            ("publication.default_data_quality", self.publication.default_data_quality),
        ];
        for (name, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{} must be within [0, 1], got {}", name, value);
            }
        }

        for (key, value) in &self.publication.historical_accuracy {
            key.parse::<SignalType>()
                .with_context(|| format!("Invalid publication.historical_accuracy key: {}", key))?;
            if !(0.0..=1.0).contains(value) {
                anyhow::bail!("publication.historical_accuracy.{} must be within [0, 1]", key);
            }
        }

        let weight_sum = self.publication.signal_strength_weight
            + self.publication.historical_accuracy_weight
            + self.publication.data_quality_weight;
        if (weight_sum - 1.0).abs() > 1e-6 {
            anyhow::bail!("publication weights must sum to 1.0, got {:.4}", weight_sum);
        }

        if self.predictive.smoothing_alpha <= 0.0 || self.predictive.smoothing_alpha > 1.0 {
            anyhow::bail!("predictive.smoothing_alpha must be within (0, 1]");
        }

        if self.confidence.spike_threshold_sigma <= 0.0 {
            anyhow::bail!("confidence.spike_threshold_sigma must be positive");
        }

        if self.mempool.spike_threshold <= 0.0 {
            anyhow::bail!("mempool.spike_threshold must be positive");
        }

        if self.mempool.block_interval_minutes <= 0.0 {
            anyhow::bail!("mempool.block_interval_minutes must be positive");
        }

        if self.exchange_flow.min_history_samples < 2 {
            anyhow::bail!("exchange_flow.min_history_samples must be at least 2");
        }

        if self.whale.min_history_samples < 7 {
            anyhow::bail!("whale.min_history_samples must be at least 7");
        }

        if !(self.whale.mega_threshold > self.whale.large_threshold
            && self.whale.large_threshold > self.whale.whale_threshold)
        {
            anyhow::bail!("whale tier thresholds must be strictly decreasing");
        }

        if self.pipeline.analyzer_timeout_ms == 0 {
            anyhow::bail!("pipeline.analyzer_timeout_ms must be positive");
        }

        if self.pipeline.max_concurrent_blocks == 0 {
            anyhow::bail!("pipeline.max_concurrent_blocks must be positive");
        }

        if self.backfill.rate_limit_blocks_per_minute == 0 {
            anyhow::bail!("backfill.rate_limit_blocks_per_minute must be positive");
        }

        if self.pipeline.enabled_analyzers.is_empty() {
            tracing::warn!("No analyzers enabled - cycles will produce no signals");
        }

        if self.store.max_retries == 0 {
            tracing::warn!("store.max_retries is 0 - persistence failures will not be retried");
        }

        Ok(())
    }

    /// Get configuration for display
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Pipeline:
    enabled_analyzers: {}
    analyzer_timeout: {}ms
    max_concurrent_blocks: {}
    quiet_mode: {}
  Confidence:
    publish_threshold: {}
    anomaly_penalty: {}
    spike_threshold: {}σ
    max_fee_change_24h: {}%
    min_data_quality: {}
  Publication weights:
    signal_strength: {}
    historical_accuracy: {}
    data_quality: {}
  Predictive:
    min_model_confidence: {}
    smoothing_alpha: {}
  Store:
    path: {}
    max_retries: {}
    base_delay: {}ms
  Backfill:
    rate_limit: {} blocks/min
"#,
            self.pipeline
                .enabled_analyzers
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            self.pipeline.analyzer_timeout_ms,
            self.pipeline.max_concurrent_blocks,
            self.pipeline.quiet_mode_enabled,
            self.confidence.publish_threshold,
            self.confidence.anomaly_penalty_factor,
            self.confidence.spike_threshold_sigma,
            self.confidence.max_fee_change_24h_pct,
            self.confidence.min_data_quality,
            self.publication.signal_strength_weight,
            self.publication.historical_accuracy_weight,
            self.publication.data_quality_weight,
            self.predictive.min_model_confidence,
            self.predictive.smoothing_alpha,
            self.store.path,
            self.store.max_retries,
            self.store.base_delay_ms,
            self.backfill.rate_limit_blocks_per_minute,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            confidence: ConfidenceConfig::default(),
            publication: PublicationConfig::default(),
            mempool: MempoolConfig::default(),
            exchange_flow: ExchangeFlowConfig::default(),
            whale: WhaleConfig::default(),
            treasury: TreasuryConfig::default(),
            predictive: PredictiveConfig::default(),
            store: StoreConfig::default(),
            backfill: BackfillConfig::default(),
        }
    }
}
