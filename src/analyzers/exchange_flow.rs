//! Exchange-flow analyzer
//!
//! Scores each tracked exchange's inflow against its own history and looks
//! for flow patterns that usually precede large deposits or withdrawals.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::stats::{mean, std_dev, z_score};
use super::Analyzer;
use crate::config::ExchangeFlowConfig;
use crate::confidence::clamp01;
use crate::context::{EntityRegistry, ExchangeFlowSnapshot, FlowSample, ProcessingContext};
use crate::error::Result;
use crate::signal::{ExchangeFlowPayload, FlowPattern, Signal, SignalPayload, SignalType};

/// Inflow statistics against an entity's history
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowStatistics {
    pub mean: f64,
    pub std_dev: f64,
    pub z_score: f64,
    pub is_anomaly: bool,
    pub sample_count: usize,
}

/// Inflow z-score; too little history yields z = 0 and no anomaly
pub fn compute_flow_statistics(
    inflow: f64,
    history: &[FlowSample],
    min_samples: usize,
    z_threshold: f64,
) -> FlowStatistics {
    let inflows: Vec<f64> = history.iter().map(|s| s.inflow).collect();
    let sample_count = inflows.len();

    if sample_count < min_samples {
        return FlowStatistics {
            mean: mean(&inflows),
            std_dev: 0.0,
            z_score: 0.0,
            is_anomaly: false,
            sample_count,
        };
    }

    let m = mean(&inflows);
    let sd = std_dev(&inflows);
    let z = z_score(inflow, m, sd);

    FlowStatistics {
        mean: m,
        std_dev: sd,
        z_score: z,
        is_anomaly: z.abs() > z_threshold,
        sample_count,
    }
}

/// Pattern flags for one entity's current flow
pub fn detect_patterns(current: &ExchangeFlowSnapshot, history: &[FlowSample]) -> Vec<FlowPattern> {
    let mut patterns = Vec::new();
    if history.is_empty() {
        return patterns;
    }

    let avg_size = mean(&history.iter().map(|s| s.avg_tx_size).collect::<Vec<_>>());
    if avg_size > 0.0 && current.avg_tx_size > 5.0 * avg_size {
        patterns.push(FlowPattern::LargeSingleTransaction);
    }

    let avg_inflow = mean(&history.iter().map(|s| s.inflow).collect::<Vec<_>>());
    if avg_inflow > 0.0 && current.inflow > 3.0 * avg_inflow {
        patterns.push(FlowPattern::VolumeSpike);
    }

    if history.len() >= 10 {
        let positive = history[history.len() - 10..]
            .iter()
            .filter(|s| s.net_flow() > 0.0)
            .count();
        if positive >= 7 {
            patterns.push(FlowPattern::RapidAccumulation);
        }
    }

    patterns
}

pub struct ExchangeFlowAnalyzer {
    config: ExchangeFlowConfig,
    registry: Arc<EntityRegistry>,
}

impl ExchangeFlowAnalyzer {
    pub fn new(config: ExchangeFlowConfig, registry: Arc<EntityRegistry>) -> Self {
        Self { config, registry }
    }

    fn confidence(
        &self,
        flow: &ExchangeFlowSnapshot,
        stats: &FlowStatistics,
        patterns: &[FlowPattern],
        known: bool,
    ) -> f64 {
        let mut confidence: f64 = 0.5;

        if known {
            confidence += 0.2;
        }

        let z = stats.z_score.abs();
        if z > 3.0 {
            confidence += 0.2;
        } else if z > 2.5 {
            confidence += 0.1;
        }

        match patterns.len() {
            0 => {}
            1 => confidence += 0.05,
            _ => confidence += 0.15,
        }

        if flow.inflow > self.config.large_flow_threshold {
            confidence += 0.1;
        }

        if flow.tx_count < 3 {
            confidence -= 0.1;
        }

        clamp01(confidence)
    }

    fn analyze_entity(
        &self,
        ctx: &ProcessingContext,
        flow: &ExchangeFlowSnapshot,
    ) -> Result<Option<Signal>> {
        let history = ctx.historical().flow_history(&flow.entity_id);
        let stats = compute_flow_statistics(
            flow.inflow,
            history,
            self.config.min_history_samples,
            self.config.anomaly_z_threshold,
        );
        let patterns = detect_patterns(flow, history);

        let registered = self.registry.entity(&flow.entity_id);
        let known = flow.known_entity || registered.is_some();

        if !stats.is_anomaly
            && patterns.is_empty()
            && flow.inflow <= self.config.large_flow_threshold
        {
            return Ok(None);
        }

        let confidence = self.confidence(flow, &stats, &patterns, known);

        debug!(
            entity = %flow.entity_id,
            z_score = stats.z_score,
            anomaly = stats.is_anomaly,
            patterns = patterns.len(),
            confidence,
            "Exchange flow signal"
        );

        let payload = ExchangeFlowPayload {
            entity_id: flow.entity_id.clone(),
            entity_name: flow
                .entity_name
                .clone()
                .or_else(|| registered.map(|e| e.name)),
            inflow: flow.inflow,
            outflow: flow.outflow,
            net_flow: flow.net_flow(),
            tx_count: flow.tx_count,
            z_score: stats.z_score,
            is_anomaly: stats.is_anomaly,
            patterns,
            sample_count: stats.sample_count,
        };

        let signal = Signal::for_context(SignalPayload::ExchangeFlow(payload), confidence, ctx)?
            .with_entities([flow.entity_id.clone()]);
        Ok(Some(signal))
    }
}

#[async_trait]
impl Analyzer for ExchangeFlowAnalyzer {
    fn name(&self) -> &'static str {
        "exchange_flow"
    }

    fn signal_type(&self) -> SignalType {
        SignalType::ExchangeFlow
    }

    async fn analyze(&self, ctx: &ProcessingContext) -> Result<Vec<Signal>> {
        let Some(flows) = ctx.historical().exchange_flows.as_ref() else {
            return Ok(Vec::new());
        };

        let mut signals = Vec::new();
        for flow in flows {
            if let Some(signal) = self.analyze_entity(ctx, flow)? {
                signals.push(signal);
            }
        }
        Ok(signals)
    }
}
