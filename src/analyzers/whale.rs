//! Whale accumulation analyzer
//!
//! Tiers large wallets by balance, measures how long they have been
//! accumulating and flags accumulation patterns from their daily history.

use async_trait::async_trait;
use tracing::debug;

use super::stats::{mean, std_dev};
use super::Analyzer;
use crate::config::WhaleConfig;
use crate::confidence::clamp01;
use crate::context::{ProcessingContext, WhaleSample, WhaleSnapshot};
use crate::error::Result;
use crate::signal::{Signal, SignalPayload, SignalType, WhalePattern, WhalePayload, WhaleTier};

/// Consecutive accumulation days and the amount gained over them
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Streak {
    pub days: u32,
    pub total: f64,
}

/// True when the latest 3 samples average more than 1.5x the earliest 3
///
/// Takes the last 7 samples of a series; shorter input is never accelerating.
pub fn is_accelerating(window: &[f64]) -> bool {
    if window.len() < 7 {
        return false;
    }
    let window = &window[window.len() - 7..];
    let early = mean(&window[..3]);
    let late = mean(&window[4..]);
    late > 0.0 && late > 1.5 * early
}

/// Accumulation streak ending at the current snapshot
///
/// Counts back while the 7-day change stays positive. The total sums
/// positive day-over-day balance increases across the streak.
pub fn accumulation_streak(current: &WhaleSnapshot, history: &[WhaleSample]) -> Streak {
    if current.change_7d <= 0.0 {
        return Streak { days: 0, total: 0.0 };
    }

    let prior = history
        .iter()
        .rev()
        .take_while(|s| s.change_7d > 0.0)
        .count();
    let days = prior as u32 + 1;

    // Include the sample just before the streak as the baseline
    let start = history.len().saturating_sub(prior + 1);
    let balances: Vec<f64> = history[start..]
        .iter()
        .map(|s| s.balance)
        .chain(std::iter::once(current.balance))
        .collect();

    let total = balances
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|d| *d > 0.0)
        .sum();

    Streak { days, total }
}

pub struct WhaleAnalyzer {
    config: WhaleConfig,
}

impl WhaleAnalyzer {
    pub fn new(config: WhaleConfig) -> Self {
        Self { config }
    }

    pub fn tier(&self, balance: f64) -> WhaleTier {
        if balance >= self.config.mega_threshold {
            WhaleTier::Mega
        } else if balance >= self.config.large_threshold {
            WhaleTier::Large
        } else if balance >= self.config.whale_threshold {
            WhaleTier::Whale
        } else {
            WhaleTier::None
        }
    }

    fn patterns(&self, current: &WhaleSnapshot, history: &[WhaleSample]) -> Vec<WhalePattern> {
        let mut patterns = Vec::new();
        if history.len() < self.config.min_history_samples {
            return patterns;
        }

        let changes: Vec<f64> = history.iter().map(|s| s.change_7d).collect();
        let recent = &changes[changes.len() - 7..];

        if is_accelerating(recent) {
            patterns.push(WhalePattern::Accelerating);
        }

        if current.change_7d > 10.0 {
            patterns.push(WhalePattern::LargeSingleDay);
        }

        let positive: Vec<f64> = recent.iter().copied().filter(|c| *c > 0.0).collect();
        if positive.len() >= 2 && std_dev(&positive) < 0.5 * mean(&positive) {
            patterns.push(WhalePattern::ConsistentSmall);
        }

        patterns
    }

    fn confidence(tier: WhaleTier, streak: &Streak, pattern_count: usize) -> f64 {
        let mut confidence: f64 = 0.5;

        confidence += match tier {
            WhaleTier::Mega => 0.2,
            WhaleTier::Large => 0.15,
            WhaleTier::Whale => 0.1,
            WhaleTier::None => 0.0,
        };

        if streak.days >= 14 {
            confidence += 0.2;
        } else if streak.days >= 7 {
            confidence += 0.15;
        } else if streak.days >= 3 {
            confidence += 0.1;
        }

        match pattern_count {
            0 => {}
            1 => confidence += 0.05,
            _ => confidence += 0.15,
        }

        if streak.total > 1000.0 {
            confidence += 0.1;
        } else if streak.total > 100.0 {
            confidence += 0.05;
        }

        if streak.days < 2 {
            confidence -= 0.2;
        }

        clamp01(confidence)
    }
}

#[async_trait]
impl Analyzer for WhaleAnalyzer {
    fn name(&self) -> &'static str {
        "whale_accumulation"
    }

    fn signal_type(&self) -> SignalType {
        SignalType::WhaleAccumulation
    }

    async fn analyze(&self, ctx: &ProcessingContext) -> Result<Vec<Signal>> {
        let Some(wallets) = ctx.historical().whale_data.as_ref() else {
            return Ok(Vec::new());
        };

        let mut signals = Vec::new();
        for wallet in wallets {
            let tier = self.tier(wallet.balance);
            if tier == WhaleTier::None || wallet.change_7d <= 0.0 {
                continue;
            }

            let mut history = ctx.historical().whale_history(&wallet.address).to_vec();
            history.sort_by_key(|s| s.timestamp);

            let streak = accumulation_streak(wallet, &history);
            let patterns = self.patterns(wallet, &history);
            let confidence = Self::confidence(tier, &streak, patterns.len());

            debug!(
                address = %wallet.address,
                tier = ?tier,
                streak_days = streak.days,
                patterns = patterns.len(),
                confidence,
                "Whale accumulating"
            );

            let payload = WhalePayload {
                address: wallet.address.clone(),
                balance: wallet.balance,
                tier,
                change_7d: wallet.change_7d,
                streak_days: streak.days,
                streak_total: streak.total,
                patterns,
            };

            signals.push(
                Signal::for_context(SignalPayload::WhaleAccumulation(payload), confidence, ctx)?
                    .with_entities([wallet.address.clone()]),
            );
        }

        Ok(signals)
    }
}
