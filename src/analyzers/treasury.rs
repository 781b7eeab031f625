//! Miner and corporate treasury analyzers
//!
//! Both scan the block's transactions against the entity registry and only
//! differ in which entity kind they match and which payload they emit.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::Analyzer;
use crate::confidence::clamp01;
use crate::context::{EntityKind, EntityRegistry, KnownEntity, ProcessingContext, RawTransaction};
use crate::error::Result;
use crate::signal::{FlowDirection, Signal, SignalPayload, SignalType, TreasuryPayload};

/// A matched (transaction, entity) movement
#[derive(Debug, Clone, PartialEq)]
pub struct TreasuryMovement {
    pub entity: KnownEntity,
    pub direction: FlowDirection,
    pub amount: f64,
    pub txid: String,
    pub address: String,
}

/// Registry-backed transaction scanner for one entity kind
pub struct TreasuryScanner {
    registry: Arc<EntityRegistry>,
    kind: EntityKind,
}

impl TreasuryScanner {
    pub fn new(registry: Arc<EntityRegistry>, kind: EntityKind) -> Self {
        Self { registry, kind }
    }

    /// Movements in one transaction, at most one per entity
    ///
    /// An entity spending an input distributes the whole transaction output.
    /// Otherwise an entity receiving outputs accumulates their sum.
    pub fn scan(&self, tx: &RawTransaction) -> Vec<TreasuryMovement> {
        let mut movements: BTreeMap<String, TreasuryMovement> = BTreeMap::new();

        for input in &tx.inputs {
            let Some(address) = input.address.as_deref() else {
                continue;
            };
            if let Some(entity) = self.registry.lookup_kind(address, self.kind) {
                movements
                    .entry(entity.id.clone())
                    .or_insert_with(|| TreasuryMovement {
                        entity,
                        direction: FlowDirection::Distribution,
                        amount: tx.total_output(),
                        txid: tx.txid.clone(),
                        address: address.to_string(),
                    });
            }
        }

        for output in &tx.outputs {
            let Some(address) = output.address.as_deref() else {
                continue;
            };
            let Some(entity) = self.registry.lookup_kind(address, self.kind) else {
                continue;
            };

            let movement = movements
                .entry(entity.id.clone())
                .or_insert_with(|| TreasuryMovement {
                    entity,
                    direction: FlowDirection::Accumulation,
                    amount: 0.0,
                    txid: tx.txid.clone(),
                    address: address.to_string(),
                });
            if movement.direction == FlowDirection::Accumulation {
                movement.amount += output.value;
            }
        }

        movements.into_values().collect()
    }

    /// Reputation baseline plus size bonuses
    pub fn confidence(amount: f64) -> f64 {
        let mut confidence: f64 = 0.7;
        if amount > 100.0 {
            confidence += 0.1;
        }
        if amount > 500.0 {
            confidence += 0.1;
        }
        clamp01(confidence)
    }

    fn signals<F>(&self, ctx: &ProcessingContext, wrap: F) -> Result<Vec<Signal>>
    where
        F: Fn(TreasuryPayload) -> SignalPayload,
    {
        let Some(transactions) = ctx.historical().transactions.as_ref() else {
            return Ok(Vec::new());
        };

        let mut signals = Vec::new();
        for tx in transactions {
            for movement in self.scan(tx) {
                let confidence = Self::confidence(movement.amount);
                debug!(
                    entity = %movement.entity.id,
                    direction = ?movement.direction,
                    amount = movement.amount,
                    txid = %movement.txid,
                    "Treasury movement"
                );

                let entity_id = movement.entity.id.clone();
                let payload = TreasuryPayload {
                    entity_id: movement.entity.id,
                    entity_name: movement.entity.name,
                    direction: movement.direction,
                    amount: movement.amount,
                    txid: movement.txid.clone(),
                    address: movement.address,
                };

                let signal = Signal::for_context(wrap(payload), confidence, ctx)?
                    .with_transactions([movement.txid])
                    .with_entities([entity_id]);
                signals.push(signal);
            }
        }
        Ok(signals)
    }
}

/// Known mining pools moving coinbase proceeds
pub struct MinerTreasuryAnalyzer {
    scanner: TreasuryScanner,
}

impl MinerTreasuryAnalyzer {
    pub fn new(registry: Arc<EntityRegistry>) -> Self {
        Self {
            scanner: TreasuryScanner::new(registry, EntityKind::Miner),
        }
    }
}

#[async_trait]
impl Analyzer for MinerTreasuryAnalyzer {
    fn name(&self) -> &'static str {
        "miner_treasury"
    }

    fn signal_type(&self) -> SignalType {
        SignalType::MinerTreasury
    }

    async fn analyze(&self, ctx: &ProcessingContext) -> Result<Vec<Signal>> {
        self.scanner.signals(ctx, SignalPayload::MinerTreasury)
    }
}

/// Public companies holding coins on balance sheet
pub struct CorporateTreasuryAnalyzer {
    scanner: TreasuryScanner,
}

impl CorporateTreasuryAnalyzer {
    pub fn new(registry: Arc<EntityRegistry>) -> Self {
        Self {
            scanner: TreasuryScanner::new(registry, EntityKind::Corporate),
        }
    }
}

#[async_trait]
impl Analyzer for CorporateTreasuryAnalyzer {
    fn name(&self) -> &'static str {
        "corporate_treasury"
    }

    fn signal_type(&self) -> SignalType {
        SignalType::CorporateTreasury
    }

    async fn analyze(&self, ctx: &ProcessingContext) -> Result<Vec<Signal>> {
        self.scanner.signals(ctx, SignalPayload::CorporateTreasury)
    }
}
