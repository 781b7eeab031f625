//! Known-entity address registry
//!
//! Maps on-chain addresses to the miners, corporate treasuries and exchanges
//! that control them. Read concurrently by analyzers during fan-out.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Kind of entity behind an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Miner,
    Corporate,
    Exchange,
    Other,
}

/// An identified entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownEntity {
    pub id: String,
    pub name: String,
    pub kind: EntityKind,
}

/// On-disk registry format
#[derive(Debug, Deserialize)]
struct RegistryFile {
    entities: Vec<RegistryEntry>,
}

#[derive(Debug, Deserialize)]
struct RegistryEntry {
    #[serde(flatten)]
    entity: KnownEntity,
    addresses: Vec<String>,
}

/// Address -> entity lookup
#[derive(Default)]
pub struct EntityRegistry {
    by_address: DashMap<String, KnownEntity>,
    by_id: DashMap<String, KnownEntity>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity under one or more addresses
    pub fn insert<I, S>(&self, entity: KnownEntity, addresses: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for address in addresses {
            self.by_address.insert(address.into(), entity.clone());
        }
        self.by_id.insert(entity.id.clone(), entity);
    }

    /// Load from a JSON file: `{"entities": [{"id", "name", "kind", "addresses": [...]}]}`
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let registry = Self::new();

        if !path.exists() {
            warn!(path = %path.display(), "Entity registry file not found, starting empty");
            return Ok(registry);
        }

        let data = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))?;
        let file: RegistryFile = serde_json::from_str(&data)
            .map_err(|e| Error::Config(format!("Invalid entity registry: {}", e)))?;

        for entry in file.entities {
            registry.insert(entry.entity, entry.addresses);
        }

        info!(
            entities = registry.entity_count(),
            addresses = registry.address_count(),
            "Loaded entity registry"
        );

        Ok(registry)
    }

    /// Entity controlling an address
    pub fn lookup(&self, address: &str) -> Option<KnownEntity> {
        self.by_address.get(address).map(|e| e.value().clone())
    }

    /// Entity controlling an address, restricted to one kind
    pub fn lookup_kind(&self, address: &str, kind: EntityKind) -> Option<KnownEntity> {
        self.lookup(address).filter(|e| e.kind == kind)
    }

    pub fn is_known(&self, entity_id: &str) -> bool {
        self.by_id.contains_key(entity_id)
    }

    pub fn entity(&self, entity_id: &str) -> Option<KnownEntity> {
        self.by_id.get(entity_id).map(|e| e.value().clone())
    }

    pub fn entity_count(&self) -> usize {
        self.by_id.len()
    }

    pub fn address_count(&self) -> usize {
        self.by_address.len()
    }

    /// Entity counts by kind, for startup logging
    pub fn kind_counts(&self) -> HashMap<EntityKind, usize> {
        let mut counts = HashMap::new();
        for entry in self.by_id.iter() {
            *counts.entry(entry.value().kind).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn miner() -> KnownEntity {
        KnownEntity {
            id: "pool-a".into(),
            name: "Pool A".into(),
            kind: EntityKind::Miner,
        }
    }

    #[test]
    fn test_lookup_by_address_and_kind() {
        let registry = EntityRegistry::new();
        registry.insert(miner(), ["1PoolA", "3PoolA"]);

        assert_eq!(registry.lookup("1PoolA").unwrap().id, "pool-a");
        assert!(registry.lookup_kind("3PoolA", EntityKind::Miner).is_some());
        assert!(registry.lookup_kind("3PoolA", EntityKind::Corporate).is_none());
        assert!(registry.lookup("unknown").is_none());
        assert!(registry.is_known("pool-a"));
        assert_eq!(registry.address_count(), 2);
        assert_eq!(registry.kind_counts()[&EntityKind::Miner], 1);
    }

    #[tokio::test]
    async fn test_load_registry_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entities.json");
        std::fs::write(
            &path,
            r#"{"entities": [
                {"id": "corp-1", "name": "Corp One", "kind": "corporate", "addresses": ["bc1corp"]},
                {"id": "ex-1", "name": "Exchange", "kind": "exchange", "addresses": ["bc1ex", "bc1ex2"]}
            ]}"#,
        )
        .unwrap();

        let registry = EntityRegistry::load(&path).await.unwrap();
        assert_eq!(registry.entity_count(), 2);
        assert_eq!(registry.lookup("bc1ex2").unwrap().kind, EntityKind::Exchange);
    }

    #[tokio::test]
    async fn test_missing_registry_file_is_empty() {
        let registry = EntityRegistry::load("/nonexistent/entities.json").await.unwrap();
        assert_eq!(registry.entity_count(), 0);
    }
}
