//! Block context provider seam
//!
//! The provider owns raw chain data acquisition. The pipeline only asks it
//! for a block's context or for the heights inside a date range.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::BlockContext;
use crate::error::{Error, Result};

/// Source of per-block input for the pipeline
#[async_trait]
pub trait BlockContextProvider: Send + Sync {
    /// Context for a single block
    async fn context_for(&self, height: u64) -> Result<Arc<BlockContext>>;

    /// Heights whose block timestamp falls within [start, end], oldest first
    async fn heights_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<u64>>;

    /// Most recent `limit` heights, oldest first
    async fn latest_heights(&self, limit: usize) -> Result<Vec<u64>>;
}

/// Provider backed by a JSON array of block contexts
pub struct JsonFileProvider {
    blocks: BTreeMap<u64, Arc<BlockContext>>,
}

impl JsonFileProvider {
    /// Build from already-parsed contexts (later duplicates win)
    pub fn from_contexts(contexts: Vec<BlockContext>) -> Self {
        let blocks = contexts
            .into_iter()
            .map(|ctx| (ctx.block.height, Arc::new(ctx)))
            .collect();
        Self { blocks }
    }

    /// Load contexts from disk
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))?;

        let contexts: Vec<BlockContext> = serde_json::from_str(&data)?;
        let provider = Self::from_contexts(contexts);

        info!(
            blocks = provider.blocks.len(),
            path = %path.display(),
            "Loaded block contexts"
        );

        Ok(provider)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[async_trait]
impl BlockContextProvider for JsonFileProvider {
    async fn context_for(&self, height: u64) -> Result<Arc<BlockContext>> {
        self.blocks
            .get(&height)
            .cloned()
            .ok_or_else(|| Error::ContextUnavailable(format!("No context for block {}", height)))
    }

    async fn heights_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<u64>> {
        let mut heights: Vec<(chrono::DateTime<chrono::Utc>, u64)> = self
            .blocks
            .values()
            .filter(|ctx| {
                let date = ctx.block.timestamp.date_naive();
                date >= start && date <= end
            })
            .map(|ctx| (ctx.block.timestamp, ctx.block.height))
            .collect();

        heights.sort();
        Ok(heights.into_iter().map(|(_, h)| h).collect())
    }

    async fn latest_heights(&self, limit: usize) -> Result<Vec<u64>> {
        let mut heights: Vec<u64> = self.blocks.keys().rev().take(limit).copied().collect();
        heights.reverse();
        Ok(heights)
    }
}
