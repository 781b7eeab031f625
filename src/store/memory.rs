//! In-memory sink for tests and dry runs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::SignalSink;
use crate::error::Result;
use crate::signal::SignalRecord;

#[derive(Default)]
pub struct MemorySignalStore {
    records: RwLock<Vec<SignalRecord>>,
}

impl MemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Snapshot of every stored record
    pub async fn records(&self) -> Vec<SignalRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl SignalSink for MemorySignalStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn write_batch(&self, records: &[SignalRecord]) -> Result<()> {
        self.records.write().await.extend_from_slice(records);
        Ok(())
    }

    async fn pending(&self, limit: usize) -> Result<Vec<SignalRecord>> {
        let mut pending: Vec<SignalRecord> = self
            .records
            .read()
            .await
            .iter()
            .filter(|r| !r.processed)
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.created_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn mark_processed(&self, ids: &[String], at: DateTime<Utc>) -> Result<usize> {
        let mut records = self.records.write().await;
        let mut marked = 0;
        for record in records.iter_mut() {
            if !record.processed && ids.contains(&record.signal_id) {
                record.processed = true;
                record.processed_at = Some(at);
                marked += 1;
            }
        }
        Ok(marked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalType;
    use chrono::{Duration, TimeZone};
    use serde_json::Map;

    fn record(id: &str, minutes: i64) -> SignalRecord {
        SignalRecord {
            signal_id: id.into(),
            signal_type: SignalType::Mempool,
            block_height: 1,
            confidence: 0.5,
            metadata: Map::new(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                + Duration::minutes(minutes),
            processed: false,
            processed_at: None,
        }
    }

    #[tokio::test]
    async fn test_pending_ordered_and_acked() {
        let store = MemorySignalStore::new();
        store
            .write_batch(&[record("late", 10), record("early", 1), record("mid", 5)])
            .await
            .unwrap();

        let ids: Vec<_> = store
            .pending(10)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.signal_id)
            .collect();
        assert_eq!(ids, vec!["early", "mid", "late"]);

        let marked = store
            .mark_processed(&["mid".to_string(), "missing".to_string()], Utc::now())
            .await
            .unwrap();
        assert_eq!(marked, 1);

        let pending = store.pending(1).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].signal_id, "early");
    }
}
