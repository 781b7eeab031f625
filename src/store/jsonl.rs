//! Append-only JSON Lines sink
//!
//! Each batch is appended with one write and fsynced. A failed append is
//! truncated back to the prior length so a retry never leaves half a batch
//! behind; readers still keep only the first record per `signal_id`.
//! Acknowledgements from the downstream consumer go to a sibling
//! `<path>.acks` file so stored records are never rewritten.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::SignalSink;
use crate::error::{Error, Result};
use crate::signal::SignalRecord;

#[derive(Debug, Serialize, Deserialize)]
struct Ack {
    signal_id: String,
    processed_at: DateTime<Utc>,
}

pub struct JsonlSignalStore {
    path: PathBuf,
    acks_path: PathBuf,
    /// Serializes appends to both files
    write_lock: Mutex<()>,
}

impl JsonlSignalStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut acks: OsString = path.clone().into_os_string();
        acks.push(".acks");
        Self {
            path,
            acks_path: PathBuf::from(acks),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Persistence(format!("{}: {}", parent.display(), e)))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| Error::Persistence(format!("{}: {}", path.display(), e)))?;

        let prior_len = file
            .metadata()
            .await
            .map_err(|e| Error::Persistence(format!("{}: {}", path.display(), e)))?
            .len();

        let written = match file.write_all(data).await {
            Ok(()) => file.sync_all().await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            if let Err(trunc) = file.set_len(prior_len).await {
                warn!(path = %path.display(), error = %trunc, "Failed to roll back partial append");
            }
            return Err(Error::Persistence(format!("{}: {}", path.display(), e)));
        }
        Ok(())
    }

    async fn read_lines(path: &Path) -> Result<Vec<String>> {
        match tokio::fs::read_to_string(path).await {
            Ok(data) => Ok(data
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Error::Io(format!("{}: {}", path.display(), e))),
        }
    }

    /// Every stored record with acknowledgements applied
    pub async fn load_all(&self) -> Result<Vec<SignalRecord>> {
        let mut acks: HashMap<String, DateTime<Utc>> = HashMap::new();
        for line in Self::read_lines(&self.acks_path).await? {
            match serde_json::from_str::<Ack>(&line) {
                Ok(ack) => {
                    acks.entry(ack.signal_id).or_insert(ack.processed_at);
                }
                Err(e) => warn!(path = %self.acks_path.display(), error = %e, "Skipping malformed ack"),
            }
        }

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for line in Self::read_lines(&self.path).await? {
            match serde_json::from_str::<SignalRecord>(&line) {
                Ok(mut record) => {
                    if !seen.insert(record.signal_id.clone()) {
                        debug!(signal_id = %record.signal_id, "Skipping duplicate record");
                        continue;
                    }
                    if let Some(at) = acks.get(&record.signal_id) {
                        record.processed = true;
                        record.processed_at = Some(*at);
                    }
                    records.push(record);
                }
                Err(e) => warn!(path = %self.path.display(), error = %e, "Skipping malformed record"),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl SignalSink for JsonlSignalStore {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    async fn write_batch(&self, records: &[SignalRecord]) -> Result<()> {
        let mut buffer = String::new();
        for record in records {
            buffer.push_str(&serde_json::to_string(record)?);
            buffer.push('\n');
        }

        let _guard = self.write_lock.lock().await;
        Self::append(&self.path, buffer.as_bytes()).await?;
        debug!(path = %self.path.display(), count = records.len(), "Appended signal records");
        Ok(())
    }

    async fn pending(&self, limit: usize) -> Result<Vec<SignalRecord>> {
        let mut pending: Vec<SignalRecord> = self
            .load_all()
            .await?
            .into_iter()
            .filter(|r| !r.processed)
            .collect();
        pending.sort_by_key(|r| r.created_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn mark_processed(&self, ids: &[String], at: DateTime<Utc>) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let mut buffer = String::new();
        let mut marked = 0;
        for record in self.load_all().await? {
            if !record.processed && ids.contains(&record.signal_id) {
                let ack = Ack {
                    signal_id: record.signal_id,
                    processed_at: at,
                };
                buffer.push_str(&serde_json::to_string(&ack)?);
                buffer.push('\n');
                marked += 1;
            }
        }

        if marked > 0 {
            Self::append(&self.acks_path, buffer.as_bytes()).await?;
        }
        Ok(marked)
    }
}
