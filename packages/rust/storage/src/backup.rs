//! Bounded log of leads that reached a terminal state.
//!
//! Stored as one JSON array under [`BACKUP_LOG_KEY`]. Appending past
//! `capacity` evicts the oldest entries first.

use std::sync::Arc;

use leadpipe_shared::{LeadId, LeadRecord, Result};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::KeyValueStore;

/// Store key holding the processed-leads log.
pub const BACKUP_LOG_KEY: &str = "processed_leads";

/// Store key an unparseable log blob is moved to before the log is reset.
pub const UNREADABLE_LOG_KEY: &str = "processed_leads.unreadable";

/// FIFO-bounded backup log over a [`KeyValueStore`].
pub struct BackupLog {
    store: Arc<dyn KeyValueStore>,
    capacity: usize,
    /// Serializes read-modify-write cycles on the log blob.
    write_lock: Mutex<()>,
}

impl BackupLog {
    pub fn new(store: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
            write_lock: Mutex::new(()),
        }
    }

    /// Append a terminal record, evicting the oldest entries beyond capacity.
    /// Returns the log length after the append.
    pub async fn append(&self, record: &LeadRecord) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let mut entries = match self.store.get(BACKUP_LOG_KEY).await? {
            Some(blob) => match serde_json::from_str::<Vec<LeadRecord>>(&blob) {
                Ok(entries) => entries,
                Err(e) => {
                    self.store.set(UNREADABLE_LOG_KEY, &blob).await?;
                    warn!(
                        error = %e,
                        moved_to = UNREADABLE_LOG_KEY,
                        "backup log is unreadable, starting a fresh one"
                    );
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        entries.push(record.clone());
        if entries.len() > self.capacity {
            let evicted = entries.len() - self.capacity;
            entries.drain(..evicted);
            debug!(evicted, "backup log at capacity, evicted oldest entries");
        }

        let blob = serde_json::to_string(&entries)?;
        self.store.set(BACKUP_LOG_KEY, &blob).await?;
        Ok(entries.len())
    }

    /// All entries, oldest first.
    pub async fn entries(&self) -> Result<Vec<LeadRecord>> {
        match self.store.get(BACKUP_LOG_KEY).await? {
            Some(blob) => Ok(serde_json::from_str(&blob)?),
            None => Ok(Vec::new()),
        }
    }

    /// The `n` most recent entries, oldest first.
    pub async fn recent(&self, n: usize) -> Result<Vec<LeadRecord>> {
        let mut entries = self.entries().await?;
        let start = entries.len().saturating_sub(n);
        Ok(entries.split_off(start))
    }

    /// Latest entry for `id`, if it is still in the log.
    pub async fn find(&self, id: &LeadId) -> Result<Option<LeadRecord>> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .rev()
            .find(|record| &record.id == id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use leadpipe_shared::{LeadStatus, RawLead};

    fn terminal_record(name: &str) -> LeadRecord {
        let mut record = LeadRecord::from_raw(RawLead::new(name, "lead@example.org"));
        record.status = LeadStatus::Processed;
        record
    }

    #[tokio::test]
    async fn append_and_read_back() {
        let log = BackupLog::new(Arc::new(MemoryStore::new()), 50);
        let record = terminal_record("Ada");

        assert_eq!(log.append(&record).await.expect("append"), 1);

        let entries = log.entries().await.expect("entries");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, record.id);
        assert_eq!(entries[0].status, LeadStatus::Processed);

        let found = log.find(&record.id).await.expect("find");
        assert_eq!(found.map(|r| r.name), Some("Ada".to_string()));
    }

    #[tokio::test]
    async fn evicts_oldest_past_capacity() {
        let log = BackupLog::new(Arc::new(MemoryStore::new()), 50);
        let records: Vec<_> = (0..51).map(|i| terminal_record(&format!("lead {i}"))).collect();

        for record in &records {
            log.append(record).await.expect("append");
        }

        let entries = log.entries().await.expect("entries");
        assert_eq!(entries.len(), 50);
        assert_eq!(entries[0].id, records[1].id);
        assert_eq!(entries[49].id, records[50].id);
        assert!(log.find(&records[0].id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recent_returns_tail() {
        let log = BackupLog::new(Arc::new(MemoryStore::new()), 50);
        for i in 0..12 {
            log.append(&terminal_record(&format!("lead {i}"))).await.unwrap();
        }

        let recent = log.recent(10).await.unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].name, "lead 2");
        assert_eq!(recent[9].name, "lead 11");
    }

    #[tokio::test]
    async fn corrupt_blob_is_kept_aside_on_append() {
        let store = Arc::new(MemoryStore::new());
        store.set(BACKUP_LOG_KEY, "{not json").await.unwrap();
        let log = BackupLog::new(store.clone(), 50);

        assert!(log.entries().await.is_err());
        assert_eq!(log.append(&terminal_record("Ada")).await.unwrap(), 1);
        assert_eq!(log.entries().await.unwrap().len(), 1);
        assert_eq!(
            store.get(UNREADABLE_LOG_KEY).await.unwrap().as_deref(),
            Some("{not json")
        );
    }
}
