use crate::{
    error::StateStoreError,
    state::{
        StateStore,
        models::{BlockStatus, ProgressRecord, WalEntry},
    },
};
use async_trait::async_trait;
use planner::Block;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Process-local store. Progress survives cancellation and resume within the
/// same process, but not a restart.
#[derive(Default)]
pub struct MemoryStateStore {
    records: RwLock<BTreeMap<(String, Block), ProgressRecord>>,
    wal: RwLock<Vec<WalEntry>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn save_record(&self, record: &ProgressRecord) -> Result<(), StateStoreError> {
        let mut records = self.records.write().await;
        let key = (record.run_id.clone(), record.block);

        if let Some(existing) = records.get(&key)
            && existing.status == BlockStatus::Succeeded
            && record.status != BlockStatus::Succeeded
        {
            return Ok(());
        }

        records.insert(key, record.clone());
        Ok(())
    }

    async fn load_records(&self, run_id: &str) -> Result<Vec<ProgressRecord>, StateStoreError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|((run, _), _)| run == run_id)
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn append_wal(&self, entry: &WalEntry) -> Result<(), StateStoreError> {
        self.wal.write().await.push(entry.clone());
        Ok(())
    }

    async fn iter_wal(&self, run_id: &str) -> Result<Vec<WalEntry>, StateStoreError> {
        let wal = self.wal.read().await;
        Ok(wal
            .iter()
            .filter(|entry| entry.run_id() == run_id)
            .cloned()
            .collect())
    }
}
