use crate::{
    error::StateStoreError,
    state::{
        StateStore,
        models::{BlockStatus, ProgressRecord, WalEntry},
    },
};
use async_trait::async_trait;
use planner::Block;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::path::Path;

pub struct SledStateStore {
    db: sled::Db,
}

impl SledStateStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, sled::Error> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Record keys sort by block start time within a run.
    #[inline]
    fn rec_key(run_id: &str, block: &Block) -> String {
        format!(
            "{}{:016x}:{:016x}",
            Self::rec_prefix(run_id),
            Self::ordered(block.mint()),
            Self::ordered(block.maxt())
        )
    }

    #[inline]
    fn rec_prefix(run_id: &str) -> String {
        format!("rec:{}", Self::run_segment(run_id))
    }

    #[inline]
    fn wal_prefix(run_id: &str) -> String {
        format!("wal:{}", Self::run_segment(run_id))
    }

    /// Length-prefixed so one run id is never a key prefix of another,
    /// e.g. `a` and `a:x`.
    #[inline]
    fn run_segment(run_id: &str) -> String {
        format!("{}:{}:", run_id.len(), run_id)
    }

    /// Flips the sign bit so negative timestamps sort before positive ones
    /// under lexicographic byte order.
    #[inline]
    fn ordered(ts: i64) -> u64 {
        (ts as u64) ^ (1 << 63)
    }
}

#[async_trait]
impl StateStore for SledStateStore {
    async fn save_record(&self, record: &ProgressRecord) -> Result<(), StateStoreError> {
        let key = Self::rec_key(&record.run_id, &record.block);
        let new_bytes =
            bincode::serialize(record).map_err(|e| StateStoreError::SaveRecord(e.to_string()))?;

        // Check-then-set in one transaction so a finished block is never
        // downgraded by a concurrent writer.
        let result = self.db.transaction::<_, _, String>(|tx_db| {
            if let Some(existing_bytes) = tx_db.get(&key)? {
                let existing: ProgressRecord = bincode::deserialize(&existing_bytes)
                    .map_err(|e| ConflictableTransactionError::Abort(e.to_string()))?;

                if existing.status == BlockStatus::Succeeded
                    && record.status != BlockStatus::Succeeded
                {
                    return Ok(());
                }
            }

            tx_db.insert(key.as_bytes(), new_bytes.as_slice())?;
            Ok(())
        });

        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(e)) => Err(StateStoreError::SaveRecord(e)),
            Err(TransactionError::Storage(e)) => Err(StateStoreError::SaveRecord(e.to_string())),
        }
    }

    async fn load_records(&self, run_id: &str) -> Result<Vec<ProgressRecord>, StateStoreError> {
        let mut records = Vec::new();

        for item in self.db.scan_prefix(Self::rec_prefix(run_id)) {
            let (_key, value) = item.map_err(|e| StateStoreError::LoadRecords(e.to_string()))?;
            let record: ProgressRecord = bincode::deserialize(&value)
                .map_err(|e| StateStoreError::LoadRecords(e.to_string()))?;
            records.push(record);
        }

        Ok(records)
    }

    async fn append_wal(&self, entry: &WalEntry) -> Result<(), StateStoreError> {
        // generate_id is monotonic across restarts, unlike wall-clock nanos.
        let seq = self
            .db
            .generate_id()
            .map_err(|e| StateStoreError::AppendWal(e.to_string()))?;
        let key = format!("{}{:020}", Self::wal_prefix(entry.run_id()), seq);
        let value =
            bincode::serialize(entry).map_err(|e| StateStoreError::AppendWal(e.to_string()))?;

        self.db
            .insert(key, value)
            .map_err(|e| StateStoreError::AppendWal(e.to_string()))?;
        Ok(())
    }

    async fn iter_wal(&self, run_id: &str) -> Result<Vec<WalEntry>, StateStoreError> {
        let mut entries = Vec::new();

        for item in self.db.scan_prefix(Self::wal_prefix(run_id)) {
            let (_key, value) = item.map_err(|e| StateStoreError::IterateWal(e.to_string()))?;
            let entry: WalEntry = bincode::deserialize(&value)
                .map_err(|e| StateStoreError::IterateWal(e.to_string()))?;
            entries.push(entry);
        }

        Ok(entries)
    }

    async fn flush(&self) -> Result<(), StateStoreError> {
        self.db
            .flush_async()
            .await
            .map(|_| ())
            .map_err(|e| StateStoreError::Flush(e.to_string()))
    }
}
