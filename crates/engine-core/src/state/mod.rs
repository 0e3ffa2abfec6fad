use crate::{
    error::StateStoreError,
    state::models::{ProgressRecord, WalEntry},
};
use async_trait::async_trait;

pub mod memory;
pub mod models;
pub mod sled_store;

/// Durable (or in-memory) home of per-block progress records and the run
/// journal.
///
/// `save_record` must never replace a `Succeeded` record with any other
/// status, so a late write from an interrupted attempt cannot resurrect a
/// finished block.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save_record(&self, record: &ProgressRecord) -> Result<(), StateStoreError>;

    /// All records of a run, ordered by block start time.
    async fn load_records(&self, run_id: &str) -> Result<Vec<ProgressRecord>, StateStoreError>;

    async fn append_wal(&self, entry: &WalEntry) -> Result<(), StateStoreError>;

    async fn iter_wal(&self, run_id: &str) -> Result<Vec<WalEntry>, StateStoreError>;

    async fn flush(&self) -> Result<(), StateStoreError> {
        Ok(())
    }
}
