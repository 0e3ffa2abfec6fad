use crate::state::models::BlockStatus;
use planner::Block;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateStoreError {
    #[error("Failed to save progress record: {0}")]
    SaveRecord(String),

    #[error("Failed to load progress records: {0}")]
    LoadRecords(String),

    #[error("Failed to append WAL entry: {0}")]
    AppendWal(String),

    #[error("Failed to iterate WAL entries: {0}")]
    IterateWal(String),

    #[error("Failed to flush state store: {0}")]
    Flush(String),
}

#[derive(Error, Debug)]
pub enum ProgressError {
    #[error("State store error: {0}")]
    Store(#[from] StateStoreError),

    #[error("Block {block} cannot move from {from} to {to}")]
    InvalidTransition {
        block: Block,
        from: BlockStatus,
        to: BlockStatus,
    },
}

/// Failure of one read-then-write attempt for a block.
///
/// The variant carries the retry classification: `Transient` and `Timeout`
/// are retried under the retry policy, `Permanent` is recorded and never
/// retried, `Cancelled` sends the block back to pending.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Permanent failure: {0}")]
    Permanent(String),

    #[error("Block timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Block execution cancelled")]
    Cancelled,
}

impl ExecutionError {
    pub fn transient(msg: impl Into<String>) -> Self {
        ExecutionError::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        ExecutionError::Permanent(msg.into())
    }
}
