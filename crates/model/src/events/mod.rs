use crate::core::timestamp::Timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events emitted over the lifetime of a migration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MigrationEvent {
    // === Run lifecycle ===
    RunStarted {
        run_id: String,
        mint: Timestamp,
        maxt: Timestamp,
        total_blocks: u64,
        timestamp: DateTime<Utc>,
    },

    RunFinished {
        run_id: String,
        outcome: String,
        succeeded: u64,
        failed: u64,
        skipped: u64,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    // === Block lifecycle ===
    BlockStarted {
        run_id: String,
        mint: Timestamp,
        maxt: Timestamp,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },

    BlockSucceeded {
        run_id: String,
        mint: Timestamp,
        maxt: Timestamp,
        samples: u64,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    BlockRetrying {
        run_id: String,
        mint: Timestamp,
        maxt: Timestamp,
        attempt: u32,
        delay_ms: u64,
        error: String,
        timestamp: DateTime<Utc>,
    },

    BlockFailed {
        run_id: String,
        mint: Timestamp,
        maxt: Timestamp,
        attempts: u32,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl MigrationEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            MigrationEvent::RunStarted { .. } => "run.started",
            MigrationEvent::RunFinished { .. } => "run.finished",
            MigrationEvent::BlockStarted { .. } => "block.started",
            MigrationEvent::BlockSucceeded { .. } => "block.succeeded",
            MigrationEvent::BlockRetrying { .. } => "block.retrying",
            MigrationEvent::BlockFailed { .. } => "block.failed",
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            MigrationEvent::RunStarted { run_id, .. }
            | MigrationEvent::RunFinished { run_id, .. }
            | MigrationEvent::BlockStarted { run_id, .. }
            | MigrationEvent::BlockSucceeded { run_id, .. }
            | MigrationEvent::BlockRetrying { run_id, .. }
            | MigrationEvent::BlockFailed { run_id, .. } => run_id,
        }
    }
}
