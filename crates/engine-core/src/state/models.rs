use chrono::{DateTime, Utc};
use planner::Block;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum BlockStatus {
    Pending,
    InFlight,
    Succeeded,
    Failed { reason: String },
    Retrying { reason: String },
}

impl BlockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockStatus::Pending => "Pending",
            BlockStatus::InFlight => "InFlight",
            BlockStatus::Succeeded => "Succeeded",
            BlockStatus::Failed { .. } => "Failed",
            BlockStatus::Retrying { .. } => "Retrying",
        }
    }

    /// Allowed moves:
    ///
    /// ```text
    /// Pending | Failed | Retrying | InFlight(stale) -> InFlight
    /// InFlight -> Succeeded | Retrying | Failed | Pending
    /// Retrying -> Failed | Pending
    /// Failed   -> Pending
    /// ```
    ///
    /// `Succeeded` is terminal.
    pub fn can_transition_to(&self, next: &BlockStatus) -> bool {
        use BlockStatus::*;

        match (self, next) {
            (Succeeded, _) => false,
            (_, InFlight) => true,
            (InFlight, Succeeded | Retrying { .. } | Failed { .. } | Pending) => true,
            (Retrying { .. }, Failed { .. } | Pending) => true,
            (Failed { .. }, Pending) => true,
            _ => false,
        }
    }
}

impl fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProgressRecord {
    pub run_id: String,
    pub block: Block,
    pub status: BlockStatus,
    /// Failed attempts so far, across every run that touched this block.
    pub attempts: u32,
    pub last_attempted_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    pub fn pending(run_id: &str, block: Block) -> Self {
        Self {
            run_id: run_id.to_string(),
            block,
            status: BlockStatus::Pending,
            attempts: 0,
            last_attempted_at: None,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum WalEntry {
    RunStart {
        run_id: String,
        plan_hash: String,
        mint: i64,
        maxt: i64,
        total_blocks: u64,
        at: DateTime<Utc>,
    },
    RunDone {
        run_id: String,
        outcome: String,
        succeeded: u64,
        failed: u64,
        skipped: u64,
        at: DateTime<Utc>,
    },
}

impl WalEntry {
    pub fn run_id(&self) -> &str {
        match self {
            WalEntry::RunStart { run_id, .. } => run_id,
            WalEntry::RunDone { run_id, .. } => run_id,
        }
    }
}
