pub mod destination;
pub mod source;

use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Per-attempt context handed to the read and write adapters.
///
/// Adapters that page through large ranges should poll `cancel` between
/// pages and return [`crate::error::ExecutionError::Cancelled`] when it
/// fires. The deadline is advisory: the dispatcher enforces it regardless.
#[derive(Debug, Clone)]
pub struct BlockContext {
    pub run_id: String,
    pub attempt: u32,
    pub deadline: Option<Instant>,
    pub cancel: CancellationToken,
}

impl BlockContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
