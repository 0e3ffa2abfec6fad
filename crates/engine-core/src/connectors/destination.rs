use crate::{connectors::BlockContext, error::ExecutionError};
use async_trait::async_trait;
use model::records::batch::SampleBatch;
use planner::Block;

/// Persists one block's dataset into the destination engine.
///
/// A block may be written more than once when an attempt fails after the
/// write landed, so implementations should make a repeated write of the same
/// block harmless.
#[async_trait]
pub trait SampleWriter: Send + Sync {
    fn name(&self) -> &str;

    async fn store(
        &self,
        block: &Block,
        batch: SampleBatch,
        ctx: &BlockContext,
    ) -> Result<(), ExecutionError>;
}
