use crate::{connectors::BlockContext, error::ExecutionError};
use async_trait::async_trait;
use model::records::batch::SampleBatch;
use planner::Block;

/// Reads every sample of a block's time range from the source system.
#[async_trait]
pub trait SampleReader: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, block: &Block, ctx: &BlockContext)
    -> Result<SampleBatch, ExecutionError>;
}
