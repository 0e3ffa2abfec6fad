pub mod block;
pub mod error;
pub mod plan;
pub mod window;

pub use block::Block;
pub use error::PlanError;
pub use plan::{BlockSize, Blocks, Plan};
pub use window::Window;
