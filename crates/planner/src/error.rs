use model::core::timestamp::Timestamp;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanError {
    /// The global migration window is inverted.
    #[error("Invalid window: mint {mint} is greater than maxt {maxt}")]
    InvalidWindow { mint: Timestamp, maxt: Timestamp },

    /// A requested block is inverted.
    #[error("Invalid block range: mint {mint} is greater than maxt {maxt}")]
    InvalidRange { mint: Timestamp, maxt: Timestamp },

    /// A requested block is not fully contained in the migration window.
    #[error(
        "Block [{mint}, {maxt}] is outside the migration window [{window_mint}, {window_maxt}]"
    )]
    OutOfWindow {
        mint: Timestamp,
        maxt: Timestamp,
        window_mint: Timestamp,
        window_maxt: Timestamp,
    },

    #[error("Invalid block size: {0}")]
    InvalidBlockSize(String),
}
