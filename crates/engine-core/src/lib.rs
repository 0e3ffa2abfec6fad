pub mod connectors;
pub mod error;
pub mod event_bus;
pub mod metrics;
pub mod progress;
pub mod retry;
pub mod state;
