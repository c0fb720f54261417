//! Application layer - Services composed over the transcript ports.
//!
//! - `buffered_logger` - Queued, fire-and-forget logging with failure reporting
//! - `store_factory` - Opens the backend chosen by configuration

mod buffered_logger;
mod store_factory;

pub use buffered_logger::{
    BufferedLogError, BufferedLoggerConfig, BufferedTranscriptLogger, FailedActivity,
};
pub use store_factory::{open_store, StoreSetupError};
