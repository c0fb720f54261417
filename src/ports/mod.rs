//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the backing storage engines. Adapters implement these ports.
//!
//! - `TranscriptLogger` - Durable append of activities
//! - `TranscriptStore` - Logger plus paginated queries and deletion

mod store_error;
mod transcript_logger;
mod transcript_store;

pub use store_error::TranscriptStoreError;
pub use transcript_logger::TranscriptLogger;
pub use transcript_store::TranscriptStore;
