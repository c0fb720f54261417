//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to backing storage engines:
//! - `storage` - In-memory and file-based transcript stores
//! - `postgres` - PostgreSQL transcript store

pub mod postgres;
pub mod storage;

pub use postgres::PostgresTranscriptStore;
pub use storage::{FileTranscriptStore, InMemoryTranscriptStore};
