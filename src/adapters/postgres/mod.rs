//! PostgreSQL adapters - Database implementations of the transcript ports.
//!
//! - `PostgresTranscriptStore` - Activities in one append-only table, keyed by
//!   a `BIGSERIAL` sequence

mod transcript_store;

pub use transcript_store::PostgresTranscriptStore;
