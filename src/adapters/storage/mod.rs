//! Storage Adapters
//!
//! Implementations of the transcript ports for process-local backends.
//!
//! ## Available Adapters
//!
//! - **FileTranscriptStore** - Append-only JSON-lines files on disk
//! - **InMemoryTranscriptStore** - Process memory (testing/development)
//!
//! ## Usage
//!
//! ```ignore
//! use adapters::storage::{FileTranscriptStore, InMemoryTranscriptStore};
//!
//! // Production: file-based storage
//! let store = FileTranscriptStore::open("./data/transcripts").await?;
//!
//! // Testing: in-memory storage
//! let store = InMemoryTranscriptStore::new();
//! ```

mod file_transcript_store;
mod in_memory_transcript_store;

pub use file_transcript_store::FileTranscriptStore;
pub use in_memory_transcript_store::InMemoryTranscriptStore;
