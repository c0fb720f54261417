//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, timestamps and validation errors that form the
//! vocabulary of the transcript store.

mod errors;
mod ids;
mod timestamp;

pub use errors::ValidationError;
pub use ids::{ChannelId, ConversationId, SequenceKey};
pub use timestamp::Timestamp;
