//! Errors surfaced by transcript store operations.

use crate::domain::foundation::ValidationError;
use crate::domain::transcript::CursorError;

/// Errors that can occur during transcript store operations.
///
/// A missing conversation is deliberately not an error: reads return an
/// empty page and deletes succeed as no-ops.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranscriptStoreError {
    /// Malformed identifiers. Nothing was persisted; retrying will not help.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Token reused with different parameters, or not recognised.
    /// Restart pagination from the beginning.
    #[error("Invalid continuation token: {0}")]
    InvalidCursor(String),

    /// Backing medium unreachable or timed out. Transient; the store does not
    /// retry internally.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl TranscriptStoreError {
    /// Whether the caller may retry the same call (with backoff).
    pub fn is_retryable(&self) -> bool {
        matches!(self, TranscriptStoreError::StorageUnavailable(_))
    }
}

impl From<CursorError> for TranscriptStoreError {
    fn from(err: CursorError) -> Self {
        TranscriptStoreError::InvalidCursor(err.to_string())
    }
}
