//! Transcript logger port (write side).
//!
//! Accepts activities for durable append. Callers need not order their
//! appends; the store assigns the ordering key.

use async_trait::async_trait;

use super::TranscriptStoreError;
use crate::domain::transcript::{ActivityRecord, NewActivity};

/// Port for appending activities to a transcript.
///
/// Implementations must ensure:
/// - Appends to one conversation are serialized, so sequence keys are unique
///   and follow a single total order
/// - Appends to different conversations do not block one another
/// - Success is reported only once the record is durable on the backing medium
#[async_trait]
pub trait TranscriptLogger: Send + Sync {
    /// Append an activity and return it with its assigned sequence key.
    ///
    /// A retry after a failure creates a new, distinct record; deduplication
    /// is left to the caller.
    ///
    /// # Errors
    ///
    /// - `Validation` if the activity identity is malformed
    /// - `StorageUnavailable` if the backing medium cannot be reached
    async fn log_activity(&self, activity: NewActivity)
        -> Result<ActivityRecord, TranscriptStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_logger_is_object_safe() {
        fn _accepts_dyn(_logger: &dyn TranscriptLogger) {}
    }
}
