//! Transcript store port (read side and deletion).
//!
//! Combines the logger with paginated, date-filtered retrieval and
//! whole-conversation deletion.
//!
//! # Design
//!
//! - **Stateless pagination**: continuation tokens carry the resume point and
//!   the query parameters; the store holds no session state
//! - **Sequence order**: results follow the store-assigned sequence key, never
//!   the client-supplied timestamp
//! - **No NotFound**: missing conversations read as empty and delete as no-ops

use async_trait::async_trait;

use super::{TranscriptLogger, TranscriptStoreError};
use crate::domain::foundation::{ChannelId, ConversationId};
use crate::domain::transcript::{ActivityQuery, ActivityRecord, PagedResult, TranscriptInfo};

/// Port for querying and deleting transcripts.
#[async_trait]
pub trait TranscriptStore: TranscriptLogger {
    /// Read one page of a conversation's activities in ascending sequence order.
    ///
    /// Activities with a timestamp after the cutoff are excluded. A
    /// conversation with no eligible activity yields an empty page without a
    /// continuation token.
    ///
    /// # Errors
    ///
    /// - `InvalidCursor` if the token was issued for another conversation or
    ///   cutoff, or was not issued by this store
    /// - `StorageUnavailable` if the backing medium cannot be reached
    async fn get_transcript_activities(
        &self,
        channel_id: &ChannelId,
        conversation_id: &ConversationId,
        query: &ActivityQuery,
    ) -> Result<PagedResult<ActivityRecord>, TranscriptStoreError>;

    /// List the conversations of a channel in creation order.
    ///
    /// # Errors
    ///
    /// - `InvalidCursor` if the token was issued for another channel or query
    /// - `StorageUnavailable` if the backing medium cannot be reached
    async fn list_transcripts(
        &self,
        channel_id: &ChannelId,
        continuation_token: Option<&str>,
    ) -> Result<PagedResult<TranscriptInfo>, TranscriptStoreError>;

    /// Irreversibly remove every activity of a conversation.
    ///
    /// Deleting a conversation that does not exist succeeds.
    ///
    /// # Errors
    ///
    /// - `StorageUnavailable` if the backing medium cannot be reached
    async fn delete_transcript(
        &self,
        channel_id: &ChannelId,
        conversation_id: &ConversationId,
    ) -> Result<(), TranscriptStoreError>;
}
