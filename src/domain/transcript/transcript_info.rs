//! Derived description of one conversation.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ChannelId, ConversationId, Timestamp};

/// A conversation as a queryable unit, distinct from its activities.
///
/// Never persisted on its own: it exists only while the conversation holds
/// at least one activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptInfo {
    pub channel_id: ChannelId,
    pub conversation_id: ConversationId,
    /// Timestamp of the first logged activity.
    pub created: Option<Timestamp>,
}

impl TranscriptInfo {
    pub fn new(
        channel_id: ChannelId,
        conversation_id: ConversationId,
        created: Option<Timestamp>,
    ) -> Self {
        Self {
            channel_id,
            conversation_id,
            created,
        }
    }
}
