//! Pagination shared by every backend.
//!
//! Backends supply candidates already positioned after the resume point and
//! ordered by sequence key; the functions here cut a bounded page and build
//! the token for the next one.

use serde::{Deserialize, Serialize};

use super::cursor::{CursorCodec, CursorError, CursorScope, PageCursor};
use crate::domain::foundation::{ChannelId, ConversationId, SequenceKey, Timestamp};

/// Page size used when none is configured.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// One page of an ordered result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    /// Present iff more results exist beyond this page.
    pub continuation_token: Option<String>,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, continuation_token: Option<String>) -> Self {
        Self {
            items,
            continuation_token,
        }
    }

    /// An empty final page.
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            continuation_token: None,
        }
    }

    /// Whether another page can be requested.
    pub fn has_more(&self) -> bool {
        self.continuation_token.is_some()
    }
}

/// Options for reading a conversation's activities.
///
/// Absent token starts at the earliest record. Absent cutoff means "now" on
/// the first page; on later pages it means "the cutoff the token was issued
/// with".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityQuery {
    pub continuation_token: Option<String>,
    pub cutoff: Option<Timestamp>,
}

impl ActivityQuery {
    /// Query from the start with the cutoff defaulted to now.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an inclusive upper bound on activity timestamps.
    pub fn with_cutoff(mut self, cutoff: Timestamp) -> Self {
        self.cutoff = Some(cutoff);
        self
    }

    /// Resume from a previously issued token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.continuation_token = Some(token.into());
        self
    }

    /// Next query after `page`, or `None` when the result set is exhausted.
    pub fn next_page<T>(&self, page: &PagedResult<T>) -> Option<Self> {
        page.continuation_token.as_ref().map(|token| Self {
            continuation_token: Some(token.clone()),
            cutoff: self.cutoff,
        })
    }
}

/// Resolved bounds of an activity query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityWindow {
    /// Records with keys at or below this were delivered on earlier pages.
    pub after: SequenceKey,
    /// Inclusive upper bound on record timestamps.
    pub cutoff: Timestamp,
}

impl ActivityWindow {
    /// Applies defaults and validates a continuation token against the query.
    ///
    /// # Errors
    ///
    /// Any `CursorError` from decoding, `ScopeMismatch` if the token belongs to
    /// another conversation or to a listing, `CutoffMismatch` if an explicit
    /// cutoff differs from the token's.
    pub fn resolve(
        codec: &CursorCodec,
        channel_id: &ChannelId,
        conversation_id: &ConversationId,
        query: &ActivityQuery,
    ) -> Result<Self, CursorError> {
        let token = match non_empty(query.continuation_token.as_deref()) {
            Some(token) => token,
            None => {
                return Ok(Self {
                    after: SequenceKey::ZERO,
                    cutoff: query.cutoff.unwrap_or_else(Timestamp::now),
                })
            }
        };

        let cursor = codec.decode(token)?;
        match cursor.scope {
            CursorScope::Activities {
                channel_id: ref issued_channel,
                conversation_id: ref issued_conversation,
                cutoff,
            } if issued_channel == channel_id && issued_conversation == conversation_id => {
                if matches!(query.cutoff, Some(requested) if requested != cutoff) {
                    return Err(CursorError::CutoffMismatch);
                }
                Ok(Self {
                    after: cursor.after,
                    cutoff,
                })
            }
            _ => Err(CursorError::ScopeMismatch),
        }
    }

    /// Issues the token that resumes after `last`.
    pub fn continuation(
        &self,
        codec: &CursorCodec,
        channel_id: &ChannelId,
        conversation_id: &ConversationId,
        last: SequenceKey,
    ) -> Result<String, CursorError> {
        let scope = CursorScope::Activities {
            channel_id: channel_id.clone(),
            conversation_id: conversation_id.clone(),
            cutoff: self.cutoff,
        };
        codec.encode(&PageCursor::new(scope, last))
    }
}

/// Resolves the resume point of a transcript listing.
pub fn resolve_listing_start(
    codec: &CursorCodec,
    channel_id: &ChannelId,
    continuation_token: Option<&str>,
) -> Result<SequenceKey, CursorError> {
    let token = match non_empty(continuation_token) {
        Some(token) => token,
        None => return Ok(SequenceKey::ZERO),
    };

    let cursor = codec.decode(token)?;
    match cursor.scope {
        CursorScope::Transcripts {
            channel_id: ref issued_channel,
        } if issued_channel == channel_id => Ok(cursor.after),
        _ => Err(CursorError::ScopeMismatch),
    }
}

/// Issues the token that resumes a listing after the transcript whose first
/// record carries `last`.
pub fn listing_continuation(
    codec: &CursorCodec,
    channel_id: &ChannelId,
    last: SequenceKey,
) -> Result<String, CursorError> {
    let scope = CursorScope::Transcripts {
        channel_id: channel_id.clone(),
    };
    codec.encode(&PageCursor::new(scope, last))
}

/// A bounded page cut from an ordered candidate stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCut<T> {
    pub items: Vec<T>,
    /// Key of the last item when more candidates remain.
    pub resume_after: Option<SequenceKey>,
}

/// Takes up to `page_size` candidates, peeking one further to learn whether
/// another page exists.
pub fn cut_page<T, I, F>(candidates: I, page_size: usize, key_of: F) -> PageCut<T>
where
    I: IntoIterator<Item = T>,
    F: Fn(&T) -> SequenceKey,
{
    let page_size = page_size.max(1);
    let mut items: Vec<T> = candidates.into_iter().take(page_size + 1).collect();

    if items.len() > page_size {
        items.truncate(page_size);
        let resume_after = items.last().map(&key_of);
        PageCut {
            items,
            resume_after,
        }
    } else {
        PageCut {
            items,
            resume_after: None,
        }
    }
}

fn non_empty(token: Option<&str>) -> Option<&str> {
    token.filter(|t| !t.trim().is_empty())
}
