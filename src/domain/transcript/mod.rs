//! Transcript module - activities, transcripts and pagination.
//!
//! A transcript is the ordered activity history of one conversation,
//! partitioned by `(ChannelId, ConversationId)`.

mod activity;
mod cursor;
mod paging;
mod transcript_info;

pub use activity::{ActivityPayload, ActivityRecord, NewActivity};
pub use cursor::{CursorCodec, CursorError, CursorScope, PageCursor};
pub use paging::{
    cut_page, listing_continuation, resolve_listing_start, ActivityQuery, ActivityWindow, PageCut,
    PagedResult, DEFAULT_PAGE_SIZE,
};
pub use transcript_info::TranscriptInfo;
