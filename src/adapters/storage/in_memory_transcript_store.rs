//! In-Memory Transcript Store Adapter
//!
//! Keeps transcripts in process memory. Useful for testing, development and
//! hosts that do not need transcripts to survive a restart.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::{ChannelId, ConversationId, SequenceKey};
use crate::domain::transcript::{
    cut_page, listing_continuation, resolve_listing_start, ActivityQuery, ActivityRecord,
    ActivityWindow, CursorCodec, NewActivity, PagedResult, TranscriptInfo, DEFAULT_PAGE_SIZE,
};
use crate::ports::{TranscriptLogger, TranscriptStore, TranscriptStoreError};

type SharedPartition = Arc<RwLock<Partition>>;

/// Append-only activity list of one conversation.
#[derive(Debug, Default)]
struct Partition {
    records: Vec<ActivityRecord>,
    /// Set once the partition has been unlinked by a delete. Appenders that
    /// raced the delete must retry against a fresh partition.
    deleted: bool,
}

impl Partition {
    fn first(&self) -> Option<&ActivityRecord> {
        self.records.first()
    }
}

/// In-memory transcript store.
///
/// Each conversation sits behind its own lock, so appends to different
/// conversations never wait on each other. Sequence keys come from one
/// store-wide counter.
#[derive(Debug, Clone)]
pub struct InMemoryTranscriptStore {
    channels: Arc<RwLock<HashMap<ChannelId, HashMap<ConversationId, SharedPartition>>>>,
    last_key: Arc<AtomicU64>,
    codec: CursorCodec,
    page_size: usize,
}

impl InMemoryTranscriptStore {
    /// Create an empty store with the default page size and a random
    /// cursor signing key.
    pub fn new() -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            last_key: Arc::new(AtomicU64::new(0)),
            codec: CursorCodec::random(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Use a different page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Use a specific cursor codec.
    pub fn with_codec(mut self, codec: CursorCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Clear all stored data (useful for tests)
    pub async fn clear(&self) {
        let mut channels = self.channels.write().await;
        for partition in channels.values().flat_map(|c| c.values()) {
            let mut partition = partition.write().await;
            partition.deleted = true;
            partition.records.clear();
        }
        channels.clear();
    }

    /// Get the number of stored activities across all conversations
    pub async fn activity_count(&self) -> usize {
        let partitions: Vec<SharedPartition> = {
            let channels = self.channels.read().await;
            channels.values().flat_map(|c| c.values().cloned()).collect()
        };

        let mut count = 0;
        for partition in partitions {
            count += partition.read().await.records.len();
        }
        count
    }

    async fn partition(
        &self,
        channel_id: &ChannelId,
        conversation_id: &ConversationId,
    ) -> Option<SharedPartition> {
        let channels = self.channels.read().await;
        channels
            .get(channel_id)
            .and_then(|c| c.get(conversation_id))
            .cloned()
    }

    async fn partition_or_create(
        &self,
        channel_id: &ChannelId,
        conversation_id: &ConversationId,
    ) -> SharedPartition {
        if let Some(partition) = self.partition(channel_id, conversation_id).await {
            return partition;
        }

        let mut channels = self.channels.write().await;
        channels
            .entry(channel_id.clone())
            .or_default()
            .entry(conversation_id.clone())
            .or_default()
            .clone()
    }

    fn next_key(&self) -> SequenceKey {
        SequenceKey::new(self.last_key.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

impl Default for InMemoryTranscriptStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranscriptLogger for InMemoryTranscriptStore {
    async fn log_activity(
        &self,
        activity: NewActivity,
    ) -> Result<ActivityRecord, TranscriptStoreError> {
        loop {
            let partition = self
                .partition_or_create(&activity.channel_id, &activity.conversation_id)
                .await;
            let mut partition = partition.write().await;
            if partition.deleted {
                continue;
            }

            // Drawn under the partition lock so keys follow append order.
            let record = activity.into_record(self.next_key());
            partition.records.push(record.clone());

            tracing::debug!(
                channel_id = %record.channel_id,
                conversation_id = %record.conversation_id,
                sequence_key = %record.sequence_key,
                "Activity logged"
            );
            return Ok(record);
        }
    }
}

#[async_trait]
impl TranscriptStore for InMemoryTranscriptStore {
    async fn get_transcript_activities(
        &self,
        channel_id: &ChannelId,
        conversation_id: &ConversationId,
        query: &ActivityQuery,
    ) -> Result<PagedResult<ActivityRecord>, TranscriptStoreError> {
        let window = ActivityWindow::resolve(&self.codec, channel_id, conversation_id, query)
            .map_err(|e| {
                tracing::warn!(%channel_id, %conversation_id, error = %e, "Rejected continuation token");
                e
            })?;

        let Some(partition) = self.partition(channel_id, conversation_id).await else {
            return Ok(PagedResult::empty());
        };
        let partition = partition.read().await;

        let start = partition
            .records
            .partition_point(|r| r.sequence_key <= window.after);
        let candidates = partition.records[start..]
            .iter()
            .filter(|r| r.is_within(&window.cutoff))
            .cloned();
        let cut = cut_page(candidates, self.page_size, |r| r.sequence_key);

        let token = match cut.resume_after {
            Some(last) => Some(window.continuation(&self.codec, channel_id, conversation_id, last)?),
            None => None,
        };
        Ok(PagedResult::new(cut.items, token))
    }

    async fn list_transcripts(
        &self,
        channel_id: &ChannelId,
        continuation_token: Option<&str>,
    ) -> Result<PagedResult<TranscriptInfo>, TranscriptStoreError> {
        let after = resolve_listing_start(&self.codec, channel_id, continuation_token)?;

        let partitions: Vec<SharedPartition> = {
            let channels = self.channels.read().await;
            match channels.get(channel_id) {
                Some(conversations) => conversations.values().cloned().collect(),
                None => return Ok(PagedResult::empty()),
            }
        };

        let mut firsts: Vec<(SequenceKey, TranscriptInfo)> = Vec::new();
        for partition in partitions {
            let partition = partition.read().await;
            if let Some(first) = partition.first() {
                if first.sequence_key > after {
                    let info = TranscriptInfo::new(
                        first.channel_id.clone(),
                        first.conversation_id.clone(),
                        Some(first.timestamp),
                    );
                    firsts.push((first.sequence_key, info));
                }
            }
        }
        firsts.sort_by_key(|(key, _)| *key);

        let cut = cut_page(firsts, self.page_size, |(key, _)| *key);
        let token = match cut.resume_after {
            Some(last) => Some(listing_continuation(&self.codec, channel_id, last)?),
            None => None,
        };
        let items = cut.items.into_iter().map(|(_, info)| info).collect();
        Ok(PagedResult::new(items, token))
    }

    async fn delete_transcript(
        &self,
        channel_id: &ChannelId,
        conversation_id: &ConversationId,
    ) -> Result<(), TranscriptStoreError> {
        let removed = {
            let mut channels = self.channels.write().await;
            let removed = channels
                .get_mut(channel_id)
                .and_then(|c| c.remove(conversation_id));
            if channels.get(channel_id).is_some_and(|c| c.is_empty()) {
                channels.remove(channel_id);
            }
            removed
        };

        if let Some(partition) = removed {
            let mut partition = partition.write().await;
            partition.deleted = true;
            partition.records.clear();
            tracing::debug!(%channel_id, %conversation_id, "Transcript deleted");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Timestamp;
    use crate::domain::transcript::ActivityPayload;

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_unix_secs(secs).unwrap()
    }

    fn channel(id: &str) -> ChannelId {
        ChannelId::new(id).unwrap()
    }

    fn conversation(id: &str) -> ConversationId {
        ConversationId::new(id).unwrap()
    }

    fn activity(channel_id: &str, conversation_id: &str, secs: i64, text: &str) -> NewActivity {
        NewActivity::from_parts(
            channel_id,
            conversation_id,
            ts(secs),
            ActivityPayload::from_bytes(text.as_bytes().to_vec()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_memory_store_assigns_increasing_keys() {
        let store = InMemoryTranscriptStore::new();

        let first = store.log_activity(activity("c1", "v1", 1, "a")).await.unwrap();
        let second = store.log_activity(activity("c1", "v1", 1, "b")).await.unwrap();

        assert!(second.sequence_key > first.sequence_key);
    }

    #[tokio::test]
    async fn test_memory_store_reads_in_sequence_order_not_timestamp_order() {
        let store = InMemoryTranscriptStore::new();
        store.log_activity(activity("c1", "v1", 30, "late")).await.unwrap();
        store.log_activity(activity("c1", "v1", 10, "early")).await.unwrap();

        let page = store
            .get_transcript_activities(&channel("c1"), &conversation("v1"), &ActivityQuery::new())
            .await
            .unwrap();

        let texts: Vec<&[u8]> = page.items.iter().map(|r| r.payload.as_bytes()).collect();
        assert_eq!(texts, vec![b"late".as_slice(), b"early".as_slice()]);
    }

    #[tokio::test]
    async fn test_memory_store_pages_with_token() {
        let store = InMemoryTranscriptStore::new().with_page_size(2);
        for i in 0..5 {
            store
                .log_activity(activity("c1", "v1", i, &i.to_string()))
                .await
                .unwrap();
        }

        let query = ActivityQuery::new().with_cutoff(ts(100));
        let first = store
            .get_transcript_activities(&channel("c1"), &conversation("v1"), &query)
            .await
            .unwrap();
        assert_eq!(first.items.len(), 2);
        assert!(first.has_more());

        let next = query.next_page(&first).unwrap();
        let second = store
            .get_transcript_activities(&channel("c1"), &conversation("v1"), &next)
            .await
            .unwrap();
        assert_eq!(second.items.len(), 2);
        assert!(second.items[0].sequence_key > first.items[1].sequence_key);

        let next = query.next_page(&second).unwrap();
        let third = store
            .get_transcript_activities(&channel("c1"), &conversation("v1"), &next)
            .await
            .unwrap();
        assert_eq!(third.items.len(), 1);
        assert!(!third.has_more());
    }

    #[tokio::test]
    async fn test_memory_store_unknown_conversation_is_empty() {
        let store = InMemoryTranscriptStore::new();

        let page = store
            .get_transcript_activities(&channel("c1"), &conversation("nope"), &ActivityQuery::new())
            .await
            .unwrap();

        assert!(page.items.is_empty());
        assert!(page.continuation_token.is_none());
    }

    #[tokio::test]
    async fn test_memory_store_rejects_foreign_token() {
        let store = InMemoryTranscriptStore::new().with_page_size(1);
        let other = InMemoryTranscriptStore::new().with_page_size(1);
        for i in 0..2 {
            other.log_activity(activity("c1", "v1", i, "x")).await.unwrap();
        }
        let page = other
            .get_transcript_activities(&channel("c1"), &conversation("v1"), &ActivityQuery::new())
            .await
            .unwrap();
        let token = page.continuation_token.unwrap();

        let result = store
            .get_transcript_activities(
                &channel("c1"),
                &conversation("v1"),
                &ActivityQuery::new().with_token(token),
            )
            .await;

        assert!(matches!(result, Err(TranscriptStoreError::InvalidCursor(_))));
    }

    #[tokio::test]
    async fn test_memory_store_lists_in_creation_order() {
        let store = InMemoryTranscriptStore::new();
        store.log_activity(activity("c1", "b", 5, "x")).await.unwrap();
        store.log_activity(activity("c1", "a", 1, "x")).await.unwrap();
        store.log_activity(activity("c1", "b", 6, "x")).await.unwrap();
        store.log_activity(activity("c2", "z", 1, "x")).await.unwrap();

        let page = store.list_transcripts(&channel("c1"), None).await.unwrap();

        let ids: Vec<&str> = page.items.iter().map(|t| t.conversation_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(page.items[0].created, Some(ts(5)));
        assert!(page.continuation_token.is_none());
    }

    #[tokio::test]
    async fn test_memory_store_delete_removes_listing_and_activities() {
        let store = InMemoryTranscriptStore::new();
        store.log_activity(activity("c1", "v1", 1, "x")).await.unwrap();
        store.log_activity(activity("c1", "v2", 1, "x")).await.unwrap();

        store
            .delete_transcript(&channel("c1"), &conversation("v1"))
            .await
            .unwrap();

        let listing = store.list_transcripts(&channel("c1"), None).await.unwrap();
        assert_eq!(listing.items.len(), 1);
        assert_eq!(listing.items[0].conversation_id.as_str(), "v2");
        assert_eq!(store.activity_count().await, 1);
    }

    #[tokio::test]
    async fn test_memory_store_delete_is_idempotent() {
        let store = InMemoryTranscriptStore::new();

        assert!(store
            .delete_transcript(&channel("c1"), &conversation("missing"))
            .await
            .is_ok());
        assert!(store
            .delete_transcript(&channel("c1"), &conversation("missing"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_memory_store_keys_not_reused_after_recreate() {
        let store = InMemoryTranscriptStore::new();
        let before = store.log_activity(activity("c1", "v1", 1, "x")).await.unwrap();
        store
            .delete_transcript(&channel("c1"), &conversation("v1"))
            .await
            .unwrap();

        let after = store.log_activity(activity("c1", "v1", 1, "x")).await.unwrap();
        assert!(after.sequence_key > before.sequence_key);
    }

    #[tokio::test]
    async fn test_memory_store_clear() {
        let store = InMemoryTranscriptStore::new();
        store.log_activity(activity("c1", "v1", 1, "x")).await.unwrap();
        store.log_activity(activity("c2", "v1", 1, "x")).await.unwrap();
        assert_eq!(store.activity_count().await, 2);

        store.clear().await;

        assert_eq!(store.activity_count().await, 0);
        assert!(store
            .list_transcripts(&channel("c1"), None)
            .await
            .unwrap()
            .items
            .is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_concurrent_appends_get_unique_keys() {
        let store = InMemoryTranscriptStore::new().with_page_size(1000);

        let mut handles = Vec::new();
        for i in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .log_activity(activity("c1", "v1", i, "x"))
                    .await
                    .unwrap()
                    .sequence_key
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let page = store
            .get_transcript_activities(&channel("c1"), &conversation("v1"), &ActivityQuery::new())
            .await
            .unwrap();
        assert_eq!(page.items.len(), 50);
        assert!(page
            .items
            .windows(2)
            .all(|w| w[0].sequence_key < w[1].sequence_key));
    }
}
