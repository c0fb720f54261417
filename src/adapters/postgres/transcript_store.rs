//! PostgreSQL implementation of TranscriptLogger and TranscriptStore.
//!
//! All activities live in one `transcript_activities` table. The table's
//! `BIGSERIAL` column is the sequence key; appends to one conversation are
//! serialized with a transaction-scoped advisory lock on the partition.

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

use crate::config::DatabaseConfig;
use crate::domain::foundation::{ChannelId, ConversationId, SequenceKey, Timestamp};
use crate::domain::transcript::{
    cut_page, listing_continuation, resolve_listing_start, ActivityPayload, ActivityQuery,
    ActivityRecord, ActivityWindow, CursorCodec, NewActivity, PagedResult, TranscriptInfo,
    DEFAULT_PAGE_SIZE,
};
use crate::ports::{TranscriptLogger, TranscriptStore, TranscriptStoreError};

/// PostgreSQL transcript store.
#[derive(Clone)]
pub struct PostgresTranscriptStore {
    pool: PgPool,
    codec: CursorCodec,
    page_size: usize,
}

impl PostgresTranscriptStore {
    /// Creates a store over an existing pool.
    pub fn new(pool: PgPool, codec: CursorCodec) -> Self {
        Self {
            pool,
            codec,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Use a different page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Connects a pool sized from configuration.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the database cannot be reached.
    pub async fn connect(
        config: &DatabaseConfig,
        codec: CursorCodec,
    ) -> Result<Self, TranscriptStoreError> {
        let pool = PgPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .idle_timeout(config.idle_timeout())
            .max_lifetime(config.max_lifetime())
            .connect(config.connection_url())
            .await
            .map_err(|e| database_error("Failed to connect", e))?;

        Ok(Self::new(pool, codec))
    }

    /// Applies the bundled schema migrations.
    pub async fn migrate(&self) -> Result<(), TranscriptStoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                TranscriptStoreError::StorageUnavailable(format!(
                    "Failed to run migrations: {}",
                    e
                ))
            })
    }

    /// Underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn fetch_limit(&self) -> i64 {
        i64::try_from(self.page_size.saturating_add(1)).unwrap_or(i64::MAX)
    }
}

#[async_trait]
impl TranscriptLogger for PostgresTranscriptStore {
    async fn log_activity(
        &self,
        activity: NewActivity,
    ) -> Result<ActivityRecord, TranscriptStoreError> {
        // Stored precision is microseconds; return what a later read will see.
        let timestamp = activity.timestamp.truncated_to_micros();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| database_error("Failed to start transaction", e))?;

        lock_partition(&mut tx, &activity.channel_id, &activity.conversation_id).await?;

        let row = sqlx::query(
            r#"
            INSERT INTO transcript_activities (channel_id, conversation_id, activity_ts, payload)
            VALUES ($1, $2, $3, $4)
            RETURNING sequence_key
            "#,
        )
        .bind(activity.channel_id.as_str())
        .bind(activity.conversation_id.as_str())
        .bind(timestamp.as_datetime())
        .bind(activity.payload.as_bytes())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| database_error("Failed to insert activity", e))?;

        let sequence_key = sequence_key_from_row(&row)?;

        tx.commit()
            .await
            .map_err(|e| database_error("Failed to commit activity", e))?;

        tracing::debug!(
            channel_id = %activity.channel_id,
            conversation_id = %activity.conversation_id,
            %sequence_key,
            "Activity logged"
        );

        Ok(ActivityRecord {
            channel_id: activity.channel_id,
            conversation_id: activity.conversation_id,
            sequence_key,
            timestamp,
            payload: activity.payload,
        })
    }
}

#[async_trait]
impl TranscriptStore for PostgresTranscriptStore {
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

        let rows = sqlx::query(
            r#"
            SELECT sequence_key, activity_ts, payload
            FROM transcript_activities
            WHERE channel_id = $1
              AND conversation_id = $2
              AND sequence_key > $3
              AND activity_ts <= $4
            ORDER BY sequence_key
            LIMIT $5
            "#,
        )
        .bind(channel_id.as_str())
        .bind(conversation_id.as_str())
        .bind(key_to_db(window.after))
        .bind(window.cutoff.as_datetime())
        .bind(self.fetch_limit())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| database_error("Failed to fetch activities", e))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let activity_ts: chrono::DateTime<chrono::Utc> = row
                .try_get("activity_ts")
                .map_err(|e| database_error("Failed to decode activity_ts", e))?;
            let payload: Vec<u8> = row
                .try_get("payload")
                .map_err(|e| database_error("Failed to decode payload", e))?;
            records.push(ActivityRecord {
                channel_id: channel_id.clone(),
                conversation_id: conversation_id.clone(),
                sequence_key: sequence_key_from_row(row)?,
                timestamp: Timestamp::from_datetime(activity_ts),
                payload: ActivityPayload::from_bytes(payload),
            });
        }

        let cut = cut_page(records, self.page_size, |r| r.sequence_key);
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

        let rows = sqlx::query(
            r#"
            SELECT conversation_id, sequence_key, activity_ts
            FROM (
                SELECT DISTINCT ON (conversation_id) conversation_id, sequence_key, activity_ts
                FROM transcript_activities
                WHERE channel_id = $1
                ORDER BY conversation_id, sequence_key
            ) firsts
            WHERE sequence_key > $2
            ORDER BY sequence_key
            LIMIT $3
            "#,
        )
        .bind(channel_id.as_str())
        .bind(key_to_db(after))
        .bind(self.fetch_limit())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| database_error("Failed to list transcripts", e))?;

        let mut firsts = Vec::with_capacity(rows.len());
        for row in &rows {
            let conversation_id: String = row
                .try_get("conversation_id")
                .map_err(|e| database_error("Failed to decode conversation_id", e))?;
            let conversation_id = ConversationId::new(conversation_id).map_err(|e| {
                TranscriptStoreError::StorageUnavailable(format!("Corrupt conversation row: {}", e))
            })?;
            let created: chrono::DateTime<chrono::Utc> = row
                .try_get("activity_ts")
                .map_err(|e| database_error("Failed to decode activity_ts", e))?;
            let info = TranscriptInfo::new(
                channel_id.clone(),
                conversation_id,
                Some(Timestamp::from_datetime(created)),
            );
            firsts.push((sequence_key_from_row(row)?, info));
        }

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
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| database_error("Failed to start transaction", e))?;

        lock_partition(&mut tx, channel_id, conversation_id).await?;

        let result = sqlx::query(
            "DELETE FROM transcript_activities WHERE channel_id = $1 AND conversation_id = $2",
        )
        .bind(channel_id.as_str())
        .bind(conversation_id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| database_error("Failed to delete transcript", e))?;

        tx.commit()
            .await
            .map_err(|e| database_error("Failed to commit delete", e))?;

        tracing::debug!(
            %channel_id,
            %conversation_id,
            removed = result.rows_affected(),
            "Transcript deleted"
        );
        Ok(())
    }
}

/// Serialize writers of one conversation until the transaction ends.
async fn lock_partition(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    channel_id: &ChannelId,
    conversation_id: &ConversationId,
) -> Result<(), TranscriptStoreError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1 || chr(31) || $2, 0))")
        .bind(channel_id.as_str())
        .bind(conversation_id.as_str())
        .execute(&mut **tx)
        .await
        .map_err(|e| database_error("Failed to lock transcript", e))?;
    Ok(())
}

fn sequence_key_from_row(row: &PgRow) -> Result<SequenceKey, TranscriptStoreError> {
    let raw: i64 = row
        .try_get("sequence_key")
        .map_err(|e| database_error("Failed to decode sequence_key", e))?;
    u64::try_from(raw).map(SequenceKey::new).map_err(|_| {
        TranscriptStoreError::StorageUnavailable(format!("Negative sequence key: {}", raw))
    })
}

fn key_to_db(key: SequenceKey) -> i64 {
    i64::try_from(key.value()).unwrap_or(i64::MAX)
}

fn database_error(context: &str, e: impl std::fmt::Display) -> TranscriptStoreError {
    TranscriptStoreError::StorageUnavailable(format!("{}: {}", context, e))
}
