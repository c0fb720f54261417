//! File-based Transcript Store Adapter
//!
//! Stores each conversation as an append-only JSON-lines file on disk:
//!
//! ```text
//! <root>/<segment(channel_id)>/<segment(conversation_id)>.jsonl
//! <root>/.last_key
//! ```
//!
//! A segment is the base64url form of the id, or `~` followed by the
//! base64url SHA-256 digest when that form would exceed file name limits.
//! Records carry their own ids, so directory and file names are never
//! decoded.
//!
//! Every append is flushed to disk before it is acknowledged, so committed
//! activities survive a crash. A torn final line left by a crash is skipped
//! on read and sealed off before the next append. `.last_key` records the
//! highest issued key before any transcript is removed, so keys are never
//! handed out twice across restarts.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::domain::foundation::{ChannelId, ConversationId, SequenceKey, ValidationError};
use crate::domain::transcript::{
    cut_page, listing_continuation, resolve_listing_start, ActivityQuery, ActivityRecord,
    ActivityWindow, CursorCodec, NewActivity, PagedResult, TranscriptInfo, DEFAULT_PAGE_SIZE,
};
use crate::ports::{TranscriptLogger, TranscriptStore, TranscriptStoreError};

const TRANSCRIPT_EXTENSION: &str = "jsonl";
const HIGH_WATER_FILE: &str = ".last_key";
const HIGH_WATER_TEMP_FILE: &str = ".last_key.tmp";

/// Longest plain segment; keeps `<segment>.jsonl` well under NAME_MAX (255).
const MAX_PLAIN_SEGMENT: usize = 200;
const DIGEST_SEGMENT_PREFIX: char = '~';

type PartitionKey = (ChannelId, ConversationId);

/// Per-conversation append state, guarded by the partition lock.
#[derive(Debug, Default)]
struct PartitionState {
    /// The file tail has been checked for a torn line in this process.
    tail_checked: bool,
    /// Unlinked from the lock map by a delete; holders must fetch a fresh lock.
    retired: bool,
}

/// File-based transcript store.
#[derive(Debug, Clone)]
pub struct FileTranscriptStore {
    root: PathBuf,
    partitions: Arc<Mutex<HashMap<PartitionKey, Arc<Mutex<PartitionState>>>>>,
    last_key: Arc<AtomicU64>,
    high_water: Arc<Mutex<()>>,
    codec: CursorCodec,
    page_size: usize,
}

impl FileTranscriptStore {
    /// Open (or create) a store rooted at `root`.
    ///
    /// New sequence keys continue above every key already on disk and above
    /// the recorded high-water mark of deleted transcripts.
    ///
    /// # Example
    /// ```ignore
    /// let store = FileTranscriptStore::open("./data/transcripts").await?;
    /// ```
    pub async fn open<P: AsRef<Path>>(root: P) -> Result<Self, TranscriptStoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await.map_err(io_unavailable)?;

        let stored = highest_stored_key(&root).await?;
        let recorded = read_high_water(&root).await?;
        let last_key = stored.max(recorded);
        tracing::debug!(root = %root.display(), last_key, "Opened file transcript store");

        Ok(Self {
            root,
            partitions: Arc::new(Mutex::new(HashMap::new())),
            last_key: Arc::new(AtomicU64::new(last_key)),
            high_water: Arc::new(Mutex::new(())),
            codec: CursorCodec::random(),
            page_size: DEFAULT_PAGE_SIZE,
        })
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

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn channel_dir(&self, channel_id: &ChannelId) -> PathBuf {
        self.root.join(path_segment(channel_id.as_str()))
    }

    fn transcript_path(&self, channel_id: &ChannelId, conversation_id: &ConversationId) -> PathBuf {
        self.channel_dir(channel_id).join(format!(
            "{}.{}",
            path_segment(conversation_id.as_str()),
            TRANSCRIPT_EXTENSION
        ))
    }

    async fn partition_lock(
        &self,
        channel_id: &ChannelId,
        conversation_id: &ConversationId,
    ) -> Arc<Mutex<PartitionState>> {
        let mut partitions = self.partitions.lock().await;
        partitions
            .entry((channel_id.clone(), conversation_id.clone()))
            .or_default()
            .clone()
    }

    fn next_key(&self) -> SequenceKey {
        SequenceKey::new(self.last_key.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Durably record the highest key issued so far.
    async fn persist_high_water(&self) -> Result<(), TranscriptStoreError> {
        let _guard = self.high_water.lock().await;
        let value = self.last_key.load(Ordering::SeqCst);

        let temp = self.root.join(HIGH_WATER_TEMP_FILE);
        let mut file = fs::File::create(&temp).await.map_err(io_unavailable)?;
        file.write_all(value.to_string().as_bytes())
            .await
            .map_err(io_unavailable)?;
        file.sync_all().await.map_err(io_unavailable)?;
        drop(file);

        fs::rename(&temp, self.root.join(HIGH_WATER_FILE))
            .await
            .map_err(io_unavailable)?;
        sync_dir(&self.root).await
    }

    /// Ensure the file ends on a line boundary so a fragment left by a crash
    /// cannot merge with the next record.
    async fn seal_torn_tail(&self, path: &Path) -> Result<(), TranscriptStoreError> {
        let mut file = match OpenOptions::new().read(true).write(true).open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io_unavailable(e)),
        };

        let len = file.metadata().await.map_err(io_unavailable)?.len();
        if len == 0 {
            return Ok(());
        }

        file.seek(SeekFrom::Start(len - 1))
            .await
            .map_err(io_unavailable)?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last).await.map_err(io_unavailable)?;

        if last[0] != b'\n' {
            tracing::warn!(path = %path.display(), "Sealing torn transcript line");
            file.seek(SeekFrom::End(0)).await.map_err(io_unavailable)?;
            file.write_all(b"\n").await.map_err(io_unavailable)?;
            file.sync_data().await.map_err(io_unavailable)?;
        }
        Ok(())
    }

    async fn append_line(&self, path: &Path, line: &[u8]) -> Result<(), TranscriptStoreError> {
        let dir = path
            .parent()
            .ok_or_else(|| TranscriptStoreError::StorageUnavailable("invalid transcript path".into()))?;
        let created = !fs::try_exists(path).await.map_err(io_unavailable)?;
        if created {
            fs::create_dir_all(dir).await.map_err(io_unavailable)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(io_unavailable)?;
        let previous_len = file.metadata().await.map_err(io_unavailable)?.len();

        let written = async {
            file.write_all(line).await?;
            file.sync_data().await
        }
        .await;

        if let Err(e) = written {
            // Roll back a partial write so no fragment is left behind.
            if let Err(rollback) = file.set_len(previous_len).await {
                tracing::error!(path = %path.display(), error = %rollback, "Failed to roll back partial append");
            }
            return Err(io_unavailable(e));
        }

        if created {
            sync_dir(dir).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TranscriptLogger for FileTranscriptStore {
    async fn log_activity(
        &self,
        activity: NewActivity,
    ) -> Result<ActivityRecord, TranscriptStoreError> {
        let path = self.transcript_path(&activity.channel_id, &activity.conversation_id);

        loop {
            let lock = self
                .partition_lock(&activity.channel_id, &activity.conversation_id)
                .await;
            let mut state = lock.lock().await;
            if state.retired {
                continue;
            }

            if !state.tail_checked {
                self.seal_torn_tail(&path).await?;
                state.tail_checked = true;
            }

            let record = activity.into_record(self.next_key());
            let line = encode_line(&record)?;

            self.append_line(&path, &line).await.map_err(|e| {
                tracing::error!(
                    channel_id = %record.channel_id,
                    conversation_id = %record.conversation_id,
                    error = %e,
                    "Failed to append activity"
                );
                e
            })?;

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
impl TranscriptStore for FileTranscriptStore {
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

        let records = read_records(&self.transcript_path(channel_id, conversation_id)).await?;
        let candidates = records.into_iter().filter(|r| {
            r.channel_id == *channel_id
                && r.conversation_id == *conversation_id
                && r.sequence_key > window.after
                && r.is_within(&window.cutoff)
        });
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

        let mut entries = match fs::read_dir(self.channel_dir(channel_id)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(PagedResult::empty()),
            Err(e) => return Err(io_unavailable(e)),
        };

        let mut firsts: Vec<(SequenceKey, TranscriptInfo)> = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_unavailable)? {
            let path = entry.path();
            if !is_transcript_file(&path) {
                continue;
            }
            let Some(first) = read_first_record(&path).await? else {
                continue;
            };
            if first.channel_id != *channel_id || first.sequence_key <= after {
                continue;
            }
            let info = TranscriptInfo::new(
                first.channel_id,
                first.conversation_id,
                Some(first.timestamp),
            );
            firsts.push((first.sequence_key, info));
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
        let path = self.transcript_path(channel_id, conversation_id);

        loop {
            let lock = self.partition_lock(channel_id, conversation_id).await;
            let mut state = lock.lock().await;
            if state.retired {
                continue;
            }

            if fs::try_exists(&path).await.map_err(io_unavailable)? {
                // The file may hold the highest issued keys; record them first.
                self.persist_high_water().await?;
                match fs::remove_file(&path).await {
                    Ok(()) => {
                        tracing::debug!(%channel_id, %conversation_id, "Transcript deleted");
                    }
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(io_unavailable(e)),
                }
            }

            state.retired = true;
            self.partitions
                .lock()
                .await
                .remove(&(channel_id.clone(), conversation_id.clone()));

            return Ok(());
        }
    }
}

fn io_unavailable(e: std::io::Error) -> TranscriptStoreError {
    TranscriptStoreError::StorageUnavailable(e.to_string())
}

fn serialization_failed(e: serde_json::Error) -> TranscriptStoreError {
    tracing::error!(error = %e, "Failed to serialize activity record");
    TranscriptStoreError::Validation(ValidationError::invalid_format(
        "activity",
        format!("cannot be serialized: {}", e),
    ))
}

fn encode_line(record: &ActivityRecord) -> Result<Vec<u8>, TranscriptStoreError> {
    let mut line = serde_json::to_vec(record).map_err(serialization_failed)?;
    line.push(b'\n');
    Ok(line)
}

fn path_segment(id: &str) -> String {
    let plain = URL_SAFE_NO_PAD.encode(id.as_bytes());
    if plain.len() <= MAX_PLAIN_SEGMENT {
        return plain;
    }
    let digest = Sha256::digest(id.as_bytes());
    format!("{}{}", DIGEST_SEGMENT_PREFIX, URL_SAFE_NO_PAD.encode(digest))
}

fn is_transcript_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == TRANSCRIPT_EXTENSION)
}

async fn sync_dir(dir: &Path) -> Result<(), TranscriptStoreError> {
    let handle = fs::File::open(dir).await.map_err(io_unavailable)?;
    handle.sync_all().await.map_err(io_unavailable)
}

async fn read_high_water(root: &Path) -> Result<u64, TranscriptStoreError> {
    let contents = match fs::read_to_string(root.join(HIGH_WATER_FILE)).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(io_unavailable(e)),
    };
    contents.trim().parse::<u64>().map_err(|e| {
        TranscriptStoreError::StorageUnavailable(format!(
            "Corrupt key high-water mark {}: {}",
            root.join(HIGH_WATER_FILE).display(),
            e
        ))
    })
}

/// Parse every complete line of a transcript file.
///
/// A trailing fragment without a newline is an append in flight (or torn by
/// a crash) and is ignored. Unreadable complete lines are skipped with a
/// warning.
async fn read_records(path: &Path) -> Result<Vec<ActivityRecord>, TranscriptStoreError> {
    let contents = match fs::read(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_unavailable(e)),
    };

    let mut records = Vec::new();
    for line in contents.split_inclusive(|b| *b == b'\n') {
        let Some(line) = line.strip_suffix(b"\n") else {
            break;
        };
        if line.is_empty() {
            continue;
        }
        match serde_json::from_slice::<ActivityRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable transcript line");
            }
        }
    }
    Ok(records)
}

async fn read_first_record(path: &Path) -> Result<Option<ActivityRecord>, TranscriptStoreError> {
    let file = match fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_unavailable(e)),
    };

    let mut reader = BufReader::new(file);
    let mut line = Vec::new();
    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .await
            .map_err(io_unavailable)?;
        if read == 0 || line.last() != Some(&b'\n') {
            return Ok(None);
        }
        let trimmed = &line[..line.len() - 1];
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_slice::<ActivityRecord>(trimmed) {
            Ok(record) => return Ok(Some(record)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable transcript line");
            }
        }
    }
}

async fn highest_stored_key(root: &Path) -> Result<u64, TranscriptStoreError> {
    let mut highest = 0;
    let mut channels = fs::read_dir(root).await.map_err(io_unavailable)?;

    while let Some(channel) = channels.next_entry().await.map_err(io_unavailable)? {
        if !channel.file_type().await.map_err(io_unavailable)?.is_dir() {
            continue;
        }
        let mut transcripts = fs::read_dir(channel.path()).await.map_err(io_unavailable)?;
        while let Some(transcript) = transcripts.next_entry().await.map_err(io_unavailable)? {
            let path = transcript.path();
            if !is_transcript_file(&path) {
                continue;
            }
            if let Some(last) = read_records(&path).await?.last() {
                highest = highest.max(last.sequence_key.value());
            }
        }
    }
    Ok(highest)
}
