//! BufferedTranscriptLogger - Fire-and-forget front end for a transcript logger.
//!
//! Hosts on a hot path (a bot turn handler, say) enqueue activities and move
//! on; a background task appends them to the wrapped logger in FIFO order.
//!
//! ## Failure Reporting
//!
//! A failed append is never dropped silently. It is logged with
//! `tracing::error!` and retained until the next [`flush`] or [`shutdown`],
//! which hand the failures back to the caller.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `capacity` | 1024 | Queued activities before `log` waits |
//!
//! [`flush`]: BufferedTranscriptLogger::flush
//! [`shutdown`]: BufferedTranscriptLogger::shutdown

use std::mem;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::domain::transcript::NewActivity;
use crate::ports::{TranscriptLogger, TranscriptStoreError};

/// An activity the wrapped logger refused, with the reason.
#[derive(Debug, Clone)]
pub struct FailedActivity {
    pub activity: NewActivity,
    pub error: TranscriptStoreError,
}

/// Errors reported by the buffered logger.
#[derive(Debug, Error)]
pub enum BufferedLogError {
    #[error("{} buffered activities failed to log", .0.len())]
    Failed(Vec<FailedActivity>),

    #[error("buffered logger is closed")]
    Closed,
}

/// Configuration for the BufferedTranscriptLogger.
#[derive(Debug, Clone)]
pub struct BufferedLoggerConfig {
    /// Maximum queued activities; `log` waits when the queue is full.
    pub capacity: usize,
}

impl Default for BufferedLoggerConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

impl BufferedLoggerConfig {
    /// Create config with a custom queue capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }
}

enum Command {
    Log(NewActivity),
    Flush(oneshot::Sender<Vec<FailedActivity>>),
    Shutdown(oneshot::Sender<Vec<FailedActivity>>),
}

/// Queue plus background writer over any [`TranscriptLogger`].
///
/// Must be created inside a tokio runtime.
pub struct BufferedTranscriptLogger {
    sender: mpsc::Sender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BufferedTranscriptLogger {
    /// Wrap `logger` with the default configuration.
    pub fn new(logger: Arc<dyn TranscriptLogger>) -> Self {
        Self::with_config(logger, BufferedLoggerConfig::default())
    }

    /// Wrap `logger` with a custom configuration.
    pub fn with_config(logger: Arc<dyn TranscriptLogger>, config: BufferedLoggerConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.capacity.max(1));
        let worker = tokio::spawn(run_worker(logger, receiver));

        Self {
            sender,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Enqueue an activity for background append.
    ///
    /// Returns as soon as the activity is queued. Waits only while the queue
    /// is at capacity.
    ///
    /// # Errors
    ///
    /// Returns `Closed` after [`shutdown`](Self::shutdown).
    pub async fn log(&self, activity: NewActivity) -> Result<(), BufferedLogError> {
        self.sender
            .send(Command::Log(activity))
            .await
            .map_err(|_| BufferedLogError::Closed)
    }

    /// Wait until every activity queued before this call has been attempted.
    ///
    /// # Errors
    ///
    /// - `Failed` with the activities that failed since the previous flush
    /// - `Closed` after shutdown
    pub async fn flush(&self) -> Result<(), BufferedLogError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(Command::Flush(reply))
            .await
            .map_err(|_| BufferedLogError::Closed)?;
        let failures = response.await.map_err(|_| BufferedLogError::Closed)?;
        into_result(failures)
    }

    /// Drain the queue and stop the background writer.
    ///
    /// Later calls to `log` or `flush` fail with `Closed`.
    ///
    /// # Errors
    ///
    /// - `Failed` with the activities that failed since the previous flush
    /// - `Closed` if the logger was already shut down
    pub async fn shutdown(&self) -> Result<(), BufferedLogError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(Command::Shutdown(reply))
            .await
            .map_err(|_| BufferedLogError::Closed)?;
        let failures = response.await.map_err(|_| BufferedLogError::Closed)?;

        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Buffered logger worker terminated abnormally");
            }
        }

        into_result(failures)
    }
}

fn into_result(failures: Vec<FailedActivity>) -> Result<(), BufferedLogError> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(BufferedLogError::Failed(failures))
    }
}

async fn run_worker(logger: Arc<dyn TranscriptLogger>, mut receiver: mpsc::Receiver<Command>) {
    let mut failures = Vec::new();
    let mut shutdown_reply = None;

    while let Some(command) = receiver.recv().await {
        match command {
            Command::Log(activity) => {
                if let Err(error) = logger.log_activity(activity.clone()).await {
                    tracing::error!(
                        channel_id = %activity.channel_id,
                        conversation_id = %activity.conversation_id,
                        error = %error,
                        "Buffered activity failed to log"
                    );
                    failures.push(FailedActivity { activity, error });
                }
            }
            Command::Flush(reply) => {
                let _ = reply.send(mem::take(&mut failures));
            }
            Command::Shutdown(reply) => {
                if shutdown_reply.is_some() {
                    // Already shutting down; the dropped reply reads as Closed.
                    drop(reply);
                } else {
                    // Refuse new work but finish what is already queued.
                    receiver.close();
                    shutdown_reply = Some(reply);
                }
            }
        }
    }

    match shutdown_reply {
        Some(reply) => {
            let _ = reply.send(failures);
        }
        None if !failures.is_empty() => {
            tracing::error!(
                count = failures.len(),
                "Buffered logger dropped with unreported failures"
            );
        }
        None => {}
    }
    tracing::debug!("Buffered logger stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::InMemoryTranscriptStore;
    use crate::domain::foundation::Timestamp;
    use crate::domain::transcript::{ActivityPayload, ActivityRecord};
    use crate::ports::TranscriptStore;
    use async_trait::async_trait;

    fn activity(conversation_id: &str, text: &str) -> NewActivity {
        NewActivity::from_parts(
            "c1",
            conversation_id,
            Timestamp::from_unix_secs(1).unwrap(),
            ActivityPayload::from_bytes(text.as_bytes().to_vec()),
        )
        .unwrap()
    }

    /// Refuses every activity whose payload is `fail`.
    struct PickyLogger {
        inner: InMemoryTranscriptStore,
    }

    #[async_trait]
    impl TranscriptLogger for PickyLogger {
        async fn log_activity(
            &self,
            activity: NewActivity,
        ) -> Result<ActivityRecord, TranscriptStoreError> {
            if activity.payload.as_bytes() == b"fail" {
                return Err(TranscriptStoreError::StorageUnavailable("disk full".into()));
            }
            self.inner.log_activity(activity).await
        }
    }

    #[tokio::test]
    async fn test_buffered_logger_appends_in_order() {
        let store = InMemoryTranscriptStore::new();
        let logger = BufferedTranscriptLogger::new(Arc::new(store.clone()));

        for text in ["one", "two", "three"] {
            logger.log(activity("v1", text)).await.unwrap();
        }
        logger.flush().await.unwrap();

        let page = store
            .get_transcript_activities(
                &"c1".parse().unwrap(),
                &"v1".parse().unwrap(),
                &Default::default(),
            )
            .await
            .unwrap();
        let texts: Vec<String> = page
            .items
            .iter()
            .map(|r| String::from_utf8_lossy(r.payload.as_bytes()).into_owned())
            .collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_buffered_logger_reports_failures_once() {
        let store = InMemoryTranscriptStore::new();
        let logger = BufferedTranscriptLogger::new(Arc::new(PickyLogger {
            inner: store.clone(),
        }));

        logger.log(activity("v1", "ok")).await.unwrap();
        logger.log(activity("v1", "fail")).await.unwrap();

        match logger.flush().await {
            Err(BufferedLogError::Failed(failures)) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].activity.payload.as_bytes(), b"fail");
                assert!(failures[0].error.is_retryable());
            }
            other => panic!("expected failures, got {:?}", other),
        }

        logger.flush().await.unwrap();
        assert_eq!(store.activity_count().await, 1);
    }

    #[tokio::test]
    async fn test_buffered_logger_shutdown_drains_queue() {
        let store = InMemoryTranscriptStore::new();
        let logger = BufferedTranscriptLogger::with_config(
            Arc::new(store.clone()),
            BufferedLoggerConfig::default().with_capacity(2),
        );

        for i in 0..10 {
            logger.log(activity("v1", &i.to_string())).await.unwrap();
        }
        logger.shutdown().await.unwrap();

        assert_eq!(store.activity_count().await, 10);
    }

    #[tokio::test]
    async fn test_buffered_logger_closed_after_shutdown() {
        let logger = BufferedTranscriptLogger::new(Arc::new(InMemoryTranscriptStore::new()));
        logger.shutdown().await.unwrap();

        assert!(matches!(
            logger.log(activity("v1", "late")).await,
            Err(BufferedLogError::Closed)
        ));
        assert!(matches!(logger.flush().await, Err(BufferedLogError::Closed)));
        assert!(matches!(logger.shutdown().await, Err(BufferedLogError::Closed)));
    }

    #[tokio::test]
    async fn test_buffered_logger_concurrent_shutdowns_report_failures_once() {
        let logger = BufferedTranscriptLogger::new(Arc::new(PickyLogger {
            inner: InMemoryTranscriptStore::new(),
        }));
        logger.log(activity("v1", "fail")).await.unwrap();

        let (first, second) = tokio::join!(logger.shutdown(), logger.shutdown());

        let results = [first, second];
        let reported: Vec<usize> = results
            .iter()
            .filter_map(|r| match r {
                Err(BufferedLogError::Failed(failures)) => Some(failures.len()),
                _ => None,
            })
            .collect();
        let closed = results
            .iter()
            .filter(|r| matches!(r, Err(BufferedLogError::Closed)))
            .count();
        assert_eq!(reported, vec![1]);
        assert_eq!(closed, 1);
    }

    #[tokio::test]
    async fn test_buffered_logger_second_queued_shutdown_is_closed() {
        let logger = BufferedTranscriptLogger::new(Arc::new(PickyLogger {
            inner: InMemoryTranscriptStore::new(),
        }));
        logger.log(activity("v1", "fail")).await.unwrap();

        let (first_reply, first_response) = oneshot::channel();
        let (second_reply, second_response) = oneshot::channel();
        logger.sender.send(Command::Shutdown(first_reply)).await.unwrap();
        let second_sent = logger.sender.send(Command::Shutdown(second_reply)).await;

        let failures = first_response.await.unwrap();
        assert_eq!(failures.len(), 1);
        if second_sent.is_ok() {
            assert!(second_response.await.is_err());
        }
    }
}
