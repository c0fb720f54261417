//! Store factory - Opens the configured transcript backend.

use std::sync::Arc;

use thiserror::Error;

use crate::adapters::{FileTranscriptStore, InMemoryTranscriptStore, PostgresTranscriptStore};
use crate::config::{AppConfig, Backend, ValidationError};
use crate::ports::{TranscriptStore, TranscriptStoreError};

/// Errors raised while opening a store.
#[derive(Debug, Error)]
pub enum StoreSetupError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ValidationError),

    #[error("Failed to open {backend:?} backend: {source}")]
    Open {
        backend: Backend,
        #[source]
        source: TranscriptStoreError,
    },
}

/// Build the backend selected by `config.store.backend`.
///
/// Validates the configuration first. For Postgres, migrations run when
/// `database.run_migrations` is set.
///
/// # Errors
///
/// - `InvalidConfig` if validation fails
/// - `Open` if the backing medium cannot be prepared
pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn TranscriptStore>, StoreSetupError> {
    config.validate()?;

    let backend = config.store.backend;
    let codec = config.store.cursor_codec();
    let page_size = config.store.page_size;
    let open_error = |source: TranscriptStoreError| StoreSetupError::Open { backend, source };

    let store: Arc<dyn TranscriptStore> = match backend {
        Backend::Memory => Arc::new(
            InMemoryTranscriptStore::new()
                .with_codec(codec)
                .with_page_size(page_size),
        ),
        Backend::File => Arc::new(
            FileTranscriptStore::open(&config.store.data_dir)
                .await
                .map_err(open_error)?
                .with_codec(codec)
                .with_page_size(page_size),
        ),
        Backend::Postgres => {
            let store = PostgresTranscriptStore::connect(&config.database, codec)
                .await
                .map_err(open_error)?
                .with_page_size(page_size);
            if config.database.run_migrations {
                store.migrate().await.map_err(open_error)?;
            }
            Arc::new(store)
        }
    };

    tracing::info!(?backend, page_size, "Transcript store opened");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::domain::foundation::Timestamp;
    use crate::domain::transcript::{ActivityPayload, ActivityQuery, NewActivity};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_opens_memory_backend_by_default() {
        let store = open_store(&AppConfig::default()).await.unwrap();

        let logged = store
            .log_activity(
                NewActivity::from_parts(
                    "c1",
                    "v1",
                    Timestamp::from_unix_secs(1).unwrap(),
                    ActivityPayload::from_bytes(b"hi".to_vec()),
                )
                .unwrap(),
            )
            .await
            .unwrap();

        let page = store
            .get_transcript_activities(&logged.channel_id, &logged.conversation_id, &ActivityQuery::new())
            .await
            .unwrap();
        assert_eq!(page.items, vec![logged]);
    }

    #[tokio::test]
    async fn test_opens_file_backend_in_data_dir() {
        let temp_dir = TempDir::new().unwrap();
        let config = AppConfig {
            store: StoreConfig {
                backend: Backend::File,
                data_dir: temp_dir.path().join("transcripts"),
                ..Default::default()
            },
            ..Default::default()
        };

        open_store(&config).await.unwrap();
        assert!(temp_dir.path().join("transcripts").is_dir());
    }

    #[tokio::test]
    async fn test_rejects_invalid_configuration() {
        let config = AppConfig {
            store: StoreConfig {
                backend: Backend::Postgres,
                ..Default::default()
            },
            ..Default::default()
        };

        assert!(matches!(
            open_store(&config).await,
            Err(StoreSetupError::InvalidConfig(_))
        ));
    }
}
