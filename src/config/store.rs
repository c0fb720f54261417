//! Transcript store configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::PathBuf;

use super::error::ValidationError;
use crate::domain::transcript::{CursorCodec, DEFAULT_PAGE_SIZE};

/// Largest page size a store will serve.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Storage engine behind the transcript ports
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Memory,
    File,
    Postgres,
}

/// Transcript store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Which backend to open
    #[serde(default)]
    pub backend: Backend,

    /// Maximum items per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Root directory of the file backend
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Key used to sign continuation tokens. When absent a random key is
    /// generated and tokens do not survive a restart.
    pub cursor_secret: Option<SecretString>,
}

impl StoreConfig {
    /// Build the cursor codec for this configuration
    pub fn cursor_codec(&self) -> CursorCodec {
        match &self.cursor_secret {
            Some(secret) => CursorCodec::new(secret.expose_secret().as_bytes()),
            None => CursorCodec::random(),
        }
    }

    /// Validate store configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(ValidationError::InvalidPageSize);
        }
        if self.backend == Backend::File && self.data_dir.as_os_str().is_empty() {
            return Err(ValidationError::MissingRequired("STORE__DATA_DIR"));
        }
        if let Some(secret) = &self.cursor_secret {
            if secret.expose_secret().len() < 16 {
                return Err(ValidationError::CursorSecretTooShort);
            }
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            page_size: default_page_size(),
            data_dir: default_data_dir(),
            cursor_secret: None,
        }
    }
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data/transcripts")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.page_size, 20);
        assert_eq!(config.data_dir, PathBuf::from("./data/transcripts"));
        assert!(config.cursor_secret.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backend_deserialization() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"backend": "postgres", "page_size": 50}"#).unwrap();
        assert_eq!(config.backend, Backend::Postgres);
        assert_eq!(config.page_size, 50);
    }

    #[test]
    fn test_validation_page_size_bounds() {
        let zero = StoreConfig {
            page_size: 0,
            ..Default::default()
        };
        assert!(matches!(zero.validate(), Err(ValidationError::InvalidPageSize)));

        let huge = StoreConfig {
            page_size: MAX_PAGE_SIZE + 1,
            ..Default::default()
        };
        assert!(huge.validate().is_err());
    }

    #[test]
    fn test_validation_short_secret() {
        let config = StoreConfig {
            cursor_secret: Some(SecretString::new("short".to_string())),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::CursorSecretTooShort)
        ));
    }

    #[test]
    fn test_configured_secret_yields_stable_codec() {
        use crate::domain::foundation::{ChannelId, SequenceKey};
        use crate::domain::transcript::{CursorScope, PageCursor};

        let config = StoreConfig {
            cursor_secret: Some(SecretString::new("a-long-enough-secret".to_string())),
            ..Default::default()
        };
        let cursor = PageCursor::new(
            CursorScope::Transcripts {
                channel_id: ChannelId::new("c1").unwrap(),
            },
            SequenceKey::new(7),
        );

        let token = config.cursor_codec().encode(&cursor).unwrap();
        assert_eq!(config.cursor_codec().decode(&token).unwrap(), cursor);
    }
}
