//! Continuation tokens.
//!
//! A token is `base64url(json(PageCursor)) "." base64url(hmac_sha256(json))`.
//! The store keeps no session state: everything needed to resume a query
//! travels inside the token, and the signature lets the store recognise
//! tokens it did not issue.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::foundation::{ChannelId, ConversationId, SequenceKey, Timestamp};

type HmacSha256 = Hmac<Sha256>;

/// Current token layout.
const CURSOR_VERSION: u8 = 1;

/// Errors raised while issuing or reading a continuation token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("continuation token is malformed: {0}")]
    Malformed(String),

    #[error("continuation token signature does not match")]
    BadSignature,

    #[error("continuation token version {0} is not supported")]
    UnsupportedVersion(u8),

    #[error("continuation token was issued for a different query")]
    ScopeMismatch,

    #[error("continuation token was issued with a different cutoff date")]
    CutoffMismatch,

    #[error("failed to encode continuation token: {0}")]
    Encoding(String),
}

/// The result set a cursor belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CursorScope {
    Activities {
        channel_id: ChannelId,
        conversation_id: ConversationId,
        cutoff: Timestamp,
    },
    Transcripts {
        channel_id: ChannelId,
    },
}

/// Decoded form of a continuation token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    #[serde(rename = "v")]
    pub version: u8,
    pub scope: CursorScope,
    /// Last sequence key delivered; the next page starts strictly after it.
    pub after: SequenceKey,
}

impl PageCursor {
    pub fn new(scope: CursorScope, after: SequenceKey) -> Self {
        Self {
            version: CURSOR_VERSION,
            scope,
            after,
        }
    }
}

/// Signs and verifies continuation tokens.
#[derive(Clone)]
pub struct CursorCodec {
    key: Vec<u8>,
}

impl CursorCodec {
    /// Creates a codec with a caller-supplied signing key.
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    /// Creates a codec with a random key. Tokens become unreadable after the
    /// process restarts.
    pub fn random() -> Self {
        let mut key = Vec::with_capacity(32);
        key.extend_from_slice(Uuid::new_v4().as_bytes());
        key.extend_from_slice(Uuid::new_v4().as_bytes());
        Self { key }
    }

    /// Serializes and signs a cursor.
    pub fn encode(&self, cursor: &PageCursor) -> Result<String, CursorError> {
        let body =
            serde_json::to_vec(cursor).map_err(|e| CursorError::Encoding(e.to_string()))?;
        let signature = self.sign(&body)?;

        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&body),
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    /// Verifies and deserializes a token.
    ///
    /// # Errors
    ///
    /// - `Malformed` if the token is not two base64url segments of JSON
    /// - `BadSignature` if the token was not issued with this key or was altered
    /// - `UnsupportedVersion` if the layout is unknown
    pub fn decode(&self, token: &str) -> Result<PageCursor, CursorError> {
        let (body_part, signature_part) = token
            .split_once('.')
            .ok_or_else(|| CursorError::Malformed("missing signature segment".to_string()))?;

        let body = URL_SAFE_NO_PAD
            .decode(body_part)
            .map_err(|e| CursorError::Malformed(e.to_string()))?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature_part)
            .map_err(|e| CursorError::Malformed(e.to_string()))?;

        let expected = self.sign(&body)?;
        if !bool::from(expected.as_slice().ct_eq(signature.as_slice())) {
            return Err(CursorError::BadSignature);
        }

        let cursor: PageCursor =
            serde_json::from_slice(&body).map_err(|e| CursorError::Malformed(e.to_string()))?;
        if cursor.version != CURSOR_VERSION {
            return Err(CursorError::UnsupportedVersion(cursor.version));
        }

        Ok(cursor)
    }

    fn sign(&self, body: &[u8]) -> Result<Vec<u8>, CursorError> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| CursorError::Encoding(e.to_string()))?;
        mac.update(body);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

impl std::fmt::Debug for CursorCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorCodec").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activities_scope() -> CursorScope {
        CursorScope::Activities {
            channel_id: ChannelId::new("c1").unwrap(),
            conversation_id: ConversationId::new("v1").unwrap(),
            cutoff: Timestamp::from_unix_secs(1_700_000_000).unwrap(),
        }
    }

    #[test]
    fn encoded_token_decodes_to_same_cursor() {
        let codec = CursorCodec::new(b"secret".to_vec());
        let cursor = PageCursor::new(activities_scope(), SequenceKey::new(42));

        let token = codec.encode(&cursor).unwrap();
        assert_eq!(codec.decode(&token).unwrap(), cursor);
    }

    #[test]
    fn token_is_url_safe() {
        let codec = CursorCodec::random();
        let cursor = PageCursor::new(activities_scope(), SequenceKey::new(1));
        let token = codec.encode(&cursor).unwrap();

        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'));
    }

    #[test]
    fn token_from_other_key_is_rejected() {
        let issuer = CursorCodec::new(b"one".to_vec());
        let verifier = CursorCodec::new(b"two".to_vec());
        let token = issuer
            .encode(&PageCursor::new(activities_scope(), SequenceKey::new(3)))
            .unwrap();

        assert_eq!(verifier.decode(&token), Err(CursorError::BadSignature));
    }

    #[test]
    fn tampered_body_is_rejected() {
        let codec = CursorCodec::new(b"secret".to_vec());
        let token = codec
            .encode(&PageCursor::new(activities_scope(), SequenceKey::new(3)))
            .unwrap();
        let (_, signature) = token.split_once('.').unwrap();

        let forged_cursor = PageCursor::new(activities_scope(), SequenceKey::new(9000));
        let forged_body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_cursor).unwrap());
        let forged = format!("{}.{}", forged_body, signature);

        assert_eq!(codec.decode(&forged), Err(CursorError::BadSignature));
    }

    #[test]
    fn garbage_is_malformed() {
        let codec = CursorCodec::random();
        assert!(matches!(codec.decode("garbage"), Err(CursorError::Malformed(_))));
        assert!(matches!(codec.decode("@@@.###"), Err(CursorError::Malformed(_))));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let codec = CursorCodec::new(b"secret".to_vec());
        let mut cursor = PageCursor::new(
            CursorScope::Transcripts {
                channel_id: ChannelId::new("c1").unwrap(),
            },
            SequenceKey::new(1),
        );
        cursor.version = 99;
        let token = codec.encode(&cursor).unwrap();

        assert_eq!(codec.decode(&token), Err(CursorError::UnsupportedVersion(99)));
    }
}
