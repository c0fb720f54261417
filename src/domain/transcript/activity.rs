//! Activity records - the unit of a transcript.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::foundation::{ChannelId, ConversationId, SequenceKey, Timestamp, ValidationError};

/// Opaque, externally-serialized activity content.
///
/// The store never inspects the bytes. In text formats the payload is
/// carried as a base64 string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActivityPayload(Vec<u8>);

impl ActivityPayload {
    /// Wraps raw bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Serializes a value as JSON and wraps the bytes.
    pub fn from_json<T: Serialize>(value: &T) -> Result<Self, ValidationError> {
        serde_json::to_vec(value)
            .map(Self)
            .map_err(|e| ValidationError::invalid_format("payload", e.to_string()))
    }

    /// Parses the payload as JSON.
    pub fn to_json<T: DeserializeOwned>(&self) -> Result<T, ValidationError> {
        serde_json::from_slice(&self.0)
            .map_err(|e| ValidationError::invalid_format("payload", e.to_string()))
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the payload, returning the raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for ActivityPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for ActivityPayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Self)
            .map_err(D::Error::custom)
    }
}

/// An activity submitted for logging, before the store orders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewActivity {
    pub channel_id: ChannelId,
    pub conversation_id: ConversationId,
    /// When the activity occurred. Client-supplied and advisory; used only
    /// for cutoff filtering, never for ordering.
    pub timestamp: Timestamp,
    pub payload: ActivityPayload,
}

impl NewActivity {
    pub fn new(
        channel_id: ChannelId,
        conversation_id: ConversationId,
        timestamp: Timestamp,
        payload: ActivityPayload,
    ) -> Self {
        Self {
            channel_id,
            conversation_id,
            timestamp,
            payload,
        }
    }

    /// Builds an activity from raw identifiers, validating them.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyField` if either identifier is empty.
    pub fn from_parts(
        channel_id: &str,
        conversation_id: &str,
        timestamp: Timestamp,
        payload: ActivityPayload,
    ) -> Result<Self, ValidationError> {
        Ok(Self::new(
            ChannelId::new(channel_id)?,
            ConversationId::new(conversation_id)?,
            timestamp,
            payload,
        ))
    }

    /// Stamps the activity with its store-assigned ordering key.
    pub fn into_record(self, sequence_key: SequenceKey) -> ActivityRecord {
        ActivityRecord {
            channel_id: self.channel_id,
            conversation_id: self.conversation_id,
            sequence_key,
            timestamp: self.timestamp,
            payload: self.payload,
        }
    }
}

/// One logged activity plus its storage metadata. Never mutated after append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub channel_id: ChannelId,
    pub conversation_id: ConversationId,
    pub sequence_key: SequenceKey,
    pub timestamp: Timestamp,
    pub payload: ActivityPayload,
}

impl ActivityRecord {
    /// Whether the record is eligible under an inclusive cutoff.
    pub fn is_within(&self, cutoff: &Timestamp) -> bool {
        !self.timestamp.is_after(cutoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_unix_secs(secs).unwrap()
    }

    #[test]
    fn payload_serializes_as_base64_string() {
        let payload = ActivityPayload::from_bytes(b"hello".to_vec());
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(json, "\"aGVsbG8=\"");

        let back: ActivityPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_bytes(), b"hello");
    }

    #[test]
    fn payload_rejects_invalid_base64() {
        let result: Result<ActivityPayload, _> = serde_json::from_str("\"not base64!\"");
        assert!(result.is_err());
    }

    #[test]
    fn payload_json_helpers_work() {
        let payload = ActivityPayload::from_json(&json!({"type": "message", "text": "hi"})).unwrap();
        let value: serde_json::Value = payload.to_json().unwrap();
        assert_eq!(value["text"], "hi");
    }

    #[test]
    fn from_parts_rejects_empty_identifiers() {
        let result = NewActivity::from_parts("", "v1", ts(1), ActivityPayload::default());
        assert!(matches!(result, Err(ValidationError::EmptyField { .. })));

        let result = NewActivity::from_parts("c1", " ", ts(1), ActivityPayload::default());
        assert!(matches!(result, Err(ValidationError::EmptyField { .. })));
    }

    #[test]
    fn into_record_carries_all_fields() {
        let activity =
            NewActivity::from_parts("c1", "v1", ts(10), ActivityPayload::from_bytes(vec![1, 2]))
                .unwrap();
        let record = activity.into_record(SequenceKey::new(7));

        assert_eq!(record.channel_id.as_str(), "c1");
        assert_eq!(record.conversation_id.as_str(), "v1");
        assert_eq!(record.sequence_key, SequenceKey::new(7));
        assert_eq!(record.timestamp, ts(10));
        assert_eq!(record.payload.as_bytes(), &[1, 2]);
    }

    #[test]
    fn cutoff_is_inclusive() {
        let record = NewActivity::from_parts("c1", "v1", ts(10), ActivityPayload::default())
            .unwrap()
            .into_record(SequenceKey::new(1));

        assert!(record.is_within(&ts(10)));
        assert!(record.is_within(&ts(11)));
        assert!(!record.is_within(&ts(9)));
    }
}
