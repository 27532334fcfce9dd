//! Versioned topic-message envelope and its marshalling seam.
//!
//! Every payload published on a topic travels wrapped in a [`TopicMessage`]
//! carrying the protocol version and the sender's wall-clock timestamp. The
//! timestamp is what receivers use to reject stale or premature messages
//! without consulting the payload.

use crate::error::CodecError;
use sbor::prelude::BasicSbor;

/// Envelope version stamped on every outgoing message.
pub const CURRENT_TOPIC_MESSAGE_VERSION: u8 = 1;

/// The wire envelope placed around every topic payload.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct TopicMessage {
    /// Envelope format version, `>= 1`.
    pub version: u8,
    /// Sender wall clock, seconds since the Unix epoch.
    pub timestamp: i64,
    /// Application payload, never empty on the wire.
    pub payload: Vec<u8>,
}

impl TopicMessage {
    /// Build an envelope at the current version.
    pub fn new(payload: Vec<u8>, timestamp: i64) -> Self {
        Self {
            version: CURRENT_TOPIC_MESSAGE_VERSION,
            timestamp,
            payload,
        }
    }
}

/// Marshalling seam for the envelope.
///
/// The messenger never interprets payload bytes; the only structure it
/// marshals is the envelope itself.
pub trait Marshaller: Send + Sync {
    fn marshal(&self, message: &TopicMessage) -> Result<Vec<u8>, CodecError>;
    fn unmarshal(&self, bytes: &[u8]) -> Result<TopicMessage, CodecError>;
}

/// Default marshaller encoding the envelope with basic SBOR.
#[derive(Debug, Clone, Copy, Default)]
pub struct SborMarshaller;

impl Marshaller for SborMarshaller {
    fn marshal(&self, message: &TopicMessage) -> Result<Vec<u8>, CodecError> {
        sbor::basic_encode(message).map_err(|e| CodecError::Marshal(format!("{e:?}")))
    }

    fn unmarshal(&self, bytes: &[u8]) -> Result<TopicMessage, CodecError> {
        let message: TopicMessage =
            sbor::basic_decode(bytes).map_err(|e| CodecError::Unmarshal(format!("{e:?}")))?;

        if message.version < CURRENT_TOPIC_MESSAGE_VERSION {
            return Err(CodecError::UnsupportedVersion(message.version));
        }
        if message.payload.is_empty() {
            return Err(CodecError::EmptyPayload);
        }

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_round_trip() {
        let marshaller = SborMarshaller;
        let message = TopicMessage::new(vec![0x01, 0x02, 0x03], 1_700_000_000);

        let bytes = marshaller.marshal(&message).unwrap();
        let decoded = marshaller.unmarshal(&bytes).unwrap();

        assert_eq!(decoded.version, CURRENT_TOPIC_MESSAGE_VERSION);
        assert_eq!(decoded.timestamp, 1_700_000_000);
        assert_eq!(decoded.payload, vec![0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_unmarshal_garbage_fails() {
        let marshaller = SborMarshaller;
        assert!(matches!(
            marshaller.unmarshal(&[0xFF, 0xFF, 0xFF]),
            Err(CodecError::Unmarshal(_))
        ));
    }

    #[test]
    fn test_unmarshal_rejects_version_zero() {
        let marshaller = SborMarshaller;
        let mut message = TopicMessage::new(vec![0x01], 10);
        message.version = 0;

        let bytes = sbor::basic_encode(&message).unwrap();
        assert!(matches!(
            marshaller.unmarshal(&bytes),
            Err(CodecError::UnsupportedVersion(0))
        ));
    }

    #[test]
    fn test_unmarshal_rejects_empty_payload() {
        let marshaller = SborMarshaller;
        let message = TopicMessage::new(Vec::new(), 10);

        let bytes = sbor::basic_encode(&message).unwrap();
        assert!(matches!(
            marshaller.unmarshal(&bytes),
            Err(CodecError::EmptyPayload)
        ));
    }
}
