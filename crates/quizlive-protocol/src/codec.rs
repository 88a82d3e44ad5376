//! Codecs for handing QuizLive values to external consumers.
//!
//! The engine never serializes anything itself. Consumers that forward
//! [`GameEvent`](crate::GameEvent)s or outcomes over a socket or into a
//! log pick a [`Codec`] and call it at the edge.

use serde::{Serialize, de::DeserializeOwned};

use crate::{GameEvent, ProtocolError};

/// Converts values to bytes and back.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;

    /// Decodes a lifecycle event and rejects ones that name no room.
    fn decode_event(&self, data: &[u8]) -> Result<GameEvent, ProtocolError> {
        let event: GameEvent = self.decode(data)?;
        if event.pin().as_str().is_empty() {
            return Err(ProtocolError::InvalidMessage("event without room PIN".into()));
        }
        Ok(event)
    }
}

/// A [`Codec`] backed by `serde_json`.
///
/// ```rust
/// use quizlive_protocol::{Codec, GameEvent, JsonCodec, RoomPin};
///
/// let codec = JsonCodec;
/// let event = GameEvent::GameFinished { pin: RoomPin::new("482913") };
/// let bytes = codec.encode(&event).unwrap();
/// assert_eq!(codec.decode_event(&bytes).unwrap(), event);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
