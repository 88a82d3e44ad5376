//! Error types for the protocol layer.

/// Errors raised while encoding or decoding QuizLive values.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed input, missing fields, wrong types.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The value decoded but violates a protocol rule (e.g. empty PIN).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
