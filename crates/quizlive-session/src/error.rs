//! Error types for the session layer.

use quizlive_protocol::RoomPin;

/// Errors that can occur while building or registering room sessions.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A session cannot be built without at least one question.
    #[error("no questions configured for room {0}")]
    NoQuestions(RoomPin),

    /// A live session already exists for this PIN.
    #[error("room {0} already has a running game")]
    AlreadyRegistered(RoomPin),
}
