//! Unified error type for the QuizLive engine.

use quizlive_protocol::ProtocolError;
use quizlive_sched::SchedError;
use quizlive_session::SessionError;

use crate::StoreError;

/// Top-level error that wraps every layer's errors.
///
/// The `#[from]` variants let `?` lift sub-crate errors. Use
/// [`kind`](Self::kind) to branch on the error class without matching
/// every layer's variants.
///
/// A rejected answer is not an error: see
/// [`AnswerOutcome`](quizlive_protocol::AnswerOutcome).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The room or record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation is not valid in the room's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The room or engine is misconfigured.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Sched(#[from] SchedError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Coarse classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    Config,
    /// The persistence gateway failed.
    Storage,
    /// The engine is shutting down or a worker died.
    Unavailable,
    Protocol,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidState(_) | Self::Session(SessionError::AlreadyRegistered(_)) => {
                ErrorKind::InvalidState
            }
            Self::Config(_) | Self::Session(SessionError::NoQuestions(_)) => ErrorKind::Config,
            Self::Store(StoreError::Missing(_)) => ErrorKind::NotFound,
            Self::Store(StoreError::InvalidTransition { .. }) => ErrorKind::InvalidState,
            Self::Store(_) => ErrorKind::Storage,
            Self::Sched(_) => ErrorKind::Unavailable,
            Self::Protocol(_) => ErrorKind::Protocol,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quizlive_protocol::{RoomId, RoomPin, RoomState};

    #[test]
    fn test_from_store_error() {
        let err: EngineError = StoreError::Unavailable("db down".into()).into();
        assert!(matches!(err, EngineError::Store(_)));
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(err.to_string().contains("db down"));
    }

    #[test]
    fn test_from_session_error() {
        let err: EngineError = SessionError::NoQuestions(RoomPin::new("1234")).into();
        assert_eq!(err.kind(), ErrorKind::Config);

        let err: EngineError = SessionError::AlreadyRegistered(RoomPin::new("1234")).into();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_from_sched_error() {
        let err: EngineError = SchedError::PoolClosed("answers".into()).into();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }

    #[test]
    fn test_from_protocol_error() {
        let err: EngineError = ProtocolError::InvalidMessage("bad".into()).into();
        assert!(matches!(err, EngineError::Protocol(_)));
    }

    #[test]
    fn test_store_transition_is_invalid_state() {
        let err: EngineError = StoreError::InvalidTransition {
            room: RoomId(1),
            from: RoomState::Finished,
            to: RoomState::Running,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }
}
