//! Persistence gateway consumed by the engine.
//!
//! QuizLive does not own a database. Room records, the question catalog,
//! players, and the answer log live behind the [`QuizStore`] trait, which
//! you implement over whatever storage you already have. The engine reads
//! from it when a game starts and mirrors every accepted answer into it.
//!
//! The store is a mirror, not the source of truth for in-flight decisions:
//! whether a question is open and whether a player already answered are
//! decided in memory by the room session.

use std::future::Future;
use std::sync::Arc;

use quizlive_protocol::{
    AnswerRecord, PlayerId, PlayerRecord, QuestionRecord, RoomId, RoomPin, RoomRecord, RoomState,
};

/// Errors reported by a [`QuizStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing storage could not be reached or failed the call.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A record the call depends on does not exist.
    #[error("record not found: {0}")]
    Missing(String),

    /// A unique constraint was violated.
    #[error("duplicate record: {0}")]
    Duplicate(String),

    /// The room cannot move between these states.
    #[error("room {room} cannot go from {from} to {to}")]
    InvalidTransition {
        room: RoomId,
        from: RoomState,
        to: RoomState,
    },

    /// The request is well-formed but not allowed right now.
    #[error("rejected: {0}")]
    Rejected(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable storage for rooms, questions, players, and answers.
///
/// # Trait bounds
///
/// `Send + Sync + 'static` because one store is shared by every room and
/// called from worker and timer tasks on any thread. Every returned future
/// must be `Send` for the same reason.
pub trait QuizStore: Send + Sync + 'static {
    /// Looks up a room by PIN.
    fn load_room(
        &self,
        pin: &RoomPin,
    ) -> impl Future<Output = StoreResult<Option<RoomRecord>>> + Send;

    /// The questions selected for a room, in play order.
    fn load_selected_questions(
        &self,
        room_id: RoomId,
    ) -> impl Future<Output = StoreResult<Vec<QuestionRecord>>> + Send;

    /// Appends an accepted answer to the answer log.
    fn save_answer(&self, answer: AnswerRecord) -> impl Future<Output = StoreResult<()>> + Send;

    /// Adds `delta` to the player's durable score and returns the new score.
    fn update_player_score(
        &self,
        player_id: PlayerId,
        delta: i64,
    ) -> impl Future<Output = StoreResult<i64>> + Send;

    /// Moves a room to `state`.
    fn mark_room_state(
        &self,
        room_id: RoomId,
        state: RoomState,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Number of players registered in a room.
    fn count_players(&self, room_id: RoomId) -> impl Future<Output = StoreResult<usize>> + Send;

    /// Looks up a player by display name within the room with this PIN.
    fn find_player(
        &self,
        pin: &RoomPin,
        name: &str,
    ) -> impl Future<Output = StoreResult<Option<PlayerRecord>>> + Send;

    fn get_player(
        &self,
        player_id: PlayerId,
    ) -> impl Future<Output = StoreResult<Option<PlayerRecord>>> + Send;

    /// Every player registered in a room, in no particular order.
    fn list_players(
        &self,
        room_id: RoomId,
    ) -> impl Future<Output = StoreResult<Vec<PlayerRecord>>> + Send;
}

impl<S: QuizStore> QuizStore for Arc<S> {
    fn load_room(
        &self,
        pin: &RoomPin,
    ) -> impl Future<Output = StoreResult<Option<RoomRecord>>> + Send {
        (**self).load_room(pin)
    }

    fn load_selected_questions(
        &self,
        room_id: RoomId,
    ) -> impl Future<Output = StoreResult<Vec<QuestionRecord>>> + Send {
        (**self).load_selected_questions(room_id)
    }

    fn save_answer(&self, answer: AnswerRecord) -> impl Future<Output = StoreResult<()>> + Send {
        (**self).save_answer(answer)
    }

    fn update_player_score(
        &self,
        player_id: PlayerId,
        delta: i64,
    ) -> impl Future<Output = StoreResult<i64>> + Send {
        (**self).update_player_score(player_id, delta)
    }

    fn mark_room_state(
        &self,
        room_id: RoomId,
        state: RoomState,
    ) -> impl Future<Output = StoreResult<()>> + Send {
        (**self).mark_room_state(room_id, state)
    }

    fn count_players(&self, room_id: RoomId) -> impl Future<Output = StoreResult<usize>> + Send {
        (**self).count_players(room_id)
    }

    fn find_player(
        &self,
        pin: &RoomPin,
        name: &str,
    ) -> impl Future<Output = StoreResult<Option<PlayerRecord>>> + Send {
        (**self).find_player(pin, name)
    }

    fn get_player(
        &self,
        player_id: PlayerId,
    ) -> impl Future<Output = StoreResult<Option<PlayerRecord>>> + Send {
        (**self).get_player(player_id)
    }

    fn list_players(
        &self,
        room_id: RoomId,
    ) -> impl Future<Output = StoreResult<Vec<PlayerRecord>>> + Send {
        (**self).list_players(room_id)
    }
}
