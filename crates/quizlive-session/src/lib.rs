//! Room sessions for QuizLive.
//!
//! A running game is a [`RoomSession`]: an ordered list of
//! [`QuestionSlot`]s, a pointer to the current one, the set of answers
//! already taken, and running scores. Sessions are published in a
//! [`SessionRegistry`] under their room PIN for as long as the game runs.
//!
//! # Key types
//!
//! - [`RoomSession`] - per-room state machine (open, close, finish, reserve)
//! - [`SessionRegistry`] - PIN → live session
//! - [`QuestionSlot`] - one question instance and its open/close lifecycle
//! - [`SessionTiming`] - answer window and speed-bonus switch
//! - [`scoring::score`] - the points policy
//!
//! Sessions never spawn tasks. Scheduling is handed in by the caller, so
//! this crate can be driven directly from tests.

mod config;
mod error;
mod registry;
pub mod scoring;
mod session;
mod slot;

pub use config::{MIN_QUESTION_TIME, SessionTiming};
pub use error::SessionError;
pub use quizlive_protocol::Rejection;
pub use registry::SessionRegistry;
pub use session::{CloseOutcome, FinishOutcome, OpenOutcome, Reservation, RoomSession};
pub use slot::QuestionSlot;
