//! Shared vocabulary for QuizLive.
//!
//! - **Types** ([`RoomPin`], [`PlayerId`], [`SlotId`], records, [`AnswerOutcome`])
//!   that every layer passes around.
//! - **Events** ([`GameEvent`]) describing room transitions.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) for handing events and
//!   outcomes to external consumers.
//!
//! This crate knows nothing about timers, locks, or storage.

mod codec;
mod error;
mod events;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use events::{CloseReason, GameEvent};
pub use types::{
    AcceptedAnswer, AnswerOutcome, AnswerRecord, PlayerId, PlayerRecord, QuestionId,
    QuestionRecord, Rejection, RejectionKind, RoomId, RoomPin, RoomRecord, RoomState, SlotId,
    SlotView,
};
