//! Lifecycle events published by the engine.
//!
//! The engine is the only component that knows *when* a question opens or
//! closes. Everything outside it (web pages, host dashboards, persistence
//! mirrors) learns about transitions by subscribing to these events.

use serde::{Deserialize, Serialize};

use crate::{PlayerId, QuestionId, RoomPin, SlotId};

/// Why a slot stopped accepting answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The question's time budget ran out.
    Timeout,
    /// Every player in the room answered.
    AllAnswered,
    /// Closed on request through the engine API.
    Manual,
    /// The game was finished while the slot was still open.
    Finished,
}

/// A state transition inside one room.
///
/// Internally tagged so consumers see `{"type": "SlotOpened", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GameEvent {
    /// The room left WAITING and its slots were built.
    GameStarted { pin: RoomPin, total_slots: u32 },

    /// A slot opened for answers.
    SlotOpened {
        pin: RoomPin,
        slot_id: SlotId,
        question_id: QuestionId,
        order_num: u32,
        /// Length of the answer window in milliseconds.
        time_budget_ms: u64,
    },

    /// A slot closed. Emitted exactly once per opened slot.
    SlotClosed {
        pin: RoomPin,
        slot_id: SlotId,
        reason: CloseReason,
    },

    /// An answer passed validation and was recorded.
    AnswerAccepted {
        pin: RoomPin,
        player_id: PlayerId,
        slot_id: SlotId,
        correct: bool,
        points: i64,
        total_score: i64,
    },

    /// The session ended and was removed from the registry.
    GameFinished { pin: RoomPin },
}

impl GameEvent {
    /// The room this event belongs to.
    pub fn pin(&self) -> &RoomPin {
        match self {
            Self::GameStarted { pin, .. }
            | Self::SlotOpened { pin, .. }
            | Self::SlotClosed { pin, .. }
            | Self::AnswerAccepted { pin, .. }
            | Self::GameFinished { pin } => pin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_accessor_covers_every_variant() {
        let pin = RoomPin::new("111111");
        let events = [
            GameEvent::GameStarted { pin: pin.clone(), total_slots: 3 },
            GameEvent::SlotClosed {
                pin: pin.clone(),
                slot_id: SlotId(1),
                reason: CloseReason::Timeout,
            },
            GameEvent::GameFinished { pin: pin.clone() },
        ];
        for event in &events {
            assert_eq!(event.pin(), &pin);
        }
    }
}
