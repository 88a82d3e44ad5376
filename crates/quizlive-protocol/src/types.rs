//! Core data types shared by every QuizLive layer.
//!
//! These are the values that cross crate boundaries: identifiers, the
//! durable records the store hands to the engine, and the outcome of an
//! answer submission. Everything here is plain data: no locks, no clocks,
//! no async.

use serde::{Deserialize, Serialize};

use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a player.
///
/// Newtype over `u64` so a `PlayerId` can never be passed where a
/// `SlotId` is expected. `#[serde(transparent)]` keeps the JSON form a
/// bare number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// The durable identifier of a room record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

/// Identifier of a question in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(pub u64);

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q-{}", self.0)
    }
}

/// Identifier of a slot: one question instance inside one running room.
///
/// The same catalog question asked in two rooms gets two different slot
/// IDs, so answers are always keyed by `(PlayerId, SlotId)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(pub u64);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

/// The short code players type to join a room (e.g. `"482913"`).
///
/// PINs are the key of the live session registry, so they are cheap to
/// clone and hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomPin(String);

impl RoomPin {
    /// Wraps a PIN string.
    pub fn new(pin: impl Into<String>) -> Self {
        Self(pin.into())
    }

    /// The PIN as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomPin {
    fn from(pin: &str) -> Self {
        Self::new(pin)
    }
}

impl From<String> for RoomPin {
    fn from(pin: String) -> Self {
        Self(pin)
    }
}

// ---------------------------------------------------------------------------
// Room lifecycle
// ---------------------------------------------------------------------------

/// The durable lifecycle state of a room.
///
/// ```text
/// Waiting ──start──→ Running ──last slot closed / finish──→ Finished
/// ```
///
/// Only `Running` rooms have a live session in the engine; the other two
/// states exist purely in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomState {
    Waiting,
    Running,
    Finished,
}

impl RoomState {
    /// Returns `true` if transitioning to `target` is valid.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Waiting, Self::Running) | (Self::Running, Self::Finished)
        )
    }
}

impl fmt::Display for RoomState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "WAITING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Finished => write!(f, "FINISHED"),
        }
    }
}

// ---------------------------------------------------------------------------
// Records supplied by the store
// ---------------------------------------------------------------------------

/// A room as the store knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRecord {
    pub id: RoomId,
    pub pin: RoomPin,
    pub state: RoomState,
    /// Time budget of each question, in whole seconds.
    pub time_per_question: u32,
}

/// A catalog question selected for a room.
///
/// Options are 1-based on the wire: `correct_option == 1` means the first
/// entry of `options`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub id: QuestionId,
    pub text: String,
    pub options: Vec<String>,
    pub correct_option: u8,
}

impl QuestionRecord {
    /// Whether `option` is one of this question's choices.
    pub fn has_option(&self, option: u8) -> bool {
        option >= 1 && usize::from(option) <= self.options.len()
    }

    pub fn is_correct(&self, option: u8) -> bool {
        option == self.correct_option
    }
}

/// A player registered in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub room_id: RoomId,
    pub name: String,
    /// Durable score; mirrors the session score while a game runs.
    pub score: i64,
}

/// One accepted answer, as persisted through the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub player_id: PlayerId,
    pub room_id: RoomId,
    pub slot_id: SlotId,
    pub question_id: QuestionId,
    pub selected_option: u8,
    /// Milliseconds between the slot opening and the answer being processed.
    pub elapsed_ms: u64,
    pub correct: bool,
    pub points: i64,
}

// ---------------------------------------------------------------------------
// Answer outcome
// ---------------------------------------------------------------------------

/// A successful submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedAnswer {
    pub correct: bool,
    /// Points earned by this answer.
    pub points: i64,
    /// The player's running total in this room after this answer.
    pub total_score: i64,
}

/// Why a submission was refused.
///
/// Rejections are terminal: the same request will never succeed later,
/// so callers should surface them rather than retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// No running game for this PIN.
    RoomNotActive,
    /// The slot ID does not belong to this room.
    QuestionNotFound,
    /// The slot is not currently open for answers.
    QuestionClosed,
    /// The player is not registered in this room.
    PlayerUnknown,
    /// The selected option is outside the question's choices.
    InvalidOption,
    /// The player already answered this slot.
    DuplicateAnswer,
}

impl Rejection {
    /// The broad error class this rejection belongs to.
    pub fn kind(self) -> RejectionKind {
        match self {
            Self::RoomNotActive | Self::QuestionClosed | Self::InvalidOption => {
                RejectionKind::InvalidState
            }
            Self::QuestionNotFound | Self::PlayerUnknown => RejectionKind::NotFound,
            Self::DuplicateAnswer => RejectionKind::DuplicateAnswer,
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::RoomNotActive => "room not active",
            Self::QuestionNotFound => "question not found",
            Self::QuestionClosed => "question is no longer accepting answers",
            Self::PlayerUnknown => "player not found in this room",
            Self::InvalidOption => "selected option is not valid for this question",
            Self::DuplicateAnswer => "you have already answered this question",
        };
        f.write_str(text)
    }
}

/// Coarse classification of [`Rejection`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    InvalidState,
    NotFound,
    DuplicateAnswer,
}

/// The result of processing one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AnswerOutcome {
    Accepted(AcceptedAnswer),
    Rejected { reason: Rejection },
}

impl AnswerOutcome {
    pub fn rejected(reason: Rejection) -> Self {
        Self::Rejected { reason }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    /// The accepted answer, if any.
    pub fn accepted(&self) -> Option<&AcceptedAnswer> {
        match self {
            Self::Accepted(answer) => Some(answer),
            Self::Rejected { .. } => None,
        }
    }

    /// The rejection reason, if any.
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            Self::Accepted(_) => None,
            Self::Rejected { reason } => Some(*reason),
        }
    }
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// What a client needs to render the current question of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotView {
    pub slot_id: SlotId,
    /// 1-based position of this question in the room.
    pub order_num: u32,
    pub total_slots: u32,
    pub question_id: QuestionId,
    pub text: String,
    pub options: Vec<String>,
    pub is_open: bool,
    /// Milliseconds until the expiry timer fires; 0 once closed.
    pub remaining_ms: u64,
}
