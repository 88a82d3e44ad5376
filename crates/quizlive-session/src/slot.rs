//! Question slots: one question instance with its own open/close lifecycle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use quizlive_protocol::{QuestionRecord, SlotId};
use tokio::time::Instant;

/// Counter for generating slot IDs unique across all rooms.
static NEXT_SLOT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_slot_id() -> SlotId {
    SlotId(NEXT_SLOT_ID.fetch_add(1, Ordering::Relaxed))
}

/// A single question within a running room.
///
/// ```text
/// pending ──open──→ open ──close──→ closed
/// ```
///
/// Invariants:
/// - `closed_at` is set only after `opened_at` and only with `is_open == false`;
/// - answers are accepted iff `is_open` and `closed_at` is `None`.
#[derive(Debug, Clone)]
pub struct QuestionSlot {
    pub id: SlotId,
    /// 1-based position within the room.
    pub order_num: u32,
    pub question: QuestionRecord,
    is_open: bool,
    opened_at: Option<Instant>,
    closed_at: Option<Instant>,
}

impl QuestionSlot {
    pub fn new(id: SlotId, order_num: u32, question: QuestionRecord) -> Self {
        Self {
            id,
            order_num,
            question,
            is_open: false,
            opened_at: None,
            closed_at: None,
        }
    }

    /// Opens the slot. Returns `false` if it was ever opened before.
    pub fn open(&mut self, now: Instant) -> bool {
        if self.opened_at.is_some() {
            return false;
        }
        self.is_open = true;
        self.opened_at = Some(now);
        true
    }

    /// Closes an open slot. Returns `false` if it was not open.
    pub fn close(&mut self, now: Instant) -> bool {
        if !self.accepts_answers() {
            return false;
        }
        self.is_open = false;
        self.closed_at = Some(now);
        true
    }

    pub fn accepts_answers(&self) -> bool {
        self.is_open && self.opened_at.is_some() && self.closed_at.is_none()
    }

    /// Time since the slot opened, or `None` if it never did.
    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        self.opened_at.map(|at| now.saturating_duration_since(at))
    }
}
