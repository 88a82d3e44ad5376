//! The authoritative in-memory state of one running room.
//!
//! A `RoomSession` owns two kinds of state with two different disciplines:
//!
//! - **Progress** (slots, question pointer, pending timers) lives behind a
//!   per-room async mutex. Every open/close/finish transition runs inside
//!   that critical section, so opening slot N+1 always happens-after
//!   closing slot N, and two close triggers can never both advance the
//!   pointer.
//! - **Answers and scores** live in concurrent maps. The claim set is the
//!   single authority for "this player already answered this slot": a
//!   reservation is one atomic insert-if-absent, never check-then-insert.
//!   A claim only counts as an answer once it is confirmed, after the
//!   answer has been persisted.
//!
//! The session never schedules anything by itself. Callers pass a closure
//! that arms the timer, and the session runs it inside the critical section
//! so the returned handle is stored before any other transition can look.

use std::collections::HashSet;
use std::time::Duration;

use dashmap::DashMap;
use quizlive_protocol::{PlayerId, QuestionRecord, RoomId, RoomPin, SlotId, SlotView};
use quizlive_sched::TimerHandle;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::slot::{QuestionSlot, next_slot_id};
use crate::{Rejection, SessionError, SessionTiming};

// ---------------------------------------------------------------------------
// Transition outcomes
// ---------------------------------------------------------------------------

/// Result of [`RoomSession::open_next`].
#[derive(Debug, Clone)]
pub enum OpenOutcome {
    /// The slot at the current index opened and its expiry timer is armed.
    Opened(QuestionSlot),
    /// The current slot was already open; nothing changed.
    AlreadyOpen(SlotId),
    /// No slots remain. The session is now finished.
    Exhausted,
    /// The session had finished before this call.
    Finished,
}

/// Result of [`RoomSession::close_slot`].
#[derive(Debug, Clone)]
pub enum CloseOutcome {
    /// The slot closed and the pointer advanced to `next_index`.
    Closed { slot: QuestionSlot, next_index: usize },
    /// The slot was not the open one (already closed, never opened, or
    /// unknown). Nothing changed.
    NotOpen,
}

/// Result of [`RoomSession::finish`].
#[derive(Debug, Clone)]
pub struct FinishOutcome {
    /// The slot that was still open when the session finished, if any.
    pub interrupted: Option<SlotId>,
    /// Timers that were still pending and got cancelled.
    pub cancelled_timers: usize,
}

/// A successful answer reservation.
///
/// Holding one means the `(player, slot)` pair is claimed. Once the answer
/// is persisted, [`RoomSession::confirm_answer`] it; if it cannot be, hand
/// the pair back with [`RoomSession::release_answer`].
#[derive(Debug, Clone)]
pub struct Reservation {
    pub player_id: PlayerId,
    pub slot_id: SlotId,
    pub question: QuestionRecord,
    /// Time between the slot opening and the reservation.
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

struct Progress {
    slots: Vec<QuestionSlot>,
    current_index: usize,
    /// Expiry timer of the open slot.
    expiry: Option<TimerHandle>,
    /// Grace-delay opens and early closes still waiting to fire.
    followups: Vec<TimerHandle>,
    finished: bool,
}

impl Progress {
    fn current(&self) -> Option<&QuestionSlot> {
        self.slots.get(self.current_index)
    }

    fn slot(&self, slot_id: SlotId) -> Option<&QuestionSlot> {
        self.slots.iter().find(|s| s.id == slot_id)
    }

    fn track(&mut self, handle: TimerHandle) {
        self.followups.retain(TimerHandle::is_pending);
        self.followups.push(handle);
    }

    fn cancel_all(&mut self) -> usize {
        let expiry = self.expiry.take().into_iter();
        expiry
            .chain(self.followups.drain(..))
            .filter(|handle| handle.cancel())
            .count()
    }
}

/// In-memory state of one running room.
pub struct RoomSession {
    room_id: RoomId,
    pin: RoomPin,
    timing: SessionTiming,
    slot_count: usize,
    progress: Mutex<Progress>,
    /// player → slots claimed. Entry-level locking makes
    /// insert-if-absent atomic per player.
    claims: DashMap<PlayerId, HashSet<SlotId>>,
    /// slot → players whose answer is persisted.
    confirmed: DashMap<SlotId, HashSet<PlayerId>>,
    scores: DashMap<PlayerId, i64>,
    /// Score deltas the store has not taken yet.
    unsynced: DashMap<PlayerId, i64>,
}

impl RoomSession {
    /// Builds a session with one slot per question, in the given order.
    ///
    /// # Errors
    /// [`SessionError::NoQuestions`] if `questions` is empty.
    pub fn new(
        room_id: RoomId,
        pin: RoomPin,
        timing: SessionTiming,
        questions: Vec<QuestionRecord>,
    ) -> Result<Self, SessionError> {
        if questions.is_empty() {
            return Err(SessionError::NoQuestions(pin));
        }

        let slots: Vec<QuestionSlot> = questions
            .into_iter()
            .enumerate()
            .map(|(i, q)| QuestionSlot::new(next_slot_id(), i as u32 + 1, q))
            .collect();

        debug!(%pin, %room_id, slots = slots.len(), "session built");

        Ok(Self {
            room_id,
            pin,
            timing,
            slot_count: slots.len(),
            progress: Mutex::new(Progress {
                slots,
                current_index: 0,
                expiry: None,
                followups: Vec::new(),
                finished: false,
            }),
            claims: DashMap::new(),
            confirmed: DashMap::new(),
            scores: DashMap::new(),
            unsynced: DashMap::new(),
        })
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn pin(&self) -> &RoomPin {
        &self.pin
    }

    pub fn timing(&self) -> SessionTiming {
        self.timing
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    // -- Transitions ------------------------------------------------------

    /// Opens the slot at the current index and arms its expiry timer.
    ///
    /// `arm` is called with the freshly opened slot while the room lock is
    /// held; the handle it returns becomes the slot's expiry timer. When no
    /// slots remain the session finishes instead and every pending timer
    /// is cancelled.
    pub async fn open_next<F>(&self, arm: F) -> OpenOutcome
    where
        F: FnOnce(&QuestionSlot) -> TimerHandle,
    {
        let mut progress = self.progress.lock().await;
        if progress.finished {
            return OpenOutcome::Finished;
        }

        let index = progress.current_index;
        let Some(slot) = progress.slots.get_mut(index) else {
            progress.finished = true;
            let cancelled = progress.cancel_all();
            info!(pin = %self.pin, cancelled, "all questions completed");
            return OpenOutcome::Exhausted;
        };

        if !slot.open(Instant::now()) {
            return OpenOutcome::AlreadyOpen(slot.id);
        }
        let opened = slot.clone();
        progress.expiry = Some(arm(&opened));

        info!(
            pin = %self.pin,
            slot_id = %opened.id,
            order = opened.order_num,
            budget_ms = self.timing.question_time.as_millis() as u64,
            "question opened"
        );
        OpenOutcome::Opened(opened)
    }

    /// Closes `slot_id` if it is the open slot, then schedules what comes next.
    ///
    /// Idempotent: timer expiry and the all-answered path may both call this
    /// for the same slot, and only the first call changes anything. On
    /// success the expiry timer is cancelled, the pointer advances by one,
    /// and `then` is called (still under the lock) to schedule the next open.
    pub async fn close_slot<F>(&self, slot_id: SlotId, then: F) -> CloseOutcome
    where
        F: FnOnce() -> TimerHandle,
    {
        let mut progress = self.progress.lock().await;
        if progress.finished {
            return CloseOutcome::NotOpen;
        }

        let index = progress.current_index;
        let Some(slot) = progress.slots.get_mut(index) else {
            return CloseOutcome::NotOpen;
        };
        if slot.id != slot_id || !slot.close(Instant::now()) {
            debug!(pin = %self.pin, %slot_id, "close ignored, slot not open");
            return CloseOutcome::NotOpen;
        }
        let closed = slot.clone();

        if let Some(expiry) = progress.expiry.take() {
            expiry.cancel();
        }
        progress.current_index += 1;
        let next_index = progress.current_index;
        let next = then();
        progress.track(next);

        info!(pin = %self.pin, %slot_id, next_index, "question closed");
        CloseOutcome::Closed {
            slot: closed,
            next_index,
        }
    }

    /// Ends the session early: closes the open slot, cancels every timer.
    ///
    /// Returns `None` if the session had already finished.
    pub async fn finish(&self) -> Option<FinishOutcome> {
        let mut progress = self.progress.lock().await;
        if progress.finished {
            return None;
        }
        progress.finished = true;

        let now = Instant::now();
        let index = progress.current_index;
        let interrupted = progress
            .slots
            .get_mut(index)
            .and_then(|slot| slot.close(now).then_some(slot.id));
        let cancelled_timers = progress.cancel_all();

        info!(pin = %self.pin, ?interrupted, cancelled_timers, "session finished");
        Some(FinishOutcome {
            interrupted,
            cancelled_timers,
        })
    }

    /// Remembers a timer (e.g. an early close) so `finish` can cancel it.
    pub async fn track_timer(&self, handle: TimerHandle) {
        let mut progress = self.progress.lock().await;
        if progress.finished {
            handle.cancel();
            return;
        }
        progress.track(handle);
    }

    // -- Answers ----------------------------------------------------------

    /// Checks that `slot_id` belongs to this room and is open.
    pub async fn check_open(&self, slot_id: SlotId) -> Result<(), Rejection> {
        let progress = self.progress.lock().await;
        let slot = progress.slot(slot_id).ok_or(Rejection::QuestionNotFound)?;
        if !slot.accepts_answers() {
            return Err(Rejection::QuestionClosed);
        }
        Ok(())
    }

    /// Atomically claims the `(player, slot)` pair.
    ///
    /// The slot must be open and `option` one of its choices. The claim is
    /// taken under the room lock, so it cannot land after the slot closed.
    pub async fn reserve_answer(
        &self,
        player_id: PlayerId,
        slot_id: SlotId,
        option: u8,
    ) -> Result<Reservation, Rejection> {
        let progress = self.progress.lock().await;
        let slot = progress.slot(slot_id).ok_or(Rejection::QuestionNotFound)?;
        if !slot.accepts_answers() {
            return Err(Rejection::QuestionClosed);
        }
        if !slot.question.has_option(option) {
            return Err(Rejection::InvalidOption);
        }

        let inserted = self
            .claims
            .entry(player_id)
            .or_default()
            .insert(slot_id);
        if !inserted {
            return Err(Rejection::DuplicateAnswer);
        }

        Ok(Reservation {
            player_id,
            slot_id,
            question: slot.question.clone(),
            elapsed: slot.elapsed(Instant::now()).unwrap_or_default(),
        })
    }

    /// Hands back a reservation whose answer could not be recorded.
    pub fn release_answer(&self, player_id: PlayerId, slot_id: SlotId) {
        if let Some(mut slots) = self.claims.get_mut(&player_id) {
            slots.remove(&slot_id);
        }
    }

    /// Marks a reserved answer as persisted. Returns how many players now
    /// have a confirmed answer for `slot_id`.
    pub fn confirm_answer(&self, player_id: PlayerId, slot_id: SlotId) -> usize {
        let mut players = self.confirmed.entry(slot_id).or_default();
        players.insert(player_id);
        players.len()
    }

    /// `true` once the player's answer to `slot_id` is confirmed.
    pub fn has_answered(&self, player_id: PlayerId, slot_id: SlotId) -> bool {
        self.confirmed
            .get(&slot_id)
            .is_some_and(|players| players.contains(&player_id))
    }

    /// Number of distinct players with a confirmed answer for `slot_id`.
    ///
    /// Claims still waiting on the store are not counted.
    pub fn answered_count(&self, slot_id: SlotId) -> usize {
        self.confirmed.get(&slot_id).map_or(0, |players| players.len())
    }

    /// Adds `points` to the player's total and returns the new total.
    pub fn add_score(&self, player_id: PlayerId, points: i64) -> i64 {
        let mut total = self.scores.entry(player_id).or_insert(0);
        *total += points;
        *total
    }

    /// Every player with an accepted answer, highest score first.
    pub fn scores(&self) -> Vec<(PlayerId, i64)> {
        let mut scores: Vec<(PlayerId, i64)> = self
            .scores
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        scores.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        scores
    }

    /// Remembers points the store failed to record.
    pub fn defer_score(&self, player_id: PlayerId, points: i64) {
        *self.unsynced.entry(player_id).or_insert(0) += points;
    }

    /// Removes and returns every deferred score delta.
    pub fn take_unsynced(&self) -> Vec<(PlayerId, i64)> {
        let players: Vec<PlayerId> = self.unsynced.iter().map(|entry| *entry.key()).collect();
        players
            .into_iter()
            .filter_map(|player_id| self.unsynced.remove(&player_id))
            .filter(|(_, delta)| *delta != 0)
            .collect()
    }

    // -- Queries ----------------------------------------------------------

    pub async fn current_index(&self) -> usize {
        self.progress.lock().await.current_index
    }

    pub async fn is_finished(&self) -> bool {
        self.progress.lock().await.finished
    }

    /// Copy of the slot with the given ID.
    pub async fn slot(&self, slot_id: SlotId) -> Option<QuestionSlot> {
        self.progress.lock().await.slot(slot_id).cloned()
    }

    /// Client-facing view of the slot at the current index.
    ///
    /// `None` once every slot has been played or the session finished.
    pub async fn current_view(&self) -> Option<SlotView> {
        let progress = self.progress.lock().await;
        if progress.finished {
            return None;
        }
        let slot = progress.current()?;
        let is_open = slot.accepts_answers();
        let remaining_ms = match (&progress.expiry, is_open) {
            (Some(expiry), true) => expiry.remaining().as_millis() as u64,
            _ => 0,
        };
        Some(SlotView {
            slot_id: slot.id,
            order_num: slot.order_num,
            total_slots: self.slot_count as u32,
            question_id: slot.question.id,
            text: slot.question.text.clone(),
            options: slot.question.options.clone(),
            is_open,
            remaining_ms,
        })
    }
}

impl std::fmt::Debug for RoomSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSession")
            .field("room_id", &self.room_id)
            .field("pin", &self.pin)
            .field("slot_count", &self.slot_count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quizlive_protocol::QuestionId;
    use quizlive_sched::Scheduler;

    fn questions(n: u64) -> Vec<QuestionRecord> {
        (1..=n)
            .map(|i| QuestionRecord {
                id: QuestionId(i),
                text: format!("question {i}"),
                options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_option: 1,
            })
            .collect()
    }

    fn session(n: u64) -> RoomSession {
        RoomSession::new(
            RoomId(1),
            RoomPin::new("100001"),
            SessionTiming::from_secs(10, false),
            questions(n),
        )
        .unwrap()
    }

    #[test]
    fn test_new_without_questions_fails() {
        let err = RoomSession::new(
            RoomId(1),
            RoomPin::new("100001"),
            SessionTiming::default(),
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::NoQuestions(_)));
    }

    #[test]
    fn test_slots_are_numbered_in_order() {
        let s = session(3);
        assert_eq!(s.slot_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_close_advances_pointer() {
        let timers = Scheduler::default();
        let s = session(2);

        let OpenOutcome::Opened(first) = s
            .open_next(|_| timers.schedule(Duration::from_secs(10), async {}))
            .await
        else {
            panic!("expected first slot to open");
        };
        assert_eq!(first.order_num, 1);
        assert_eq!(s.current_index().await, 0);

        let outcome = s
            .close_slot(first.id, || timers.schedule(Duration::from_secs(2), async {}))
            .await;
        assert!(matches!(outcome, CloseOutcome::Closed { next_index: 1, .. }));
        assert_eq!(s.current_index().await, 1);

        // Expiry of the closed slot was cancelled.
        assert_eq!(timers.metrics().cancelled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_close_is_noop() {
        let timers = Scheduler::default();
        let s = session(2);
        let OpenOutcome::Opened(slot) = s
            .open_next(|_| timers.schedule(Duration::from_secs(10), async {}))
            .await
        else {
            panic!("expected open");
        };

        let first = s.close_slot(slot.id, || timers.schedule(Duration::ZERO, async {})).await;
        let second = s.close_slot(slot.id, || timers.schedule(Duration::ZERO, async {})).await;
        assert!(matches!(first, CloseOutcome::Closed { .. }));
        assert!(matches!(second, CloseOutcome::NotOpen));
        assert_eq!(s.current_index().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_twice_keeps_first_timer() {
        let timers = Scheduler::default();
        let s = session(1);
        s.open_next(|_| timers.schedule(Duration::from_secs(10), async {})).await;
        let again = s
            .open_next(|_| timers.schedule(Duration::from_secs(10), async {}))
            .await;
        assert!(matches!(again, OpenOutcome::AlreadyOpen(_)));
        assert_eq!(timers.metrics().scheduled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_after_last_slot_exhausts() {
        let timers = Scheduler::default();
        let s = session(1);
        let OpenOutcome::Opened(slot) = s
            .open_next(|_| timers.schedule(Duration::from_secs(10), async {}))
            .await
        else {
            panic!("expected open");
        };
        s.close_slot(slot.id, || timers.schedule(Duration::from_secs(2), async {}))
            .await;

        assert!(matches!(
            s.open_next(|_| timers.schedule(Duration::from_secs(10), async {}))
                .await,
            OpenOutcome::Exhausted
        ));
        assert!(s.is_finished().await);
        assert!(s.current_view().await.is_none());
        assert!(matches!(
            s.open_next(|_| timers.schedule(Duration::from_secs(10), async {}))
                .await,
            OpenOutcome::Finished
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reserve_is_exactly_once() {
        let timers = Scheduler::default();
        let s = session(1);
        let OpenOutcome::Opened(slot) = s
            .open_next(|_| timers.schedule(Duration::from_secs(10), async {}))
            .await
        else {
            panic!("expected open");
        };

        let player = PlayerId(7);
        assert!(s.reserve_answer(player, slot.id, 1).await.is_ok());
        assert_eq!(
            s.reserve_answer(player, slot.id, 2).await.unwrap_err(),
            Rejection::DuplicateAnswer
        );
        assert_eq!(s.answered_count(slot.id), 0);
        assert_eq!(s.confirm_answer(player, slot.id), 1);
        assert!(s.has_answered(player, slot.id));
        assert_eq!(s.answered_count(slot.id), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfirmed_claims_do_not_count_as_answered() {
        let timers = Scheduler::default();
        let s = session(1);
        let OpenOutcome::Opened(slot) = s
            .open_next(|_| timers.schedule(Duration::from_secs(10), async {}))
            .await
        else {
            panic!("expected open");
        };

        s.reserve_answer(PlayerId(1), slot.id, 1).await.unwrap();
        s.reserve_answer(PlayerId(2), slot.id, 1).await.unwrap();
        s.confirm_answer(PlayerId(1), slot.id);

        assert_eq!(s.answered_count(slot.id), 1);
        assert!(!s.has_answered(PlayerId(2), slot.id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_allows_retry() {
        let timers = Scheduler::default();
        let s = session(1);
        let OpenOutcome::Opened(slot) = s
            .open_next(|_| timers.schedule(Duration::from_secs(10), async {}))
            .await
        else {
            panic!("expected open");
        };

        let player = PlayerId(7);
        s.reserve_answer(player, slot.id, 1).await.unwrap();
        s.release_answer(player, slot.id);
        assert!(!s.has_answered(player, slot.id));
        assert_eq!(s.answered_count(slot.id), 0);
        assert!(s.reserve_answer(player, slot.id, 1).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reserve_rejections() {
        let timers = Scheduler::default();
        let s = session(2);
        let OpenOutcome::Opened(slot) = s
            .open_next(|_| timers.schedule(Duration::from_secs(10), async {}))
            .await
        else {
            panic!("expected open");
        };

        assert_eq!(
            s.reserve_answer(PlayerId(1), SlotId(u64::MAX), 1)
                .await
                .unwrap_err(),
            Rejection::QuestionNotFound
        );
        assert_eq!(
            s.reserve_answer(PlayerId(1), slot.id, 9).await.unwrap_err(),
            Rejection::InvalidOption
        );

        s.close_slot(slot.id, || timers.schedule(Duration::from_secs(2), async {}))
            .await;
        assert_eq!(
            s.reserve_answer(PlayerId(1), slot.id, 1).await.unwrap_err(),
            Rejection::QuestionClosed
        );
        assert_eq!(s.check_open(slot.id).await, Err(Rejection::QuestionClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_is_measured_from_open() {
        let timers = Scheduler::default();
        let s = session(1);
        let OpenOutcome::Opened(slot) = s
            .open_next(|_| timers.schedule(Duration::from_secs(10), async {}))
            .await
        else {
            panic!("expected open");
        };

        tokio::time::sleep(Duration::from_secs(3)).await;
        let r = s.reserve_answer(PlayerId(1), slot.id, 1).await.unwrap();
        assert_eq!(r.elapsed, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_cancels_everything() {
        let timers = Scheduler::default();
        let s = session(2);
        s.open_next(|_| timers.schedule(Duration::from_secs(10), async {}))
            .await;
        s.track_timer(timers.schedule(Duration::from_secs(1), async {}))
            .await;

        let outcome = s.finish().await.unwrap();
        assert!(outcome.interrupted.is_some());
        assert_eq!(outcome.cancelled_timers, 2);
        assert!(s.finish().await.is_none());

        // Timers offered after finishing are cancelled on the spot.
        let late = timers.schedule(Duration::from_secs(1), async {});
        let late_id = late.id();
        s.track_timer(late).await;
        assert_eq!(timers.metrics().cancelled, 3, "late timer {late_id} not cancelled");
    }

    #[test]
    fn test_scores_accumulate_and_sort() {
        let s = session(1);
        assert_eq!(s.add_score(PlayerId(1), 1), 1);
        assert_eq!(s.add_score(PlayerId(2), 4), 4);
        assert_eq!(s.add_score(PlayerId(1), 2), 3);
        assert_eq!(s.scores(), vec![(PlayerId(2), 4), (PlayerId(1), 3)]);
    }

    #[test]
    fn test_deferred_scores_are_taken_once() {
        let s = session(1);
        s.defer_score(PlayerId(1), 2);
        s.defer_score(PlayerId(1), 3);
        s.defer_score(PlayerId(2), 1);

        let mut pending = s.take_unsynced();
        pending.sort();
        assert_eq!(pending, vec![(PlayerId(1), 5), (PlayerId(2), 1)]);
        assert!(s.take_unsynced().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_current_view_reports_remaining_time() {
        let timers = Scheduler::default();
        let s = session(3);
        s.open_next(|_| timers.schedule(Duration::from_secs(10), async {}))
            .await;
        tokio::time::sleep(Duration::from_secs(4)).await;

        let view = s.current_view().await.unwrap();
        assert_eq!(view.order_num, 1);
        assert_eq!(view.total_slots, 3);
        assert!(view.is_open);
        assert_eq!(view.remaining_ms, 6_000);
        assert_eq!(view.options.len(), 4);
    }
}
