//! `GameEngine`: the entry point that runs every live room.
//!
//! It ties the layers together: the store supplies room records and
//! questions, the session layer holds per-room state, the scheduler drives
//! question expiry and the gaps between questions, and the worker pool
//! processes answer submissions.
//!
//! # Room lifecycle
//!
//! ```text
//! start_game ──→ open slot 0 ──(expiry | everyone answered)──→ close
//!                     ↑                                          │
//!                     └────────────── grace delay ───────────────┘
//!                                        │
//!                         no slots left: finish, deregister
//! ```
//!
//! Timer callbacks hold the session they were armed for, not its PIN, so a
//! callback that outlives its game can never touch a newer game started
//! under the same PIN.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use quizlive_protocol::{
    AnswerOutcome, CloseReason, GameEvent, PlayerId, PlayerRecord, RoomPin, RoomState, SlotId,
    SlotView,
};
use quizlive_sched::{
    PoolConfig, PoolStats, Scheduler, SchedulerConfig, SchedulerMetrics, WorkerPool,
};
use quizlive_session::{CloseOutcome, OpenOutcome, RoomSession, SessionRegistry, SessionTiming};
use tokio::sync::broadcast;
use tracing::{Instrument, Span, debug, info, warn};

use crate::answer::PlayerRef;
use crate::{EngineConfig, EngineError, QuizStore};

/// Span wrapping everything done on behalf of one room.
pub(crate) fn room_span(pin: &RoomPin) -> Span {
    tracing::info_span!("room", %pin)
}

fn not_running(pin: &RoomPin) -> EngineError {
    EngineError::InvalidState(format!("room {pin} is not running"))
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// State shared between the engine handle, timer tasks, and workers.
pub(crate) struct Engine<S> {
    pub(crate) store: S,
    pub(crate) config: EngineConfig,
    pub(crate) registry: SessionRegistry,
    pub(crate) timers: Scheduler,
    pub(crate) answers: WorkerPool,
    events: broadcast::Sender<GameEvent>,
}

impl<S: QuizStore> Engine<S> {
    pub(crate) fn emit(&self, event: GameEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn start_game(self: &Arc<Self>, pin: &RoomPin) -> Result<(), EngineError> {
        let room = self
            .store
            .load_room(pin)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("room {pin}")))?;

        if self.registry.contains(pin) {
            return Err(EngineError::InvalidState(format!(
                "room {pin} already has a running game"
            )));
        }
        if room.state != RoomState::Waiting {
            return Err(EngineError::InvalidState(format!(
                "room {pin} is {}, expected WAITING",
                room.state
            )));
        }

        let questions = self.store.load_selected_questions(room.id).await?;
        if questions.is_empty() {
            warn!(room_id = %room.id, "refusing to start a room without questions");
            return Err(EngineError::Config(format!(
                "room {pin} has no selected questions"
            )));
        }

        let timing = SessionTiming::from_secs(room.time_per_question, self.config.speed_bonus);
        let session = Arc::new(RoomSession::new(room.id, room.pin, timing, questions)?);
        self.registry.register(Arc::clone(&session))?;

        if let Err(err) = self.store.mark_room_state(room.id, RoomState::Running).await {
            session.finish().await;
            self.registry.deregister_if_same(&session);
            return Err(err.into());
        }

        info!(
            room_id = %room.id,
            slots = session.slot_count(),
            budget_secs = timing.budget_secs(),
            speed_bonus = timing.speed_bonus,
            "game started"
        );
        self.emit(GameEvent::GameStarted {
            pin: session.pin().clone(),
            total_slots: session.slot_count() as u32,
        });

        self.open_next(&session).await;
        Ok(())
    }

    /// Opens the session's next slot, or completes the game if none remain.
    pub(crate) async fn open_next(self: &Arc<Self>, session: &Arc<RoomSession>) -> OpenOutcome {
        let outcome = session
            .open_next(|slot| {
                self.emit(GameEvent::SlotOpened {
                    pin: session.pin().clone(),
                    slot_id: slot.id,
                    question_id: slot.question.id,
                    order_num: slot.order_num,
                    time_budget_ms: session.timing().question_time.as_millis() as u64,
                });
                self.timers.schedule(
                    session.timing().question_time,
                    self.close_task(session, slot.id, CloseReason::Timeout),
                )
            })
            .await;

        if let OpenOutcome::Exhausted = outcome {
            self.complete(session).await;
        }
        outcome
    }

    /// Closes `slot_id` if it is open and schedules the next open.
    pub(crate) async fn close_slot(
        self: &Arc<Self>,
        session: &Arc<RoomSession>,
        slot_id: SlotId,
        reason: CloseReason,
    ) -> CloseOutcome {
        let outcome = session
            .close_slot(slot_id, || {
                self.emit(GameEvent::SlotClosed {
                    pin: session.pin().clone(),
                    slot_id,
                    reason,
                });
                self.timers
                    .schedule(self.config.grace_delay, self.open_task(session))
            })
            .await;

        if let CloseOutcome::NotOpen = outcome {
            debug!(%slot_id, ?reason, "close skipped");
        }
        outcome
    }

    /// Ends a session early. Returns `false` if it had already finished.
    async fn finish(&self, session: &Arc<RoomSession>) -> bool {
        let Some(outcome) = session.finish().await else {
            return false;
        };
        if let Some(slot_id) = outcome.interrupted {
            self.emit(GameEvent::SlotClosed {
                pin: session.pin().clone(),
                slot_id,
                reason: CloseReason::Finished,
            });
        }
        self.complete(session).await;
        true
    }

    /// Tears down a session that has reached its terminal state.
    async fn complete(&self, session: &Arc<RoomSession>) {
        self.flush_scores(session).await;
        self.registry.deregister_if_same(session);
        if let Err(err) = self
            .store
            .mark_room_state(session.room_id(), RoomState::Finished)
            .await
        {
            warn!(room_id = %session.room_id(), error = %err, "failed to mark room finished");
        }
        info!(room_id = %session.room_id(), "game finished");
        self.emit(GameEvent::GameFinished {
            pin: session.pin().clone(),
        });
    }

    /// Retries score updates the store refused while the game ran.
    async fn flush_scores(&self, session: &RoomSession) {
        for (player_id, delta) in session.take_unsynced() {
            match self.store.update_player_score(player_id, delta).await {
                Ok(score) => debug!(%player_id, delta, score, "deferred score stored"),
                Err(err) => {
                    warn!(%player_id, delta, error = %err, "deferred score lost");
                }
            }
        }
    }

    // -- Timer tasks ------------------------------------------------------
    //
    // Boxed so that the open → close → open chain has a nameable type.

    pub(crate) fn close_task(
        self: &Arc<Self>,
        session: &Arc<RoomSession>,
        slot_id: SlotId,
        reason: CloseReason,
    ) -> BoxFuture<'static, ()> {
        let engine = Arc::clone(self);
        let session = Arc::clone(session);
        let span = room_span(session.pin());
        async move {
            engine.close_slot(&session, slot_id, reason).await;
        }
        .instrument(span)
        .boxed()
    }

    fn open_task(self: &Arc<Self>, session: &Arc<RoomSession>) -> BoxFuture<'static, ()> {
        let engine = Arc::clone(self);
        let session = Arc::clone(session);
        let span = room_span(session.pin());
        async move {
            engine.open_next(&session).await;
        }
        .instrument(span)
        .boxed()
    }
}

// ---------------------------------------------------------------------------
// Public handle
// ---------------------------------------------------------------------------

/// Runs live quiz games for any number of rooms at once.
///
/// Cheap to clone; clones drive the same rooms. Must be created inside a
/// Tokio runtime.
///
/// # Example
///
/// ```rust,no_run
/// use quizlive::prelude::*;
///
/// # async fn demo() -> Result<(), EngineError> {
/// let store = MemoryStore::new();
/// let q = store.add_question("2 + 2?", &["3", "4"], 2);
/// let room = store.create_room(RoomSpec {
///     time_per_question: 10,
///     selection: Selection::Manual(vec![q]),
/// })?;
/// let ana = store.join_room(&room.pin, "ana")?;
///
/// let engine = GameEngine::new(store, EngineConfig::default());
/// engine.start_game(&room.pin).await?;
///
/// let slot = engine.current_slot(&room.pin).await.expect("game is running");
/// let outcome = engine.submit_answer(&room.pin, ana.id, slot.slot_id, 2).await?;
/// assert!(outcome.is_accepted());
/// # Ok(())
/// # }
/// ```
pub struct GameEngine<S> {
    inner: Arc<Engine<S>>,
}

impl<S> Clone for GameEngine<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: QuizStore> GameEngine<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        let config = config.validated();
        let (events, _) = broadcast::channel(config.event_capacity);
        let timers = Scheduler::new(SchedulerConfig {
            name: "room-timers".to_string(),
        });
        let answers = WorkerPool::new(PoolConfig {
            name: "answers".to_string(),
            workers: config.answer_workers,
            queue: config.answer_queue,
        });

        info!(
            answer_workers = config.answer_workers,
            grace_ms = config.grace_delay.as_millis() as u64,
            auto_close_ms = config.auto_close_delay.as_millis() as u64,
            "engine ready"
        );

        Self {
            inner: Arc::new(Engine {
                store,
                config,
                registry: SessionRegistry::new(),
                timers,
                answers,
                events,
            }),
        }
    }

    /// Starts the game in a WAITING room and opens its first question.
    ///
    /// # Errors
    /// - [`EngineError::NotFound`] if no room has this PIN.
    /// - [`EngineError::InvalidState`] if the room is not WAITING or
    ///   already has a running game.
    /// - [`EngineError::Config`] if the room has no selected questions.
    ///   No session is registered in that case.
    pub async fn start_game(&self, pin: &RoomPin) -> Result<(), EngineError> {
        self.inner.start_game(pin).instrument(room_span(pin)).await
    }

    /// Submits one player's answer to one slot.
    ///
    /// Runs on the answer worker pool; the caller only awaits the result.
    /// A refused answer is `Ok(AnswerOutcome::Rejected { .. })`; `Err` means
    /// the store failed or the engine is shutting down. If the store failed
    /// to save the answer, the player may submit again.
    pub async fn submit_answer(
        &self,
        pin: &RoomPin,
        player_id: PlayerId,
        slot_id: SlotId,
        option: u8,
    ) -> Result<AnswerOutcome, EngineError> {
        self.submit(pin, PlayerRef::Id(player_id), slot_id, option).await
    }

    /// Like [`submit_answer`](Self::submit_answer), naming the player by
    /// their display name in the room.
    pub async fn submit_answer_by_name(
        &self,
        pin: &RoomPin,
        name: &str,
        slot_id: SlotId,
        option: u8,
    ) -> Result<AnswerOutcome, EngineError> {
        self.submit(pin, PlayerRef::Name(name.to_string()), slot_id, option)
            .await
    }

    async fn submit(
        &self,
        pin: &RoomPin,
        player: PlayerRef,
        slot_id: SlotId,
        option: u8,
    ) -> Result<AnswerOutcome, EngineError> {
        let engine = Arc::clone(&self.inner);
        let pin = pin.clone();
        let span = room_span(&pin);
        let job = async move { engine.process_answer(&pin, player, slot_id, option).await };
        self.inner.answers.run(job.instrument(span)).await?
    }

    /// The question currently shown in a room, open or in its grace gap.
    ///
    /// `None` if the room is not running.
    pub async fn current_slot(&self, pin: &RoomPin) -> Option<SlotView> {
        let session = self.inner.registry.lookup(pin)?;
        session.current_view().await
    }

    /// Players of a room by score, highest first, ties by name.
    ///
    /// A running room is ranked by its live scores, a finished one by the
    /// scores in the store.
    pub async fn ranking(&self, pin: &RoomPin) -> Result<Vec<PlayerRecord>, EngineError> {
        let mut players = match self.inner.registry.lookup(pin) {
            Some(session) => {
                let live: HashMap<PlayerId, i64> = session.scores().into_iter().collect();
                let mut players = self.inner.store.list_players(session.room_id()).await?;
                for player in &mut players {
                    player.score = live.get(&player.id).copied().unwrap_or(0);
                }
                players
            }
            None => {
                let room = self
                    .inner
                    .store
                    .load_room(pin)
                    .await?
                    .ok_or_else(|| EngineError::NotFound(format!("room {pin}")))?;
                self.inner.store.list_players(room.id).await?
            }
        };
        players.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
        Ok(players)
    }

    pub fn is_room_active(&self, pin: &RoomPin) -> bool {
        self.inner.registry.contains(pin)
    }

    /// PINs of every room with a running game.
    pub fn active_pins(&self) -> HashSet<RoomPin> {
        self.inner.registry.pins()
    }

    /// Opens the next question of a running room now.
    ///
    /// Normally driven by timers. A no-op ([`OpenOutcome::AlreadyOpen`])
    /// while a question is open.
    pub async fn open_next(&self, pin: &RoomPin) -> Result<OpenOutcome, EngineError> {
        let session = self
            .inner
            .registry
            .lookup(pin)
            .ok_or_else(|| not_running(pin))?;
        Ok(self
            .inner
            .open_next(&session)
            .instrument(room_span(pin))
            .await)
    }

    /// Closes an open question now; the next one follows after the grace
    /// delay. Closing a slot that is not open is a no-op.
    pub async fn close_slot(
        &self,
        pin: &RoomPin,
        slot_id: SlotId,
    ) -> Result<CloseOutcome, EngineError> {
        let session = self
            .inner
            .registry
            .lookup(pin)
            .ok_or_else(|| not_running(pin))?;
        Ok(self
            .inner
            .close_slot(&session, slot_id, CloseReason::Manual)
            .instrument(room_span(pin))
            .await)
    }

    /// Ends a running game immediately, skipping remaining questions.
    ///
    /// # Errors
    /// [`EngineError::InvalidState`] if the room is not running.
    pub async fn finish_game(&self, pin: &RoomPin) -> Result<(), EngineError> {
        let session = self
            .inner
            .registry
            .lookup(pin)
            .ok_or_else(|| not_running(pin))?;
        if self.inner.finish(&session).instrument(room_span(pin)).await {
            Ok(())
        } else {
            Err(not_running(pin))
        }
    }

    /// A stream of lifecycle events for every room.
    ///
    /// Subscribers that fall more than `event_capacity` events behind
    /// observe `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.inner.events.subscribe()
    }

    /// Finishes every running game and stops taking answers.
    pub async fn shutdown(&self) {
        let sessions = self.inner.registry.sessions();
        info!(rooms = sessions.len(), "engine shutting down");
        for session in sessions {
            let span = room_span(session.pin());
            self.inner.finish(&session).instrument(span).await;
        }
        self.inner.answers.shutdown();
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn timer_metrics(&self) -> SchedulerMetrics {
        self.inner.timers.metrics()
    }

    pub fn answer_pool_stats(&self) -> PoolStats {
        self.inner.answers.stats()
    }
}

impl<S> std::fmt::Debug for GameEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameEngine")
            .field("rooms", &self.inner.registry.len())
            .field("answers", &self.inner.answers)
            .finish_non_exhaustive()
    }
}
