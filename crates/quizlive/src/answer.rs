//! Answer pipeline: everything that happens to one submission.
//!
//! ```text
//! room running? → slot open? → player in room? → reserve (player, slot)
//!   → score → save answer → update score → maybe close early
//! ```
//!
//! Every step before the reservation only reads. The reservation is the one
//! atomic decision; if saving the answer fails afterwards, it is handed
//! back so the player can retry. Only saved answers count towards closing
//! the slot early.

use std::sync::Arc;

use quizlive_protocol::{
    AcceptedAnswer, AnswerOutcome, AnswerRecord, CloseReason, GameEvent, PlayerId, Rejection,
    RoomPin, SlotId,
};
use quizlive_session::{Reservation, RoomSession, scoring};
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::{EngineError, QuizStore};

/// How a submission names its player.
#[derive(Debug, Clone)]
pub(crate) enum PlayerRef {
    Id(PlayerId),
    Name(String),
}

impl<S: QuizStore> Engine<S> {
    pub(crate) async fn process_answer(
        self: &Arc<Self>,
        pin: &RoomPin,
        player: PlayerRef,
        slot_id: SlotId,
        option: u8,
    ) -> Result<AnswerOutcome, EngineError> {
        let Some(session) = self.registry.lookup(pin) else {
            return Ok(reject(Rejection::RoomNotActive, slot_id));
        };
        if let Err(reason) = session.check_open(slot_id).await {
            return Ok(reject(reason, slot_id));
        }
        let Some(player_id) = self.resolve_player(&session, player).await? else {
            return Ok(reject(Rejection::PlayerUnknown, slot_id));
        };

        let reservation = match session.reserve_answer(player_id, slot_id, option).await {
            Ok(reservation) => reservation,
            Err(reason) => return Ok(reject(reason, slot_id)),
        };

        let recorded = self.record(&session, reservation, option).await;
        if session.has_answered(player_id, slot_id) {
            self.close_if_everyone_answered(&session, slot_id).await;
        }
        Ok(AnswerOutcome::Accepted(recorded?))
    }

    /// The player's ID, if they are registered in this session's room.
    async fn resolve_player(
        &self,
        session: &RoomSession,
        player: PlayerRef,
    ) -> Result<Option<PlayerId>, EngineError> {
        let record = match player {
            PlayerRef::Id(id) => self.store.get_player(id).await?,
            PlayerRef::Name(name) => self.store.find_player(session.pin(), &name).await?,
        };
        Ok(record
            .filter(|p| p.room_id == session.room_id())
            .map(|p| p.id))
    }

    /// Scores a reserved answer and mirrors it into the store.
    ///
    /// A failed score update still leaves the answer recorded: the points
    /// are kept in memory and retried against the store when the game ends.
    async fn record(
        &self,
        session: &RoomSession,
        reservation: Reservation,
        option: u8,
    ) -> Result<AcceptedAnswer, EngineError> {
        let Reservation {
            player_id,
            slot_id,
            question,
            elapsed,
        } = reservation;
        let timing = session.timing();
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let correct = question.is_correct(option);
        let points = scoring::score(correct, elapsed_ms, timing.budget_secs(), timing.speed_bonus);

        let answer = AnswerRecord {
            player_id,
            room_id: session.room_id(),
            slot_id,
            question_id: question.id,
            selected_option: option,
            elapsed_ms,
            correct,
            points,
        };
        if let Err(err) = self.store.save_answer(answer).await {
            session.release_answer(player_id, slot_id);
            warn!(%player_id, %slot_id, error = %err, "answer not saved, player may retry");
            return Err(err.into());
        }

        session.confirm_answer(player_id, slot_id);
        let total_score = session.add_score(player_id, points);
        if points != 0 {
            if let Err(err) = self.store.update_player_score(player_id, points).await {
                session.defer_score(player_id, points);
                warn!(%player_id, points, error = %err, "score update failed, deferred");
                return Err(err.into());
            }
        }

        info!(%player_id, %slot_id, correct, points, total_score, elapsed_ms, "answer accepted");
        self.emit(GameEvent::AnswerAccepted {
            pin: session.pin().clone(),
            player_id,
            slot_id,
            correct,
            points,
            total_score,
        });

        Ok(AcceptedAnswer {
            correct,
            points,
            total_score,
        })
    }

    /// Schedules an early close once every player in the room has answered.
    async fn close_if_everyone_answered(
        self: &Arc<Self>,
        session: &Arc<RoomSession>,
        slot_id: SlotId,
    ) {
        let expected = match self.store.count_players(session.room_id()).await {
            Ok(n) => n,
            Err(err) => {
                warn!(error = %err, "cannot count players, leaving close to the timer");
                return;
            }
        };
        let answered = session.answered_count(slot_id);
        if expected == 0 || answered < expected {
            return;
        }

        debug!(%slot_id, answered, expected, "everyone answered");
        let handle = self.timers.schedule(
            self.config.auto_close_delay,
            self.close_task(session, slot_id, CloseReason::AllAnswered),
        );
        session.track_timer(handle).await;
    }
}

fn reject(reason: Rejection, slot_id: SlotId) -> AnswerOutcome {
    debug!(%slot_id, %reason, "answer rejected");
    AnswerOutcome::rejected(reason)
}
