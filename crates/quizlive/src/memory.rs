//! An in-process [`QuizStore`] for tests, demos, and single-node setups.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use quizlive_protocol::{
    AnswerRecord, PlayerId, PlayerRecord, QuestionId, QuestionRecord, RoomId, RoomPin, RoomRecord,
    RoomState, SlotId,
};
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::{QuizStore, StoreError, StoreResult};

/// Number of distinct 4-digit PINs.
const PIN_SPACE: u32 = 10_000;

/// Random draws before giving up on finding a free PIN.
const PIN_ATTEMPTS: usize = 1_000;

/// How the questions of a new room are picked from the bank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Exactly these questions, in this order.
    Manual(Vec<QuestionId>),
    /// `count` questions drawn at random from the whole bank.
    Random { count: usize },
}

/// Everything needed to create a room.
#[derive(Debug, Clone)]
pub struct RoomSpec {
    /// Seconds each question stays open.
    pub time_per_question: u32,
    pub selection: Selection,
}

/// Thread-safe in-memory store.
///
/// Rooms, players, and answers live in concurrent maps. Answers are keyed
/// by `(PlayerId, SlotId)`, so a second save for the same pair fails with
/// [`StoreError::Duplicate`] the way a unique index would.
///
/// Failures can be injected with [`fail_next_saves`](Self::fail_next_saves)
/// and [`fail_next_score_updates`](Self::fail_next_score_updates).
#[derive(Debug, Default)]
pub struct MemoryStore {
    next_id: AtomicU64,
    questions: DashMap<QuestionId, QuestionRecord>,
    rooms: DashMap<RoomPin, RoomRecord>,
    selections: DashMap<RoomId, Vec<QuestionId>>,
    players: DashMap<PlayerId, PlayerRecord>,
    /// (room, display name) → player, the unique index on names.
    names: DashMap<(RoomId, String), PlayerId>,
    answers: DashMap<(PlayerId, SlotId), AnswerRecord>,
    failing_saves: AtomicUsize,
    failing_score_updates: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    // -- Setup ------------------------------------------------------------

    /// Adds a question to the bank. `correct_option` is 1-based.
    pub fn add_question(
        &self,
        text: impl Into<String>,
        options: &[&str],
        correct_option: u8,
    ) -> QuestionId {
        let id = QuestionId(self.next_id());
        self.questions.insert(
            id,
            QuestionRecord {
                id,
                text: text.into(),
                options: options.iter().map(|o| o.to_string()).collect(),
                correct_option,
            },
        );
        id
    }

    /// Creates a WAITING room with a fresh PIN and selects its questions.
    ///
    /// # Errors
    /// - [`StoreError::Missing`] if a manual selection names an unknown question.
    /// - [`StoreError::Rejected`] if a random selection asks for more
    ///   questions than the bank holds.
    /// - [`StoreError::Unavailable`] if every PIN is taken.
    pub fn create_room(&self, spec: RoomSpec) -> StoreResult<RoomRecord> {
        let selected = self.select_questions(&spec.selection)?;
        let id = RoomId(self.next_id());
        self.selections.insert(id, selected);

        let mut rng = rand::rng();
        for _ in 0..PIN_ATTEMPTS {
            let pin = RoomPin::new(format!("{:04}", rng.random_range(0..PIN_SPACE)));
            if let Entry::Vacant(entry) = self.rooms.entry(pin.clone()) {
                let room = RoomRecord {
                    id,
                    pin,
                    state: RoomState::Waiting,
                    time_per_question: spec.time_per_question,
                };
                entry.insert(room.clone());
                info!(pin = %room.pin, room_id = %room.id, "room created");
                return Ok(room);
            }
        }

        self.selections.remove(&id);
        Err(StoreError::Unavailable("no free room PIN".into()))
    }

    /// Registers a player in a WAITING room.
    ///
    /// # Errors
    /// - [`StoreError::Missing`] if no room has this PIN.
    /// - [`StoreError::Rejected`] if the room already started.
    /// - [`StoreError::Duplicate`] if the name is taken in this room.
    pub fn join_room(&self, pin: &RoomPin, name: &str) -> StoreResult<PlayerRecord> {
        let room = self
            .rooms
            .get(pin)
            .map(|r| r.value().clone())
            .ok_or_else(|| StoreError::Missing(format!("room {pin}")))?;
        if room.state != RoomState::Waiting {
            return Err(StoreError::Rejected(format!(
                "room {pin} is not accepting new players"
            )));
        }
        let Entry::Vacant(claim) = self.names.entry((room.id, name.to_string())) else {
            return Err(StoreError::Duplicate(format!(
                "player name {name:?} in room {pin}"
            )));
        };

        let player = PlayerRecord {
            id: PlayerId(self.next_id()),
            room_id: room.id,
            name: name.to_string(),
            score: 0,
        };
        claim.insert(player.id);
        self.players.insert(player.id, player.clone());
        debug!(%pin, player_id = %player.id, name, "player joined");
        Ok(player)
    }

    // -- Inspection -------------------------------------------------------

    pub fn room(&self, pin: &RoomPin) -> Option<RoomRecord> {
        self.rooms.get(pin).map(|r| r.value().clone())
    }

    /// Every answer recorded for a room, in slot order.
    pub fn answers(&self, room_id: RoomId) -> Vec<AnswerRecord> {
        let mut answers: Vec<AnswerRecord> = self
            .answers
            .iter()
            .filter(|a| a.room_id == room_id)
            .map(|a| a.value().clone())
            .collect();
        answers.sort_by_key(|a| (a.slot_id, a.player_id));
        answers
    }

    // -- Failure injection ------------------------------------------------

    /// Makes the next `n` calls to `save_answer` fail.
    pub fn fail_next_saves(&self, n: usize) {
        self.failing_saves.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` calls to `update_player_score` fail.
    pub fn fail_next_score_updates(&self, n: usize) {
        self.failing_score_updates.store(n, Ordering::SeqCst);
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    // -- Helpers ----------------------------------------------------------

    fn select_questions(&self, selection: &Selection) -> StoreResult<Vec<QuestionId>> {
        match selection {
            Selection::Manual(ids) => {
                if let Some(missing) = ids.iter().find(|id| !self.questions.contains_key(*id)) {
                    return Err(StoreError::Missing(format!("question {missing}")));
                }
                Ok(ids.clone())
            }
            Selection::Random { count } => {
                let mut bank: Vec<QuestionId> = self.questions.iter().map(|q| *q.key()).collect();
                if *count > bank.len() {
                    return Err(StoreError::Rejected(format!(
                        "{count} questions requested, bank holds {}",
                        bank.len()
                    )));
                }
                bank.sort();
                bank.shuffle(&mut rand::rng());
                bank.truncate(*count);
                Ok(bank)
            }
        }
    }
}

impl QuizStore for MemoryStore {
    async fn load_room(&self, pin: &RoomPin) -> StoreResult<Option<RoomRecord>> {
        Ok(self.room(pin))
    }

    async fn load_selected_questions(&self, room_id: RoomId) -> StoreResult<Vec<QuestionRecord>> {
        let Some(ids) = self.selections.get(&room_id).map(|s| s.value().clone()) else {
            return Err(StoreError::Missing(format!("room {room_id}")));
        };
        ids.iter()
            .map(|id| {
                self.questions
                    .get(id)
                    .map(|q| q.value().clone())
                    .ok_or_else(|| StoreError::Missing(format!("question {id}")))
            })
            .collect()
    }

    async fn save_answer(&self, answer: AnswerRecord) -> StoreResult<()> {
        if Self::take_failure(&self.failing_saves) {
            return Err(StoreError::Unavailable("injected save failure".into()));
        }
        match self.answers.entry((answer.player_id, answer.slot_id)) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(format!(
                "answer of {} to {}",
                answer.player_id, answer.slot_id
            ))),
            Entry::Vacant(entry) => {
                entry.insert(answer);
                Ok(())
            }
        }
    }

    async fn update_player_score(&self, player_id: PlayerId, delta: i64) -> StoreResult<i64> {
        if Self::take_failure(&self.failing_score_updates) {
            return Err(StoreError::Unavailable("injected score failure".into()));
        }
        let mut player = self
            .players
            .get_mut(&player_id)
            .ok_or_else(|| StoreError::Missing(format!("player {player_id}")))?;
        player.score += delta;
        Ok(player.score)
    }

    async fn mark_room_state(&self, room_id: RoomId, state: RoomState) -> StoreResult<()> {
        let mut room = self
            .rooms
            .iter_mut()
            .find(|r| r.id == room_id)
            .ok_or_else(|| StoreError::Missing(format!("room {room_id}")))?;
        if room.state == state {
            return Ok(());
        }
        if !room.state.can_transition_to(state) {
            return Err(StoreError::InvalidTransition {
                room: room_id,
                from: room.state,
                to: state,
            });
        }
        room.state = state;
        Ok(())
    }

    async fn count_players(&self, room_id: RoomId) -> StoreResult<usize> {
        Ok(self.players.iter().filter(|p| p.room_id == room_id).count())
    }

    async fn find_player(&self, pin: &RoomPin, name: &str) -> StoreResult<Option<PlayerRecord>> {
        let Some(room_id) = self.rooms.get(pin).map(|r| r.id) else {
            return Ok(None);
        };
        let Some(player_id) = self.names.get(&(room_id, name.to_string())).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.players.get(&player_id).map(|p| p.value().clone()))
    }

    async fn get_player(&self, player_id: PlayerId) -> StoreResult<Option<PlayerRecord>> {
        Ok(self.players.get(&player_id).map(|p| p.value().clone()))
    }

    async fn list_players(&self, room_id: RoomId) -> StoreResult<Vec<PlayerRecord>> {
        Ok(self
            .players
            .iter()
            .filter(|p| p.room_id == room_id)
            .map(|p| p.value().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn store_with_bank(n: usize) -> (MemoryStore, Vec<QuestionId>) {
        let store = MemoryStore::new();
        let ids = (0..n)
            .map(|i| store.add_question(format!("q{i}"), &["yes", "no"], 1))
            .collect();
        (store, ids)
    }

    #[test]
    fn test_pins_are_four_digits() {
        let (store, _) = store_with_bank(1);
        let room = store
            .create_room(RoomSpec {
                time_per_question: 10,
                selection: Selection::Random { count: 1 },
            })
            .unwrap();
        assert_eq!(room.pin.as_str().len(), 4);
        assert!(room.pin.as_str().chars().all(|c| c.is_ascii_digit()));
        assert_eq!(room.state, RoomState::Waiting);
    }

    #[tokio::test]
    async fn test_manual_selection_keeps_order() {
        let (store, ids) = store_with_bank(3);
        let order = vec![ids[2], ids[0]];
        let room = store
            .create_room(RoomSpec {
                time_per_question: 10,
                selection: Selection::Manual(order.clone()),
            })
            .unwrap();

        let questions = store.load_selected_questions(room.id).await.unwrap();
        let loaded: Vec<QuestionId> = questions.iter().map(|q| q.id).collect();
        assert_eq!(loaded, order);
    }

    #[tokio::test]
    async fn test_random_selection_picks_distinct_questions() {
        let (store, _) = store_with_bank(5);
        let room = store
            .create_room(RoomSpec {
                time_per_question: 10,
                selection: Selection::Random { count: 3 },
            })
            .unwrap();

        let questions = store.load_selected_questions(room.id).await.unwrap();
        let distinct: HashSet<QuestionId> = questions.iter().map(|q| q.id).collect();
        assert_eq!(distinct.len(), 3);
    }

    #[test]
    fn test_random_selection_larger_than_bank_fails() {
        let (store, _) = store_with_bank(2);
        let err = store
            .create_room(RoomSpec {
                time_per_question: 10,
                selection: Selection::Random { count: 3 },
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_join_rules() {
        let (store, _) = store_with_bank(1);
        let room = store
            .create_room(RoomSpec {
                time_per_question: 10,
                selection: Selection::Random { count: 1 },
            })
            .unwrap();

        let ana = store.join_room(&room.pin, "ana").unwrap();
        assert!(matches!(
            store.join_room(&room.pin, "ana"),
            Err(StoreError::Duplicate(_))
        ));
        assert_eq!(store.count_players(room.id).await.unwrap(), 1);
        assert_eq!(
            store.find_player(&room.pin, "ana").await.unwrap(),
            Some(ana)
        );

        store
            .mark_room_state(room.id, RoomState::Running)
            .await
            .unwrap();
        assert!(matches!(
            store.join_room(&room.pin, "bo"),
            Err(StoreError::Rejected(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_joins_claim_a_name_once() {
        let (store, _) = store_with_bank(1);
        let store = std::sync::Arc::new(store);
        let room = store
            .create_room(RoomSpec {
                time_per_question: 10,
                selection: Selection::Random { count: 1 },
            })
            .unwrap();

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let store = std::sync::Arc::clone(&store);
            let pin = room.pin.clone();
            tasks.push(tokio::spawn(async move { store.join_room(&pin, "ana") }));
        }

        let mut joined = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => joined += 1,
                Err(StoreError::Duplicate(_)) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(joined, 1);
        assert_eq!(store.count_players(room.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_room_state_transitions() {
        let (store, _) = store_with_bank(1);
        let room = store
            .create_room(RoomSpec {
                time_per_question: 10,
                selection: Selection::Random { count: 1 },
            })
            .unwrap();

        let err = store
            .mark_room_state(room.id, RoomState::Finished)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));

        store.mark_room_state(room.id, RoomState::Running).await.unwrap();
        store.mark_room_state(room.id, RoomState::Finished).await.unwrap();
        assert_eq!(store.room(&room.pin).unwrap().state, RoomState::Finished);
    }

    #[tokio::test]
    async fn test_answers_are_unique_per_player_and_slot() {
        let store = MemoryStore::new();
        let answer = AnswerRecord {
            player_id: PlayerId(1),
            room_id: RoomId(1),
            slot_id: SlotId(1),
            question_id: QuestionId(1),
            selected_option: 1,
            elapsed_ms: 100,
            correct: true,
            points: 1,
        };
        store.save_answer(answer.clone()).await.unwrap();
        assert!(matches!(
            store.save_answer(answer).await,
            Err(StoreError::Duplicate(_))
        ));
        assert_eq!(store.answers(RoomId(1)).len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = MemoryStore::new();
        store.fail_next_score_updates(1);
        assert!(store.update_player_score(PlayerId(1), 1).await.is_err());
        // Second call reaches the lookup and fails on the unknown player instead.
        assert!(matches!(
            store.update_player_score(PlayerId(1), 1).await,
            Err(StoreError::Missing(_))
        ));
    }
}
