//! Two quiz rooms played at the same time by simulated players.
//!
//! Run with `RUST_LOG=debug` to see every transition, or set
//! `QUIZLIVE_GRACE_DELAY_MS` / `QUIZLIVE_SPEED_BONUS` to change pacing.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use quizlive::prelude::*;
use rand::Rng;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

type Engine = GameEngine<Arc<MemoryStore>>;

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

const BANK: &[(&str, &[&str], u8)] = &[
    ("Which planet is closest to the sun?", &["Venus", "Mercury", "Mars", "Earth"], 2),
    ("How many sides does a hexagon have?", &["5", "6", "7", "8"], 2),
    ("What is the chemical symbol for gold?", &["Ag", "Gd", "Au", "Go"], 3),
    ("Which ocean is the largest?", &["Pacific", "Atlantic", "Indian", "Arctic"], 1),
    ("What is 7 × 8?", &["54", "56", "58", "64"], 2),
    ("Which language has ownership and borrowing?", &["Go", "Rust", "Java", "Ruby"], 2),
];

fn seed_rooms(store: &MemoryStore) -> Result<Vec<(RoomPin, Vec<String>)>, EngineError> {
    let ids: Vec<_> = BANK
        .iter()
        .map(|(text, options, correct)| store.add_question(*text, options, *correct))
        .collect();

    let manual = store.create_room(RoomSpec {
        time_per_question: 6,
        selection: Selection::Manual(ids[..3].to_vec()),
    })?;
    let random = store.create_room(RoomSpec {
        time_per_question: 5,
        selection: Selection::Random { count: 4 },
    })?;

    let mut rooms = Vec::new();
    for (room, names) in [
        (manual, vec!["ada", "linus", "grace"]),
        (random, vec!["ken", "barbara"]),
    ] {
        for name in &names {
            store.join_room(&room.pin, name)?;
        }
        rooms.push((room.pin, names.into_iter().map(String::from).collect()));
    }
    Ok(rooms)
}

// ---------------------------------------------------------------------------
// Simulated players
// ---------------------------------------------------------------------------

/// Polls the room and answers every open question once, after a random
/// think time and with a random choice.
async fn play(engine: Engine, pin: RoomPin, name: String) {
    let mut answered = HashSet::new();

    while engine.is_room_active(&pin) {
        if let Some(slot) = engine.current_slot(&pin).await {
            if slot.is_open && !answered.contains(&slot.slot_id) {
                answered.insert(slot.slot_id);
                let think = Duration::from_millis(rand::rng().random_range(300..4_000));
                tokio::time::sleep(think).await;

                let option = rand::rng().random_range(1..=slot.options.len() as u8);
                match engine
                    .submit_answer_by_name(&pin, &name, slot.slot_id, option)
                    .await
                {
                    Ok(AnswerOutcome::Accepted(a)) => {
                        info!(%pin, %name, correct = a.correct, points = a.points, "answered");
                    }
                    Ok(AnswerOutcome::Rejected { reason }) => {
                        info!(%pin, %name, %reason, "answer refused");
                    }
                    Err(err) => warn!(%pin, %name, error = %err, "submission failed"),
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), EngineError> {
    quizlive::init_tracing();

    let store = Arc::new(MemoryStore::new());
    let rooms = seed_rooms(&store)?;
    let config = EngineConfig {
        speed_bonus: true,
        ..EngineConfig::from_env()?
    };
    let engine = GameEngine::new(Arc::clone(&store), config);

    // Print every lifecycle event as it would go over the wire.
    let mut events = engine.subscribe();
    let printer = tokio::spawn(async move {
        let codec = JsonCodec;
        let mut finished = 0;
        loop {
            match events.recv().await {
                Ok(event) => {
                    let done = matches!(event, GameEvent::GameFinished { .. });
                    match codec.encode(&event) {
                        Ok(bytes) => println!("{}", String::from_utf8_lossy(&bytes)),
                        Err(err) => warn!(error = %err, "cannot encode event"),
                    }
                    if done {
                        finished += 1;
                        if finished == 2 {
                            break;
                        }
                    }
                }
                Err(RecvError::Lagged(missed)) => warn!(missed, "event printer lagging"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    for (pin, _) in &rooms {
        engine.start_game(pin).await?;
    }

    let mut players = Vec::new();
    for (pin, names) in &rooms {
        for name in names {
            players.push(tokio::spawn(play(engine.clone(), pin.clone(), name.clone())));
        }
    }
    for player in players {
        if let Err(err) = player.await {
            warn!(error = %err, "player task failed");
        }
    }
    let _ = printer.await;

    for (pin, _) in &rooms {
        println!("\nRoom {pin}");
        for (place, player) in engine.ranking(pin).await?.iter().enumerate() {
            println!("  {}. {:<10} {:>3}", place + 1, player.name, player.score);
        }
    }

    let timers = engine.timer_metrics();
    info!(
        scheduled = timers.scheduled,
        fired = timers.fired,
        cancelled = timers.cancelled,
        answers = engine.answer_pool_stats().completed,
        "done"
    );
    engine.shutdown().await;
    Ok(())
}
