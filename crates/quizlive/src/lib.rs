//! # QuizLive
//!
//! Concurrency core for live multi-room quiz games.
//!
//! QuizLive sequences timed questions inside any number of simultaneous
//! rooms, takes player answers from concurrent callers, accepts at most one
//! answer per player per question, and closes each question when its time
//! runs out or everyone in the room has answered.
//!
//! Storage is yours: implement [`QuizStore`] over your database (or use
//! [`MemoryStore`]) and hand it to a [`GameEngine`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use quizlive::prelude::*;
//!
//! # async fn run() -> Result<(), EngineError> {
//! quizlive::init_tracing();
//!
//! let store = MemoryStore::new();
//! // ... add questions, create a room, join players ...
//! let engine = GameEngine::new(store, EngineConfig::from_env()?);
//! let mut events = engine.subscribe();
//! // engine.start_game(&pin).await?;
//! # Ok(())
//! # }
//! ```

mod answer;
mod config;
mod engine;
mod error;
mod logging;
mod memory;
mod store;

pub use config::{ENV_PREFIX, EngineConfig};
pub use engine::GameEngine;
pub use error::{EngineError, ErrorKind};
pub use logging::init_tracing;
pub use memory::{MemoryStore, RoomSpec, Selection};
pub use store::{QuizStore, StoreError, StoreResult};

pub use quizlive_protocol as protocol;
pub use quizlive_sched as sched;
pub use quizlive_session as session;

pub mod prelude {
    pub use crate::{
        EngineConfig, EngineError, ErrorKind, GameEngine, MemoryStore, QuizStore, RoomSpec,
        Selection, StoreError,
    };
    pub use quizlive_protocol::{
        AcceptedAnswer, AnswerOutcome, CloseReason, Codec, GameEvent, JsonCodec, PlayerId,
        PlayerRecord, Rejection, RoomPin, RoomState, SlotId, SlotView,
    };
    pub use quizlive_session::{CloseOutcome, OpenOutcome};
}
