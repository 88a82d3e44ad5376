//! Engine-wide configuration.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::EngineError;

/// Prefix of every environment override read by [`EngineConfig::from_env`].
pub const ENV_PREFIX: &str = "QUIZLIVE_";

/// Settings shared by every room an engine runs.
///
/// Per-room timing comes from the room record; everything here is the
/// same for all rooms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Workers processing answer submissions.
    pub answer_workers: usize,

    /// Submissions that may wait for a worker before callers block.
    pub answer_queue: usize,

    /// Pause between a question closing and the next one opening.
    pub grace_delay: Duration,

    /// Delay before closing a question everyone has answered.
    pub auto_close_delay: Duration,

    /// Whether fast correct answers earn bonus points.
    pub speed_bonus: bool,

    /// Lifecycle events buffered per subscriber before it starts lagging.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            answer_workers: 10,
            answer_queue: 256,
            grace_delay: Duration::from_secs(2),
            auto_close_delay: Duration::from_secs(1),
            speed_bonus: false,
            event_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Fix out-of-range values so the config is safe to use.
    pub fn validated(mut self) -> Self {
        if self.answer_workers == 0 {
            warn!("answer_workers is 0, using 1");
            self.answer_workers = 1;
        }
        self.answer_queue = self.answer_queue.max(1);
        self.event_capacity = self.event_capacity.max(1);
        self
    }

    /// Defaults overridden by `QUIZLIVE_*` environment variables.
    ///
    /// | variable                       | field              |
    /// |--------------------------------|--------------------|
    /// | `QUIZLIVE_ANSWER_WORKERS`      | `answer_workers`   |
    /// | `QUIZLIVE_ANSWER_QUEUE`        | `answer_queue`     |
    /// | `QUIZLIVE_GRACE_DELAY_MS`      | `grace_delay`      |
    /// | `QUIZLIVE_AUTO_CLOSE_DELAY_MS` | `auto_close_delay` |
    /// | `QUIZLIVE_SPEED_BONUS`         | `speed_bonus`      |
    /// | `QUIZLIVE_EVENT_CAPACITY`      | `event_capacity`   |
    ///
    /// # Errors
    /// [`EngineError::Config`] if a variable is set but does not parse.
    pub fn from_env() -> Result<Self, EngineError> {
        Self::from_lookup(|key| env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Like [`from_env`](Self::from_env), reading from `lookup` instead.
    ///
    /// `lookup` receives the variable name without the prefix.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(v) = read("ANSWER_WORKERS") {
            config.answer_workers = parse("ANSWER_WORKERS", &v)?;
        }
        if let Some(v) = read("ANSWER_QUEUE") {
            config.answer_queue = parse("ANSWER_QUEUE", &v)?;
        }
        if let Some(v) = read("GRACE_DELAY_MS") {
            config.grace_delay = Duration::from_millis(parse("GRACE_DELAY_MS", &v)?);
        }
        if let Some(v) = read("AUTO_CLOSE_DELAY_MS") {
            config.auto_close_delay = Duration::from_millis(parse("AUTO_CLOSE_DELAY_MS", &v)?);
        }
        if let Some(v) = read("SPEED_BONUS") {
            config.speed_bonus = parse("SPEED_BONUS", &v)?;
        }
        if let Some(v) = read("EVENT_CAPACITY") {
            config.event_capacity = parse("EVENT_CAPACITY", &v)?;
        }

        Ok(config.validated())
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T, EngineError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|err| {
        EngineError::Config(format!("{ENV_PREFIX}{key}={value:?} is invalid: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.answer_workers, 10);
        assert_eq!(cfg.grace_delay, Duration::from_secs(2));
        assert_eq!(cfg.auto_close_delay, Duration::from_secs(1));
        assert!(!cfg.speed_bonus);
    }

    #[test]
    fn test_validated_clamps_zeroes() {
        let cfg = EngineConfig {
            answer_workers: 0,
            answer_queue: 0,
            event_capacity: 0,
            ..EngineConfig::default()
        }
        .validated();
        assert_eq!(cfg.answer_workers, 1);
        assert_eq!(cfg.answer_queue, 1);
        assert_eq!(cfg.event_capacity, 1);
    }

    #[test]
    fn test_lookup_overrides() {
        let cfg = EngineConfig::from_lookup(lookup(&[
            ("ANSWER_WORKERS", "4"),
            ("GRACE_DELAY_MS", "500"),
            ("SPEED_BONUS", "true"),
            ("EVENT_CAPACITY", " "),
        ]))
        .unwrap();
        assert_eq!(cfg.answer_workers, 4);
        assert_eq!(cfg.grace_delay, Duration::from_millis(500));
        assert!(cfg.speed_bonus);
        assert_eq!(cfg.event_capacity, 256, "blank values are ignored");
    }

    #[test]
    fn test_unparsable_value_is_config_error() {
        let err = EngineConfig::from_lookup(lookup(&[("ANSWER_QUEUE", "lots")])).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        assert!(err.to_string().contains("QUIZLIVE_ANSWER_QUEUE"));
    }
}
