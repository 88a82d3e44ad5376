//! Per-room timing configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Shortest answer window a room may use.
pub const MIN_QUESTION_TIME: Duration = Duration::from_secs(5);

/// Timing and scoring settings fixed for the lifetime of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTiming {
    /// How long each question stays open.
    pub question_time: Duration,
    /// Whether fast answers earn bonus points.
    pub speed_bonus: bool,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            question_time: Duration::from_secs(20),
            speed_bonus: false,
        }
    }
}

impl SessionTiming {
    /// Timing for a room whose record stores the budget in seconds.
    pub fn from_secs(time_per_question: u32, speed_bonus: bool) -> Self {
        Self {
            question_time: Duration::from_secs(u64::from(time_per_question)),
            speed_bonus,
        }
        .validated()
    }

    /// Raise the answer window to [`MIN_QUESTION_TIME`] if shorter.
    pub fn validated(mut self) -> Self {
        if self.question_time < MIN_QUESTION_TIME {
            tracing::warn!(
                requested_ms = self.question_time.as_millis() as u64,
                "question time below minimum, clamping"
            );
            self.question_time = MIN_QUESTION_TIME;
        }
        self
    }

    /// The answer window in whole seconds, as the scoring policy expects.
    pub fn budget_secs(&self) -> u32 {
        u32::try_from(self.question_time.as_secs()).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_secs() {
        let t = SessionTiming::from_secs(10, true);
        assert_eq!(t.question_time, Duration::from_secs(10));
        assert_eq!(t.budget_secs(), 10);
        assert!(t.speed_bonus);
    }

    #[test]
    fn test_short_budget_is_clamped() {
        let t = SessionTiming::from_secs(1, false);
        assert_eq!(t.question_time, MIN_QUESTION_TIME);
    }

    #[test]
    fn test_default() {
        let t = SessionTiming::default();
        assert_eq!(t.budget_secs(), 20);
        assert!(!t.speed_bonus);
    }
}
