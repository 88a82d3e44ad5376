//! Scoring policy: correctness and answer speed to points.
//!
//! ```text
//! incorrect                       → 0
//! correct, no speed bonus         → 1
//! correct, bonus, r < 0.25        → 1 + 3
//! correct, bonus, 0.25 ≤ r < 0.50 → 1 + 2
//! correct, bonus, 0.50 ≤ r < 0.75 → 1 + 1
//! correct, bonus, r ≥ 0.75        → 1
//! ```
//!
//! where `r = elapsed_ms / (budget_secs × 1000)`.

/// Points for any correct answer.
pub const BASE_POINTS: i64 = 1;

/// Speed bonus tiers as `(ratio upper bound, bonus)`, checked in order.
const SPEED_TIERS: [(f64, i64); 3] = [(0.25, 3), (0.50, 2), (0.75, 1)];

/// Computes the points earned by one answer.
///
/// A zero `budget_secs` never earns a speed bonus.
pub fn score(correct: bool, elapsed_ms: u64, budget_secs: u32, speed_bonus: bool) -> i64 {
    if !correct {
        return 0;
    }
    if !speed_bonus || budget_secs == 0 {
        return BASE_POINTS;
    }
    BASE_POINTS + speed_bonus_for(elapsed_ms as f64 / (f64::from(budget_secs) * 1000.0))
}

fn speed_bonus_for(ratio: f64) -> i64 {
    SPEED_TIERS
        .iter()
        .find(|(bound, _)| ratio < *bound)
        .map_or(0, |(_, bonus)| *bonus)
}
