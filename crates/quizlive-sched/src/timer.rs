//! One-shot cancellable timers.
//!
//! A [`Scheduler`] runs delayed tasks on the Tokio timer wheel and hands
//! back a [`TimerHandle`] for each one. The handle is what a room session
//! stores so that a question closed early can cancel its pending expiry.
//!
//! # Fire vs. cancel
//!
//! Every timer moves through a tiny state machine held in an atomic:
//!
//! ```text
//! Pending ──deadline──→ Fired      (task runs to completion)
//!    │
//!    └──cancel()──────→ Cancelled  (task never runs)
//! ```
//!
//! Both transitions are a compare-and-swap out of `Pending`, so exactly one
//! of them wins. Once a task has fired, `cancel()` returns `false` and does
//! *not* abort it. A task may therefore cancel its own handle (or one that
//! is about to fire) without tearing itself down halfway through.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::{self, Instant};
use tracing::{debug, trace};

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for a [`Scheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Name used in log lines, e.g. `"timers"`.
    pub name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: "timers".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Counters describing everything a scheduler has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerMetrics {
    /// Timers created.
    pub scheduled: u64,
    /// Timers whose task started running.
    pub fired: u64,
    /// Timers cancelled before their deadline.
    pub cancelled: u64,
}

impl SchedulerMetrics {
    /// Timers neither fired nor cancelled yet.
    pub fn pending(&self) -> u64 {
        self.scheduled.saturating_sub(self.fired + self.cancelled)
    }
}

#[derive(Debug, Default)]
struct Counters {
    next_id: AtomicU64,
    scheduled: AtomicU64,
    fired: AtomicU64,
    cancelled: AtomicU64,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Opaque identifier of one scheduled timer, unique per scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

impl std::fmt::Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T-{}", self.0)
    }
}

/// Handle to a scheduled task.
///
/// Dropping the handle does **not** cancel the timer; call
/// [`cancel`](Self::cancel) explicitly.
#[derive(Debug)]
pub struct TimerHandle {
    id: TimerId,
    deadline: Instant,
    state: Arc<AtomicU8>,
    abort: AbortHandle,
    counters: Arc<Counters>,
}

impl TimerHandle {
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Time left before the deadline; zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Cancels the timer if it has not fired yet.
    ///
    /// Returns `true` if this call prevented the task from running,
    /// `false` if it had already fired or been cancelled.
    pub fn cancel(&self) -> bool {
        let won = self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.abort.abort();
            self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
            trace!(timer = %self.id, "timer cancelled");
        }
        won
    }

    /// `true` until the timer fires or is cancelled.
    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) == PENDING
    }

    /// `true` once the task has started running.
    pub fn has_fired(&self) -> bool {
        self.state.load(Ordering::Acquire) == FIRED
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Shared pool of one-shot timers.
///
/// Cheap to clone; clones share IDs and metrics. Must be used from inside
/// a Tokio runtime, since every timer is a spawned task.
#[derive(Debug, Clone)]
pub struct Scheduler {
    name: Arc<str>,
    counters: Arc<Counters>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        debug!(name = %config.name, "scheduler created");
        Self {
            name: Arc::from(config.name),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Runs `task` once `delay` has elapsed, unless cancelled first.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> TimerHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = TimerId(self.counters.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let deadline = Instant::now() + delay;
        let state = Arc::new(AtomicU8::new(PENDING));

        let task_state = Arc::clone(&state);
        let counters = Arc::clone(&self.counters);
        let join = tokio::spawn(async move {
            time::sleep_until(deadline).await;
            if task_state
                .compare_exchange(PENDING, FIRED, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }
            counters.fired.fetch_add(1, Ordering::Relaxed);
            trace!(timer = %id, "timer fired");
            task.await;
        });

        self.counters.scheduled.fetch_add(1, Ordering::Relaxed);
        trace!(
            scheduler = %self.name,
            timer = %id,
            delay_ms = delay.as_millis() as u64,
            "timer scheduled"
        );

        TimerHandle {
            id,
            deadline,
            state,
            abort: join.abort_handle(),
            counters: Arc::clone(&self.counters),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the scheduler's counters.
    pub fn metrics(&self) -> SchedulerMetrics {
        SchedulerMetrics {
            scheduled: self.counters.scheduled.load(Ordering::Relaxed),
            fired: self.counters.fired.load(Ordering::Relaxed),
            cancelled: self.counters.cancelled.load(Ordering::Relaxed),
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}
