//! Integration tests for timers and the worker pool.
//!
//! Timer tests run with `start_paused = true`, so Tokio auto-advances the
//! clock whenever every task is idle and deadlines resolve instantly.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use quizlive_sched::{PoolConfig, SchedError, Scheduler, SchedulerConfig, WorkerPool};
use tokio::sync::{Barrier, oneshot};

// =========================================================================
// Helpers
// =========================================================================

fn scheduler() -> Scheduler {
    Scheduler::new(SchedulerConfig {
        name: "test-timers".into(),
    })
}

fn pool(workers: usize, queue: usize) -> WorkerPool {
    WorkerPool::new(PoolConfig {
        name: "test-pool".into(),
        workers,
        queue,
    })
}

// =========================================================================
// Scheduler
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_timer_fires_after_delay() {
    let s = scheduler();
    let (tx, rx) = oneshot::channel();
    let start = tokio::time::Instant::now();

    let handle = s.schedule(Duration::from_secs(10), async move {
        let _ = tx.send(tokio::time::Instant::now());
    });
    assert!(handle.is_pending());

    let fired_at = rx.await.unwrap();
    assert_eq!(fired_at - start, Duration::from_secs(10));
    assert!(handle.has_fired());
    assert_eq!(s.metrics().fired, 1);
}

#[tokio::test(start_paused = true)]
async fn test_timer_does_not_fire_early() {
    let s = scheduler();
    let (tx, mut rx) = oneshot::channel::<()>();
    let _handle = s.schedule(Duration::from_secs(10), async move {
        let _ = tx.send(());
    });

    tokio::time::sleep(Duration::from_secs(9)).await;
    assert!(rx.try_recv().is_err(), "timer fired before its deadline");
}

#[tokio::test(start_paused = true)]
async fn test_cancel_prevents_task() {
    let s = scheduler();
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ran);

    let handle = s.schedule(Duration::from_secs(5), async move {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert!(handle.cancel());
    assert!(handle.is_cancelled());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    let m = s.metrics();
    assert_eq!(m.scheduled, 1);
    assert_eq!(m.cancelled, 1);
    assert_eq!(m.fired, 0);
    assert_eq!(m.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_is_idempotent() {
    let s = scheduler();
    let handle = s.schedule(Duration::from_secs(5), async {});
    assert!(handle.cancel());
    assert!(!handle.cancel());
    assert_eq!(s.metrics().cancelled, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_after_fire_returns_false() {
    let s = scheduler();
    let (tx, rx) = oneshot::channel();
    let handle = s.schedule(Duration::from_millis(100), async move {
        let _ = tx.send(());
    });
    rx.await.unwrap();

    assert!(!handle.cancel());
    assert!(handle.has_fired());
}

#[tokio::test(start_paused = true)]
async fn test_running_task_survives_cancel_of_its_own_handle() {
    // The task waits for its own handle, cancels it, then keeps working.
    let s = scheduler();
    let (handle_tx, handle_rx) = oneshot::channel();
    let (done_tx, done_rx) = oneshot::channel();

    let handle = s.schedule(Duration::from_secs(1), async move {
        let own: quizlive_sched::TimerHandle = handle_rx.await.unwrap();
        let cancelled = own.cancel();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let _ = done_tx.send(cancelled);
    });
    handle_tx.send(handle).unwrap();

    assert!(!done_rx.await.unwrap(), "a fired timer must not be cancellable");
}

#[tokio::test(start_paused = true)]
async fn test_remaining_counts_down() {
    let s = scheduler();
    let handle = s.schedule(Duration::from_secs(10), async {});
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(handle.remaining(), Duration::from_secs(6));
    handle.cancel();
}

// =========================================================================
// WorkerPool
// =========================================================================

#[tokio::test]
async fn test_run_returns_job_output() {
    let p = pool(2, 8);
    let value = p.run(async { 21 * 2 }).await.unwrap();
    assert_eq!(value, 42);
    assert_eq!(p.stats().completed, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_bounds_concurrency() {
    let p = Arc::new(pool(3, 64));
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut waits = Vec::new();
    for _ in 0..20 {
        let p = Arc::clone(&p);
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        waits.push(tokio::spawn(async move {
            p.run(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            })
            .await
        }));
    }
    for wait in waits {
        wait.await.unwrap().unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(p.stats().completed, 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_jobs_run_in_parallel() {
    // Two jobs that each wait for the other can only finish if two
    // workers run them at the same time.
    let p = pool(2, 4);
    let barrier = Arc::new(Barrier::new(2));
    let a = Arc::clone(&barrier);
    let b = Arc::clone(&barrier);

    let (ra, rb) = tokio::join!(
        p.run(async move {
            a.wait().await;
        }),
        p.run(async move {
            b.wait().await;
        })
    );
    ra.unwrap();
    rb.unwrap();
}

#[tokio::test]
async fn test_shutdown_rejects_new_work() {
    let p = pool(1, 4);
    p.shutdown();
    p.shutdown();
    assert!(p.is_closed());

    let err = p.run(async {}).await.unwrap_err();
    assert!(matches!(err, SchedError::PoolClosed(_)));
}

#[tokio::test]
async fn test_panicking_job_does_not_kill_worker() {
    let p = pool(1, 4);

    let err = p
        .run(async {
            panic!("boom");
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SchedError::JobDropped(_)));

    // The single worker is still alive.
    assert_eq!(p.run(async { 7 }).await.unwrap(), 7);
    assert_eq!(p.stats().panicked, 1);
}
