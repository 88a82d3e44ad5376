//! A fixed-size pool of async workers fed by a bounded queue.
//!
//! Jobs are boxed futures. `workers` tasks share one receiver and pull
//! jobs in turn, so at most `workers` jobs run at once no matter how many
//! callers submit. The queue is bounded: when it is full, submitters wait
//! (backpressure) instead of growing memory.
//!
//! A panicking job is caught and logged; the worker that ran it keeps going.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tracing::{debug, error, info};

use crate::SchedError;

type Job = BoxFuture<'static, ()>;

/// Configuration for a [`WorkerPool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Name used in log lines and errors.
    pub name: String,
    /// Number of concurrent workers. Clamped to at least 1.
    pub workers: usize,
    /// Capacity of the job queue. Clamped to at least 1.
    pub queue: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "workers".to_string(),
            workers: 10,
            queue: 256,
        }
    }
}

impl PoolConfig {
    /// Fix out-of-range values so the config is safe to use.
    pub fn validated(mut self) -> Self {
        self.workers = self.workers.max(1);
        self.queue = self.queue.max(1);
        self
    }
}

/// Counters for a running pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub workers: usize,
    /// Jobs that ran to completion.
    pub completed: u64,
    /// Jobs that panicked.
    pub panicked: u64,
}

/// Bounded pool of worker tasks.
///
/// Must be created inside a Tokio runtime. Dropping the pool closes the
/// queue; workers finish what they hold and exit.
pub struct WorkerPool {
    name: Arc<str>,
    workers: usize,
    sender: mpsc::Sender<Job>,
    stop: watch::Sender<bool>,
    completed: Arc<AtomicU64>,
    panicked: Arc<AtomicU64>,
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> Self {
        let config = config.validated();
        let name: Arc<str> = Arc::from(config.name);
        let (sender, receiver) = mpsc::channel::<Job>(config.queue);
        let receiver = Arc::new(Mutex::new(receiver));
        let (stop, _) = watch::channel(false);
        let completed = Arc::new(AtomicU64::new(0));
        let panicked = Arc::new(AtomicU64::new(0));

        for index in 0..config.workers {
            tokio::spawn(run_worker(
                Arc::clone(&name),
                index,
                Arc::clone(&receiver),
                stop.subscribe(),
                Arc::clone(&completed),
                Arc::clone(&panicked),
            ));
        }

        info!(
            pool = %name,
            workers = config.workers,
            queue = config.queue,
            "worker pool started"
        );

        Self {
            name,
            workers: config.workers,
            sender,
            stop,
            completed,
            panicked,
        }
    }

    /// Queues a job without waiting for it to run.
    ///
    /// Waits only while the queue is full.
    ///
    /// # Errors
    /// [`SchedError::PoolClosed`] after [`shutdown`](Self::shutdown).
    pub async fn execute<F>(&self, job: F) -> Result<(), SchedError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_closed() {
            return Err(SchedError::PoolClosed(self.name.to_string()));
        }
        self.sender
            .send(job.boxed())
            .await
            .map_err(|_| SchedError::PoolClosed(self.name.to_string()))
    }

    /// Queues a job and waits for its output.
    ///
    /// # Errors
    /// [`SchedError::PoolClosed`] if the pool takes no more work,
    /// [`SchedError::JobDropped`] if the job never finished.
    pub async fn run<F, T>(&self, job: F) -> Result<T, SchedError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.execute(async move {
            let _ = reply_tx.send(job.await);
        })
        .await?;
        reply_rx
            .await
            .map_err(|_| SchedError::JobDropped(self.name.to_string()))
    }

    /// Stops accepting work and tells idle workers to exit.
    ///
    /// Jobs already running finish; queued jobs are dropped. Idempotent.
    pub fn shutdown(&self) {
        if !self.stop.send_replace(true) {
            info!(pool = %self.name, "worker pool shutting down");
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.stop.borrow() || self.sender.is_closed()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self.workers,
            completed: self.completed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("workers", &self.workers)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn run_worker(
    pool: Arc<str>,
    index: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    mut stop: watch::Receiver<bool>,
    completed: Arc<AtomicU64>,
    panicked: Arc<AtomicU64>,
) {
    debug!(%pool, worker = index, "worker started");

    loop {
        let next = tokio::select! {
            biased;
            _ = async { let _ = stop.wait_for(|stopped| *stopped).await; } => None,
            job = async { receiver.lock().await.recv().await } => job,
        };
        let Some(job) = next else { break };

        match AssertUnwindSafe(job).catch_unwind().await {
            Ok(()) => {
                completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                panicked.fetch_add(1, Ordering::Relaxed);
                error!(%pool, worker = index, "job panicked");
            }
        }
    }

    debug!(%pool, worker = index, "worker stopped");
}
