//! Error types for the scheduling layer.

/// Errors raised by the [`WorkerPool`](crate::WorkerPool).
#[derive(Debug, thiserror::Error)]
pub enum SchedError {
    /// The pool was shut down (or dropped) and takes no more work.
    #[error("worker pool {0} is closed")]
    PoolClosed(String),

    /// The job was accepted but never produced a result: the pool stopped
    /// before running it, or the job panicked.
    #[error("job on worker pool {0} was dropped before completing")]
    JobDropped(String),
}
