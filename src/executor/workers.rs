use core::num::NonZeroUsize;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use thiserror::Error;

/// Error returned by `Executor::run` before any task is attempted.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExecutorError {
    /// The dedicated worker pool requested through `ExecutorConfig::threads`
    /// could not be started.
    #[error("failed to build the worker pool: {0}")]
    WorkerPool(#[from] ThreadPoolBuildError),
}

/// Threads a run executes on.
#[derive(Debug)]
pub(super) enum WorkerPool {
    /// Whatever rayon pool the caller is in, the global one by default.
    Ambient,
    Dedicated(ThreadPool),
}

impl WorkerPool {
    pub(super) fn new(threads: Option<NonZeroUsize>, loopname: &str) -> Result<Self, ExecutorError> {
        let Some(threads) = threads else {
            return Ok(Self::Ambient);
        };
        let prefix = loopname.to_owned();
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.get())
            .thread_name(move |idx| format!("{prefix}-{idx}"))
            .build()?;
        Ok(Self::Dedicated(pool))
    }

    /// Run `f` with this pool as the current rayon pool.
    pub(super) fn install<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        match self {
            Self::Ambient => f(),
            Self::Dedicated(pool) => pool.install(f),
        }
    }
}
