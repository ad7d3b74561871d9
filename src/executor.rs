mod api;
mod control;
mod round;
mod workers;

pub use crate::executor::api::ExecuteHandle;
/// Error returned by `Executor::run` when the worker pool cannot be built.
pub use crate::executor::workers::ExecutorError;
use crate::{
    config::ExecutorConfig,
    context::ContextPool,
    executor::{round::Run, workers::WorkerPool},
    operator::Operator,
    stats::{RunSummary, StatsSink},
    types::{OperatorOrder, TaskOf},
};
use derive_more::Debug;
use rayon::iter::IntoParallelIterator;
use tracing::{info, info_span};

/// Speculative, priority-ordered parallel executor.
///
/// Tasks run in rounds. Every round admits a batch of the highest-priority
/// pending tasks and processes it in parallel:
/// - Neighborhood expansion: each task claims its resources through
///   `NeighborhoodApi::acquire`. A conflict is always won by the
///   higher-priority task, so after the phase every resource belongs to its
///   best contender and a task is a *source* iff it holds everything it asked
///   for.
/// - Optional execute phase (`with_execute`): a read-only pass over the
///   sources.
/// - Operator phase: sources are applied and commit; everything else is rolled
///   back and retried next round. Tasks produced by a commit are scheduled only
///   then.
///
/// The batch size adapts to the observed commit ratio. See
/// `ExecutorConfig::with_target_commit_ratio`.
#[must_use]
#[derive(Debug)]
pub struct Executor<'r, O: Operator> {
    #[debug(skip)]
    op: &'r O,
    config: ExecutorConfig,
    #[debug(skip)]
    phases: Phases<'r, TaskOf<O>>,
    #[debug(skip)]
    sink: Option<Box<dyn StatsSink + 'r>>,
}

/// Which phases a round runs, fixed at construction.
pub(crate) enum Phases<'r, T> {
    Stable,
    Unstable {
        execute: Box<dyn Fn(&T, &ExecuteHandle<'_, T>) + Send + Sync + 'r>,
    },
}

impl<'r, O: Operator> Executor<'r, O> {
    /// Stable executor: neighborhood expansion followed by the operator.
    pub fn new(op: &'r O, config: ExecutorConfig) -> Self {
        Self {
            op,
            config,
            phases: Phases::Stable,
            sink: None,
        }
    }

    /// Unstable executor: `execute` runs over every source of a round between
    /// neighborhood expansion and the operator, and `NeighborhoodApi` exposes
    /// the tasks of the whole round. `execute` gets the same view through its
    /// `ExecuteHandle`.
    pub fn with_execute(
        op: &'r O,
        config: ExecutorConfig,
        execute: impl Fn(&TaskOf<O>, &ExecuteHandle<'_, TaskOf<O>>) + Send + Sync + 'r,
    ) -> Self {
        Self {
            op,
            config,
            phases: Phases::Unstable {
                execute: Box::new(execute),
            },
            sink: None,
        }
    }

    /// Report per-round statistics to `sink`.
    pub fn with_stats_sink(mut self, sink: impl StatsSink + 'r) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Configuration of this executor.
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Process `initial` and every task it transitively produces.
    ///
    /// Returns once no work is left. Every task is committed exactly once;
    /// every resource claimed through the executor is free again.
    ///
    /// # Errors
    /// If `ExecutorConfig::threads` is set and the dedicated pool cannot be
    /// started.
    ///
    /// # Panics
    /// Panics raised by the operator or the execute function propagate.
    pub fn run<I>(&self, initial: I) -> Result<RunSummary, ExecutorError>
    where
        I: IntoParallelIterator<Item = TaskOf<O>> + Send,
    {
        let workers = WorkerPool::new(self.config.threads(), self.config.loopname())?;
        let span = info_span!("ordered_run", loopname = %self.config.loopname());
        let summary = workers.install(|| {
            span.in_scope(|| {
                let threads = rayon::current_num_threads();
                let cmp = OperatorOrder(self.op);
                let pool = ContextPool::new(threads);
                let mut run = Run::new(self, &cmp, &pool, threads);
                run.fill(initial);
                let summary = run.drive();
                assert_eq!(pool.outstanding(), 0, "Executor::run: [1]");
                info!(
                    rounds = summary.rounds,
                    commits = summary.committed,
                    total = summary.attempted,
                    efficiency = summary.efficiency(),
                    avg_parallelism = summary.avg_parallelism(),
                    "run finished"
                );
                summary
            })
        });
        Ok(summary)
    }
}

/// Process `initial` with a stable executor built from `op` and `config`.
///
/// Shorthand for `Executor::new(op, config).run(initial)`.
///
/// # Errors
/// See `Executor::run`.
pub fn for_each_ordered<O, I>(
    initial: I,
    op: &O,
    config: ExecutorConfig,
) -> Result<RunSummary, ExecutorError>
where
    O: Operator,
    I: IntoParallelIterator<Item = TaskOf<O>> + Send,
{
    Executor::new(op, config).run(initial)
}
