use crate::lockable::Lockable;
use core::cmp::Ordering;
use thiserror::Error;

/// Signal that a task attempt lost a resource to another in-flight task.
///
/// Returned from `Operator::neighborhood` or `Operator::apply` when the
/// operator itself finds the attempt unsafe to commit. The executor cancels
/// the attempt and retries the task in a later round; it never reaches the
/// caller of `Executor::run`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
#[error("task attempt conflicted on a contended resource")]
pub struct Conflict;

/// User logic driven by the executor.
///
/// Every task attempt goes through two calls: `neighborhood` claims every
/// resource the task will touch, then, if the attempt still holds all of them,
/// `apply` performs the mutation and may produce new tasks. Both calls must be
/// safe to repeat: a cancelled attempt is retried from scratch.
///
/// Resources are borrowed from the operator itself (`&'r self`), so they
/// outlive every attempt of the run.
pub trait Operator: Sync {
    /// Task value type.
    type Task: Send + Sync;

    /// Whether `apply` may push new tasks.
    ///
    /// Push-based operators get a priority-queue window; pull-based ones get
    /// the initial range sorted once and consumed in order.
    const NEEDS_PUSH: bool = true;
    /// Parallel dispatch granularity of the neighborhood phase.
    const NEIGHBORHOOD_CHUNK_SIZE: usize = 4;
    /// Parallel dispatch granularity of the early-execute phase.
    const EXECUTE_CHUNK_SIZE: usize = 4;
    /// Parallel dispatch granularity of the operator phase. Also scales the
    /// minimum window size.
    const CHUNK_SIZE: usize = 4;

    /// Priority order of tasks; `Ordering::Less` means `lhs` runs first.
    ///
    /// Must be a strict weak order and stay consistent for the whole run.
    fn compare(&self, lhs: &Self::Task, rhs: &Self::Task) -> Ordering;

    /// Claim every resource `task` will read or write.
    ///
    /// Lost claims are recorded by the executor, so an attempt that loses one
    /// is never applied. Returning early is still safe but lets lower-priority
    /// attempts take the unclaimed rest of the neighborhood this round.
    ///
    /// # Errors
    /// `Conflict` to cancel the attempt on a conflict the operator detects
    /// itself.
    fn neighborhood<'r>(
        &'r self,
        task: &Self::Task,
        api: &mut impl NeighborhoodApi<'r, Self::Task>,
    ) -> Result<(), Conflict>;

    /// Apply the task. Called only for attempts that won all their claims.
    ///
    /// Every resource touched here must have been claimed in `neighborhood`.
    /// A late conflict, such as an optimistic read found stale, must be
    /// detected before any mutation: on `Err` the attempt is rolled back by
    /// releasing its claims, nothing else is undone.
    ///
    /// # Errors
    /// `Conflict` on a late conflict; the attempt is cancelled and retried.
    fn apply(
        &self,
        task: &Self::Task,
        api: &mut impl OperatorApi<Self::Task>,
    ) -> Result<(), Conflict>;
}

/// API available to `Operator::neighborhood`.
pub trait NeighborhoodApi<'r, T> {
    /// Claim `lock` for the current attempt.
    ///
    /// A lower-priority holder loses the resource and is cancelled for this
    /// round. A higher-priority holder keeps it and the current attempt is
    /// cancelled instead, while keeping whatever it has already claimed.
    fn acquire(&mut self, lock: &'r Lockable);

    /// Every task admitted into the current round, including this one.
    ///
    /// `None` unless the executor runs the unstable variant (constructed with
    /// `Executor::with_execute`).
    fn active_tasks<'a>(&'a self) -> Option<impl Iterator<Item = &'a T>>
    where
        T: 'a;
}

/// API available to `Operator::apply`.
pub trait OperatorApi<T> {
    /// Produce a new task. It is scheduled only if the attempt commits.
    ///
    /// # Panics
    /// If the operator declares `NEEDS_PUSH = false`.
    fn push(&mut self, task: T);
}
