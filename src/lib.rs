//! Speculative, priority-ordered parallel executor for irregular workloads.
//!
//! Tasks are processed in a global priority order, yet many of them run in
//! parallel: the executor speculates that a batch of the highest-priority
//! pending tasks is independent and discovers at runtime, by having every task
//! claim its data footprint, which of them actually are. It:
//! - Admits tasks in rounds through an adaptive window whose size follows the
//!   observed commit ratio.
//! - Resolves every conflict in favour of the higher-priority task (ties go to
//!   the task admitted first), so each round commits at least its best task.
//! - Rolls back losers without side effects and retries them next round.
//! - Schedules tasks produced by a committed task either for the next round
//!   or back into the window, depending on how they rank against the pending
//!   work.
//!
//! Key modules:
//! - `operator`: the `Operator` trait implemented by users and the APIs handed
//!   to it.
//! - `lockable`: `Lockable`, the resource word tasks claim.
//! - `executor`: the round loop and its entry points.
//! - `config`: run tunables, including environment overrides.
//! - `stats`: per-round statistics and the end-of-run summary.
//!
//! Quick start:
//! 1. Embed a `Lockable` in every unit of shared data.
//! 2. Implement `Operator`: `compare` orders tasks, `neighborhood` claims the
//!    resources of a task via `NeighborhoodApi::acquire`, and `apply` mutates
//!    them and may push new tasks via `OperatorApi::push`.
//! 3. Call `for_each_ordered(initial, &op, ExecutorConfig::default())`.
//!
//! Data guarded by a `Lockable` may be mutated in `apply` only while the task
//! holds the claim; the executor guarantees that no two tasks hold the same
//! resource at once and that the mutations of a committed task happen before
//! any later claim of the same resource.

/// Run configuration.
///
/// `ExecutorConfig` is built with setters or read from `SOE_*` environment
/// variables.
pub mod config;
mod context;
/// The speculative executor.
///
/// Contains the round loop (admission, neighborhood expansion, optional
/// execute phase, operator phase with commit or rollback) and the adaptive
/// window controller.
pub mod executor;
/// Claimable resource words.
pub mod lockable;
/// The user-implemented `Operator` trait and the APIs passed to it.
pub mod operator;
/// Per-round statistics, sinks and the end-of-run summary.
pub mod stats;
mod sync;
/// Ordering primitives shared by the public API.
pub mod types;
mod window;
