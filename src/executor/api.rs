use crate::{
    context::{Context, Pooled},
    lockable::Lockable,
    operator::{NeighborhoodApi, OperatorApi},
    types::Comparator,
};

/// User handle passed to `Operator::neighborhood`.
///
/// Built fresh for every call by the worker visiting `ctx`, which is what
/// makes the unsafe context accessors below sound.
pub(super) struct NeighborhoodHandle<'a, 'p, 'r, T: Send + Sync, C> {
    pub(super) ctx: &'a Context<'r, T>,
    pub(super) cmp: &'a C,
    /// The whole current round, exposed only in the unstable variant.
    pub(super) active: Option<&'a [Pooled<'p, 'r, T>]>,
}

impl<'r, T: Send + Sync, C: Comparator<T>> NeighborhoodApi<'r, T>
    for NeighborhoodHandle<'_, '_, 'r, T, C>
{
    fn acquire(&mut self, lock: &'r Lockable) {
        let Self { ctx, cmp, .. } = self;
        // SAFETY:
        // - The handle lives inside the single worker visiting `ctx` in this
        //   phase.
        // - During neighborhood expansion every owner of a resource is a
        //   context of the current round, alive until the phase ends.
        // A lost claim has already disabled `ctx`.
        let _ = unsafe { ctx.acquire_ordered(lock, *cmp) };
    }

    fn active_tasks<'b>(&'b self) -> Option<impl Iterator<Item = &'b T>>
    where
        T: 'b,
    {
        self.active
            .map(|active| active.iter().map(|ctx| ctx.task()))
    }
}

/// User handle passed to `Operator::apply`.
pub(super) struct OperatorHandle<'a, 'r, T> {
    pub(super) ctx: &'a Context<'r, T>,
    pub(super) accepts_pushes: bool,
}

impl<T> OperatorApi<T> for OperatorHandle<'_, '_, T> {
    fn push(&mut self, task: T) {
        assert!(
            self.accepts_pushes,
            "OperatorApi::push: operator declares NEEDS_PUSH = false"
        );
        // SAFETY: the handle lives inside the single worker visiting `ctx` in
        // this phase.
        unsafe { self.ctx.push(task) };
    }
}

/// Read-only view of the current round passed to the execute function.
#[derive(Debug)]
pub struct ExecuteHandle<'a, T> {
    pub(super) round: usize,
    pub(super) active: &'a [&'a T],
}

impl<'a, T> ExecuteHandle<'a, T> {
    /// One-based index of the current round.
    #[must_use]
    pub fn round(&self) -> usize {
        self.round
    }

    /// Every task admitted into the current round, sources or not.
    pub fn active_tasks(&self) -> impl Iterator<Item = &'a T> {
        self.active.iter().copied()
    }
}
