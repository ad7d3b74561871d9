mod priority;
mod sorted;

use self::{priority::PriorityWindow, sorted::SortedWindow};
use crate::types::Comparator;
use derive_more::Debug;
use rayon::iter::IntoParallelIterator;

/// Pool of tasks not yet admitted into a round.
///
/// Push-based workloads keep it in a priority queue that accepts new tasks
/// concurrently; pull-based workloads sort the initial range once and consume
/// it through a cursor.
#[derive(Debug)]
pub(crate) enum Window<'c, T, C> {
    Priority(PriorityWindow<'c, T, C>),
    Sorted(SortedWindow<'c, T, C>),
}

impl<'c, T: Send + Sync, C: Comparator<T>> Window<'c, T, C> {
    pub(crate) fn new(needs_push: bool, cmp: &'c C, workers: usize) -> Self {
        if needs_push {
            Self::Priority(PriorityWindow::new(cmp, workers))
        } else {
            Self::Sorted(SortedWindow::new(cmp))
        }
    }

    /// Seed the window with the initial range.
    pub(crate) fn init_fill(&mut self, tasks: impl IntoParallelIterator<Item = T>) {
        match self {
            Self::Priority(window) => window.init_fill(tasks),
            Self::Sorted(window) => window.init_fill(tasks),
        }
    }

    /// Size of the initial range.
    pub(crate) fn init_size(&self) -> usize {
        match self {
            Self::Priority(window) => window.init_size(),
            Self::Sorted(window) => window.init_size(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Priority(window) => window.len(),
            Self::Sorted(window) => window.len(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a task. Safe to call from several workers at once.
    ///
    /// # Panics
    /// On a pull-based window: those workloads never produce tasks.
    pub(crate) fn push(&self, task: T) {
        match self {
            Self::Priority(window) => window.push(task),
            Self::Sorted(_) => unreachable!("Window::push: pull-based window"),
        }
    }

    /// Move tasks pushed concurrently into the ordered store.
    pub(crate) fn flush(&mut self) {
        if let Self::Priority(window) = self {
            window.flush();
        }
    }

    /// Highest-priority task as of the last `flush` or `poll`.
    pub(crate) fn min(&self) -> Option<&T> {
        match self {
            Self::Priority(window) => window.min(),
            Self::Sorted(window) => window.min(),
        }
    }

    /// Admit up to `window_size - outstanding` tasks into `target`, highest
    /// priority first, wrapping each with `make`. Returns how many were
    /// admitted.
    pub(crate) fn poll<X: Send>(
        &mut self,
        target: &mut Vec<X>,
        window_size: usize,
        outstanding: usize,
        make: impl Fn(T) -> X + Send + Sync,
    ) -> usize {
        let want = window_size.saturating_sub(outstanding);
        match self {
            Self::Priority(window) => window.poll(target, want, make),
            Self::Sorted(window) => window.poll(target, want, make),
        }
    }
}
