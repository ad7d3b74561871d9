use crate::types::Comparator;
use derive_more::Debug;
use rayon::prelude::*;
use std::collections::VecDeque;

/// Window of a pull-based workload: the initial range, sorted once, consumed
/// front to back.
#[derive(Debug)]
pub(crate) struct SortedWindow<'c, T, C> {
    #[debug(skip)]
    cmp: &'c C,
    #[debug(skip)]
    tasks: VecDeque<T>,
    init_size: usize,
}

impl<'c, T: Send + Sync, C: Comparator<T>> SortedWindow<'c, T, C> {
    pub(super) fn new(cmp: &'c C) -> Self {
        Self {
            cmp,
            tasks: VecDeque::new(),
            init_size: 0,
        }
    }

    pub(super) fn init_fill(&mut self, tasks: impl IntoParallelIterator<Item = T>) {
        let cmp = self.cmp;
        let mut sorted: Vec<T> = tasks.into_par_iter().collect();
        sorted.par_sort_by(|lhs, rhs| cmp.compare(lhs, rhs));
        self.init_size = sorted.len();
        self.tasks = sorted.into();
    }

    pub(super) fn init_size(&self) -> usize {
        self.init_size
    }

    pub(super) fn len(&self) -> usize {
        self.tasks.len()
    }

    pub(super) fn min(&self) -> Option<&T> {
        self.tasks.front()
    }

    pub(super) fn poll<X: Send>(
        &mut self,
        target: &mut Vec<X>,
        want: usize,
        make: impl Fn(T) -> X + Send + Sync,
    ) -> usize {
        let count = want.min(self.tasks.len());
        let admitted: Vec<T> = self.tasks.drain(..count).collect();
        target.par_extend(admitted.into_par_iter().map(make));
        count
    }
}
