use crate::types::Comparator;
use core::cmp::Ordering;
use crossbeam_utils::CachePadded;
use derive_more::Debug;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::collections::BinaryHeap;

/// Heap entry ordered so that `BinaryHeap::pop` yields the highest-priority
/// task. Equal priorities pop in insertion order.
#[derive(Debug)]
struct Ranked<'c, T, C> {
    task: T,
    seq: u64,
    #[debug(skip)]
    cmp: &'c C,
}

impl<T, C: Comparator<T>> Ord for Ranked<'_, T, C> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp
            .compare(&self.task, &other.task)
            .then_with(|| self.seq.cmp(&other.seq))
            .reverse()
    }
}

impl<T, C: Comparator<T>> PartialOrd for Ranked<'_, T, C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T, C: Comparator<T>> PartialEq for Ranked<'_, T, C> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T, C: Comparator<T>> Eq for Ranked<'_, T, C> {}

/// Window of a push-based workload.
///
/// The heap is only touched between phases. Tasks pushed during a phase land
/// in per-worker inboxes and join the heap at the next `flush`.
#[derive(Debug)]
pub(crate) struct PriorityWindow<'c, T, C> {
    #[debug(skip)]
    cmp: &'c C,
    heap: BinaryHeap<Ranked<'c, T, C>>,
    #[debug(skip)]
    inbox: Box<[CachePadded<Mutex<Vec<T>>>]>,
    /// Insertion counter of the heap.
    next_seq: u64,
    init_size: usize,
}

impl<'c, T: Send + Sync, C: Comparator<T>> PriorityWindow<'c, T, C> {
    pub(super) fn new(cmp: &'c C, workers: usize) -> Self {
        Self {
            cmp,
            heap: BinaryHeap::new(),
            inbox: (0..workers.max(1))
                .map(|_| CachePadded::new(Mutex::new(Vec::new())))
                .collect(),
            next_seq: 0,
            init_size: 0,
        }
    }

    pub(super) fn init_fill(&mut self, tasks: impl IntoParallelIterator<Item = T>) {
        let (cmp, base) = (self.cmp, self.next_seq);
        let tasks: Vec<T> = tasks.into_par_iter().collect();
        let ranked: Vec<_> = tasks
            .into_par_iter()
            .enumerate()
            .map(|(idx, task)| Ranked {
                task,
                seq: base + idx as u64,
                cmp,
            })
            .collect();
        self.init_size = ranked.len();
        self.next_seq += ranked.len() as u64;
        self.heap.extend(ranked);
    }

    pub(super) fn init_size(&self) -> usize {
        self.init_size
    }

    pub(super) fn len(&self) -> usize {
        self.heap.len() + self.inbox.iter().map(|inbox| inbox.lock().len()).sum::<usize>()
    }

    pub(super) fn push(&self, task: T) {
        let idx = rayon::current_thread_index().unwrap_or(0) % self.inbox.len();
        self.inbox[idx].lock().push(task);
    }

    pub(super) fn flush(&mut self) {
        let Self {
            cmp,
            heap,
            inbox,
            next_seq,
            ..
        } = self;
        for inbox in inbox.iter_mut() {
            for task in inbox.get_mut().drain(..) {
                heap.push(Ranked {
                    task,
                    seq: *next_seq,
                    cmp: *cmp,
                });
                *next_seq += 1;
            }
        }
    }

    pub(super) fn min(&self) -> Option<&T> {
        self.heap.peek().map(|ranked| &ranked.task)
    }

    pub(super) fn poll<X: Send>(
        &mut self,
        target: &mut Vec<X>,
        want: usize,
        make: impl Fn(T) -> X + Send + Sync,
    ) -> usize {
        self.flush();
        let count = want.min(self.heap.len());
        let admitted: Vec<T> = (0..count)
            .map(|_| self.heap.pop().expect("PriorityWindow::poll").task)
            .collect();
        target.par_extend(admitted.into_par_iter().map(make));
        count
    }
}
