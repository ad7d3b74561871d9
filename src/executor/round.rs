use crate::{
    context::{ContextPool, Pooled},
    executor::{
        Executor, Phases,
        api::{ExecuteHandle, NeighborhoodHandle, OperatorHandle},
        control::{Destination, WindowSizer, route},
    },
    operator::Operator,
    stats::{RunSummary, StepStats},
    types::{OperatorOrder, TaskOf},
    window::Window,
};
use core::mem;
use crossbeam_utils::CachePadded;
use derive_more::Debug;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::time::Instant;
use tracing::debug;

/// Work of the next round, appended to from every worker during a phase.
#[derive(Debug)]
pub(super) struct RoundBuffer<'p, 'r, T: Send + Sync> {
    #[debug(skip)]
    shards: Box<[CachePadded<Mutex<Vec<Pooled<'p, 'r, T>>>>]>,
}

impl<'p, 'r, T: Send + Sync> RoundBuffer<'p, 'r, T> {
    pub(super) fn new(workers: usize) -> Self {
        Self {
            shards: (0..workers.max(1))
                .map(|_| CachePadded::new(Mutex::new(Vec::new())))
                .collect(),
        }
    }

    pub(super) fn push(&self, ctx: Pooled<'p, 'r, T>) {
        let idx = rayon::current_thread_index().unwrap_or(0) % self.shards.len();
        self.shards[idx].lock().push(ctx);
    }

    #[cfg(test)]
    pub(super) fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    /// Merge every shard into one vector, leaving the buffer empty.
    pub(super) fn take_all(&mut self) -> Vec<Pooled<'p, 'r, T>> {
        let len = self.shards.iter_mut().map(|shard| shard.get_mut().len()).sum();
        let mut all = Vec::with_capacity(len);
        for shard in self.shards.iter_mut() {
            all.append(shard.get_mut());
        }
        all
    }
}

/// State of one `Executor::run`.
pub(super) struct Run<'e, 'c, 'p, 'r, O: Operator> {
    exec: &'e Executor<'r, O>,
    cmp: &'c OperatorOrder<'r, O>,
    pool: &'p ContextPool<'r, TaskOf<O>>,
    window: Window<'c, TaskOf<O>, OperatorOrder<'r, O>>,
    current: Vec<Pooled<'p, 'r, TaskOf<O>>>,
    next: RoundBuffer<'p, 'r, TaskOf<O>>,
    /// `None` when windowing is disabled.
    sizer: Option<WindowSizer>,
    round: usize,
    /// `(committed, attempted)` of the previous round.
    prev: (usize, usize),
    summary: RunSummary,
}

impl<'e, 'c, 'p, 'r, O: Operator> Run<'e, 'c, 'p, 'r, O> {
    pub(super) fn new(
        exec: &'e Executor<'r, O>,
        cmp: &'c OperatorOrder<'r, O>,
        pool: &'p ContextPool<'r, TaskOf<O>>,
        workers: usize,
    ) -> Self {
        let config = &exec.config;
        let sizer = config.windowing().then(|| {
            WindowSizer::new(
                config.target_commit_ratio(),
                O::CHUNK_SIZE.saturating_mul(workers),
                O::NEEDS_PUSH,
            )
        });
        Self {
            exec,
            cmp,
            pool,
            window: Window::new(O::NEEDS_PUSH, cmp, workers),
            current: Vec::new(),
            next: RoundBuffer::new(workers),
            sizer,
            round: 0,
            prev: (0, 0),
            summary: RunSummary::default(),
        }
    }

    /// Seed the run with its initial range.
    ///
    /// With windowing the range goes through the window. Without it every
    /// task is admitted into the first round.
    pub(super) fn fill(&mut self, initial: impl IntoParallelIterator<Item = TaskOf<O>>) {
        if self.sizer.is_some() {
            self.window.init_fill(initial);
        } else {
            let Self { pool, next, .. } = self;
            let (pool, next) = (*pool, &*next);
            initial
                .into_par_iter()
                .for_each(|task| next.push(pool.allocate(task)));
        }
    }

    /// Run rounds until no work is left.
    pub(super) fn drive(mut self) -> RunSummary {
        loop {
            self.begin_round();
            if self.current.is_empty() {
                break;
            }
            let started = Instant::now();
            let attempted = self.current.len();
            self.expand_neighborhood();
            self.execute_sources();
            let committed = self.apply_operator();
            self.end_round(attempted, committed, started);
        }
        debug_assert!(self.window.is_empty(), "Run::drive: [1]");
        self.summary
    }

    fn begin_round(&mut self) {
        self.current = self.next.take_all();
        let Some(sizer) = &mut self.sizer else {
            return;
        };
        let (committed, attempted) = self.prev;
        let size = sizer.resize(self.window.init_size(), committed, attempted);
        if O::NEEDS_PUSH && sizer.should_spill(self.current.len(), self.window.is_empty()) {
            let spilled = self.current.len();
            let window = &self.window;
            mem::take(&mut self.current)
                .into_par_iter()
                .for_each(|ctx| window.push(ctx.into_task()));
            debug!(
                round = self.round + 1,
                spilled,
                window_size = size,
                "spilled outstanding work back to the window"
            );
        }
        let outstanding = self.current.len();
        let pool = self.pool;
        self.window
            .poll(&mut self.current, size, outstanding, |task| pool.allocate(task));
    }

    fn expand_neighborhood(&self) {
        let Self {
            exec, cmp, current, ..
        } = self;
        let active = match exec.phases {
            Phases::Stable => None,
            Phases::Unstable { .. } => Some(current.as_slice()),
        };
        let op = exec.op;
        current
            .par_iter()
            .with_min_len(O::NEIGHBORHOOD_CHUNK_SIZE)
            .for_each(|ctx| {
                let mut api = NeighborhoodHandle {
                    ctx,
                    cmp: *cmp,
                    active,
                };
                if op.neighborhood(ctx.task(), &mut api).is_err() {
                    ctx.disable();
                }
            });
    }

    fn execute_sources(&self) {
        let Phases::Unstable { execute } = &self.exec.phases else {
            return;
        };
        let active: Vec<&TaskOf<O>> = self.current.par_iter().map(|ctx| ctx.task()).collect();
        let handle = ExecuteHandle {
            round: self.round + 1,
            active: &active,
        };
        self.current
            .par_iter()
            .with_min_len(O::EXECUTE_CHUNK_SIZE)
            .filter(|ctx| ctx.is_source())
            .for_each(|ctx| execute(ctx.task(), &handle));
    }

    /// Returns the number of commits.
    fn apply_operator(&mut self) -> usize {
        let Self {
            exec,
            cmp,
            pool,
            window,
            current,
            next,
            sizer,
            ..
        } = self;
        let op = exec.op;
        window.flush();
        let (cmp, pool, window, next) = (*cmp, *pool, &*window, &*next);
        let window_min = if O::NEEDS_PUSH && sizer.is_some() {
            window.min()
        } else {
            None
        };
        let retired: Vec<_> = mem::take(current)
            .into_par_iter()
            .with_min_len(O::CHUNK_SIZE)
            .filter_map(|ctx| {
                let commit = ctx.is_source() && {
                    let mut api = OperatorHandle {
                        ctx: &*ctx,
                        accepts_pushes: O::NEEDS_PUSH,
                    };
                    op.apply(ctx.task(), &mut api).is_ok() && ctx.is_source()
                };
                if commit {
                    // SAFETY: this closure is the only visitor of `ctx`.
                    let pushed = unsafe {
                        ctx.release_all();
                        ctx.take_pushed()
                    };
                    for task in pushed {
                        match route(cmp, window_min, &task) {
                            Destination::NextRound => next.push(pool.allocate(task)),
                            Destination::Window => window.push(task),
                        }
                    }
                    Some(ctx)
                } else {
                    // SAFETY: this closure is the only visitor of `ctx`.
                    unsafe { ctx.cancel() };
                    next.push(ctx);
                    None
                }
            })
            .collect();
        let committed = retired.len();
        // Slots of committed contexts are recycled only after the phase, so an
        // owner word read during it never names a reused slot.
        retired.into_par_iter().for_each(drop);
        committed
    }

    fn end_round(&mut self, attempted: usize, committed: usize, started: Instant) {
        self.round += 1;
        let step = StepStats {
            round: self.round,
            attempted,
            committed,
            window_size: self.sizer.as_ref().map_or(0, WindowSizer::size),
        };
        debug!(
            round = step.round,
            attempted,
            committed,
            window_size = step.window_size,
            elapsed = ?started.elapsed(),
            "round finished"
        );
        if let Some(sink) = &self.exec.sink {
            sink.record_step(self.exec.config.loopname(), &step);
        }
        self.summary.add_step(&step);
        self.prev = (committed, attempted);
    }
}
