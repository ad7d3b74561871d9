#![allow(missing_docs)]
#![cfg(not(feature = "loom"))]

mod common;

use common::{all_free, config, locks};
use core::{
    cmp::Ordering,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering::Relaxed},
};
use parking_lot::Mutex;
use soe::{
    executor::{ExecuteHandle, Executor, for_each_ordered},
    lockable::Lockable,
    operator::{Conflict, NeighborhoodApi, Operator, OperatorApi},
    stats::{RecordingSink, StepStats},
};

fn counters(n: usize) -> Vec<AtomicUsize> {
    (0..n).map(|_| AtomicUsize::new(0)).collect()
}

fn counts(counters: &[AtomicUsize]) -> Vec<usize> {
    counters.iter().map(|c| c.load(Relaxed)).collect()
}

/// Two tasks contending for one resource; lower value runs first.
struct SharedResource {
    lock: Lockable,
    claims: [AtomicUsize; 2],
    applied: Mutex<Vec<u32>>,
}

impl Operator for SharedResource {
    type Task = u32;

    fn compare(&self, lhs: &u32, rhs: &u32) -> Ordering {
        lhs.cmp(rhs)
    }

    fn neighborhood<'r>(
        &'r self,
        task: &u32,
        api: &mut impl NeighborhoodApi<'r, u32>,
    ) -> Result<(), Conflict> {
        self.claims[*task as usize - 1].fetch_add(1, Relaxed);
        api.acquire(&self.lock);
        Ok(())
    }

    fn apply(&self, task: &u32, _api: &mut impl OperatorApi<u32>) -> Result<(), Conflict> {
        assert!(self.lock.is_locked());
        self.applied.lock().push(*task);
        Ok(())
    }
}

#[test]
fn higher_priority_commits_first_under_conflict() {
    let op = SharedResource {
        lock: Lockable::new(),
        claims: [AtomicUsize::new(0), AtomicUsize::new(0)],
        applied: Mutex::new(Vec::new()),
    };
    let sink = RecordingSink::new();
    let summary = Executor::new(&op, config("ab", 2))
        .with_stats_sink(&sink)
        .run(vec![2u32, 1])
        .unwrap();

    assert_eq!(*op.applied.lock(), [1, 2]);
    assert_eq!(counts(&op.claims), [1, 2]);
    assert_eq!(summary.rounds, 2);
    assert_eq!(summary.committed, 2);
    assert_eq!(summary.attempted, 3);
    // Floor is CHUNK_SIZE (4) x 2 workers; the initial window is 16 floors.
    assert_eq!(
        sink.steps(),
        [
            StepStats {
                round: 1,
                attempted: 2,
                committed: 1,
                window_size: 128,
            },
            StepStats {
                round: 2,
                attempted: 1,
                committed: 1,
                window_size: 80,
            },
        ]
    );
    assert!(!op.lock.is_locked());
}

/// Every task touches two cells out of a small grid.
struct Cells {
    locks: Vec<Lockable>,
    busy: Vec<AtomicBool>,
    writes: Vec<AtomicUsize>,
    applied: Vec<AtomicUsize>,
    overlaps: AtomicUsize,
}

impl Cells {
    const CELLS: usize = 64;

    fn new(tasks: usize) -> Self {
        Self {
            locks: locks(Self::CELLS),
            busy: (0..Self::CELLS).map(|_| AtomicBool::new(false)).collect(),
            writes: counters(Self::CELLS),
            applied: counters(tasks),
            overlaps: AtomicUsize::new(0),
        }
    }

    fn footprint(task: u32) -> [usize; 2] {
        let task = task as usize;
        [(task * 7919) % Self::CELLS, (task * 104_729 + 13) % Self::CELLS]
    }
}

impl Operator for Cells {
    type Task = u32;

    fn compare(&self, lhs: &u32, rhs: &u32) -> Ordering {
        (lhs % 17, lhs).cmp(&(rhs % 17, rhs))
    }

    fn neighborhood<'r>(
        &'r self,
        task: &u32,
        api: &mut impl NeighborhoodApi<'r, u32>,
    ) -> Result<(), Conflict> {
        for cell in Self::footprint(*task) {
            api.acquire(&self.locks[cell]);
        }
        Ok(())
    }

    fn apply(&self, task: &u32, _api: &mut impl OperatorApi<u32>) -> Result<(), Conflict> {
        let [a, b] = Self::footprint(*task);
        let cells = if a == b { vec![a] } else { vec![a, b] };
        for &cell in &cells {
            if self.busy[cell].swap(true, Relaxed) {
                self.overlaps.fetch_add(1, Relaxed);
            }
        }
        for &cell in &cells {
            self.writes[cell].fetch_add(1, Relaxed);
            self.busy[cell].store(false, Relaxed);
        }
        self.applied[*task as usize].fetch_add(1, Relaxed);
        Ok(())
    }
}

#[test]
fn every_task_commits_exactly_once() {
    const TASKS: usize = 2000;
    let op = Cells::new(TASKS);
    let summary = for_each_ordered(0..TASKS as u32, &op, config("cells", 4)).unwrap();

    assert_eq!(counts(&op.applied), vec![1; TASKS]);
    assert_eq!(summary.committed, TASKS);
    assert!(summary.attempted >= summary.committed);
    assert!(summary.efficiency() <= 1.0);
    assert_eq!(op.overlaps.load(Relaxed), 0);
    let expected: usize = (0..TASKS as u32)
        .map(|task| match Cells::footprint(task) {
            [a, b] if a == b => 1,
            _ => 2,
        })
        .sum();
    assert_eq!(counts(&op.writes).iter().sum::<usize>(), expected);
    assert!(all_free(&op.locks));
}

/// Binary tree of tasks: every task below `DEPTH` spawns two children.
struct Tree {
    locks: Vec<Lockable>,
    applied: Vec<AtomicUsize>,
}

impl Tree {
    const DEPTH: u32 = 6;
    const NODES: usize = (1 << (Self::DEPTH + 1)) - 1;

    fn new() -> Self {
        Self {
            locks: locks(8),
            applied: counters(Self::NODES),
        }
    }
}

/// `(depth, id)`; ids are heap-ordered.
type Node = (u32, usize);

impl Operator for Tree {
    type Task = Node;

    fn compare(&self, lhs: &Node, rhs: &Node) -> Ordering {
        lhs.cmp(rhs)
    }

    fn neighborhood<'r>(
        &'r self,
        &(_, id): &Node,
        api: &mut impl NeighborhoodApi<'r, Node>,
    ) -> Result<(), Conflict> {
        api.acquire(&self.locks[id % self.locks.len()]);
        Ok(())
    }

    fn apply(
        &self,
        &(depth, id): &Node,
        api: &mut impl OperatorApi<Node>,
    ) -> Result<(), Conflict> {
        self.applied[id].fetch_add(1, Relaxed);
        if depth < Self::DEPTH {
            api.push((depth + 1, 2 * id + 1));
            api.push((depth + 1, 2 * id + 2));
        }
        Ok(())
    }
}

#[test]
fn pushed_tasks_run_to_completion() {
    let op = Tree::new();
    let summary = for_each_ordered([(0, 0)], &op, config("tree", 3)).unwrap();
    assert_eq!(counts(&op.applied), vec![1; Tree::NODES]);
    assert_eq!(summary.committed, Tree::NODES);
    assert!(all_free(&op.locks));
}

/// Same tree without shared resources.
struct FreeTree {
    applied: Vec<AtomicUsize>,
}

impl Operator for FreeTree {
    type Task = Node;

    fn compare(&self, lhs: &Node, rhs: &Node) -> Ordering {
        lhs.cmp(rhs)
    }

    fn neighborhood<'r>(
        &'r self,
        _task: &Node,
        _api: &mut impl NeighborhoodApi<'r, Node>,
    ) -> Result<(), Conflict> {
        Ok(())
    }

    fn apply(
        &self,
        &(depth, id): &Node,
        api: &mut impl OperatorApi<Node>,
    ) -> Result<(), Conflict> {
        self.applied[id].fetch_add(1, Relaxed);
        if depth < Tree::DEPTH {
            api.push((depth + 1, 2 * id + 1));
            api.push((depth + 1, 2 * id + 2));
        }
        Ok(())
    }
}

#[test]
fn zero_commit_ratio_admits_everything_available() {
    let op = FreeTree {
        applied: counters(Tree::NODES),
    };
    let sink = RecordingSink::new();
    let summary = Executor::new(&op, config("flat", 2).with_target_commit_ratio(0.0))
        .with_stats_sink(&sink)
        .run(vec![(0, 0)])
        .unwrap();

    assert_eq!(counts(&op.applied), vec![1; Tree::NODES]);
    // One round per tree level: each level is admitted as a whole.
    let steps = sink.steps();
    assert_eq!(summary.rounds, Tree::DEPTH as usize + 1);
    for (level, step) in steps.iter().enumerate() {
        assert_eq!(step.round, level + 1);
        assert_eq!(step.attempted, 1 << level);
        assert_eq!(step.committed, 1 << level);
        assert_eq!(step.window_size, 0);
    }
    assert_eq!(summary.efficiency(), 1.0);
}

/// Tasks on a line that conflict with their direct neighbours. Resource
/// identity is not materialized: conflicts are found by scanning the round.
struct Line {
    busy: Vec<AtomicBool>,
    executed: Vec<AtomicUsize>,
    applied: Vec<AtomicUsize>,
    overlaps: AtomicUsize,
    unexposed_rounds: AtomicUsize,
}

impl Line {
    const LEN: usize = 200;

    fn rank(pos: u32) -> u32 {
        (pos * 37) % Self::LEN as u32
    }
}

impl Operator for Line {
    type Task = u32;

    fn compare(&self, lhs: &u32, rhs: &u32) -> Ordering {
        Self::rank(*lhs).cmp(&Self::rank(*rhs))
    }

    fn neighborhood<'r>(
        &'r self,
        task: &u32,
        api: &mut impl NeighborhoodApi<'r, u32>,
    ) -> Result<(), Conflict> {
        let Some(active) = api.active_tasks() else {
            self.unexposed_rounds.fetch_add(1, Relaxed);
            return Ok(());
        };
        let beaten = active
            .filter(|other| other.abs_diff(*task) == 1)
            .any(|other| self.compare(other, task) == Ordering::Less);
        if beaten { Err(Conflict) } else { Ok(()) }
    }

    fn apply(&self, task: &u32, _api: &mut impl OperatorApi<u32>) -> Result<(), Conflict> {
        let pos = *task as usize;
        self.busy[pos].store(true, Relaxed);
        let left = pos.checked_sub(1).is_some_and(|left| self.busy[left].load(Relaxed));
        let right = self.busy.get(pos + 1).is_some_and(|right| right.load(Relaxed));
        if left || right {
            self.overlaps.fetch_add(1, Relaxed);
        }
        self.applied[pos].fetch_add(1, Relaxed);
        self.busy[pos].store(false, Relaxed);
        Ok(())
    }
}

#[test]
fn execute_phase_sees_each_committed_task_once() {
    let op = Line {
        busy: (0..Line::LEN).map(|_| AtomicBool::new(false)).collect(),
        executed: counters(Line::LEN),
        applied: counters(Line::LEN),
        overlaps: AtomicUsize::new(0),
        unexposed_rounds: AtomicUsize::new(0),
    };
    let unseen = AtomicUsize::new(0);
    let summary = Executor::with_execute(
        &op,
        config("line", 4),
        |task: &u32, round: &ExecuteHandle<'_, u32>| {
            if round.round() == 0 || !round.active_tasks().any(|other| other == task) {
                unseen.fetch_add(1, Relaxed);
            }
            op.executed[*task as usize].fetch_add(1, Relaxed);
        },
    )
    .run(0..Line::LEN as u32)
    .unwrap();

    assert_eq!(counts(&op.applied), vec![1; Line::LEN]);
    assert_eq!(counts(&op.executed), vec![1; Line::LEN]);
    assert_eq!(summary.committed, Line::LEN);
    assert_eq!(op.overlaps.load(Relaxed), 0);
    assert_eq!(op.unexposed_rounds.load(Relaxed), 0);
    assert_eq!(unseen.load(Relaxed), 0);
}

/// Task `i` shares one resource with each neighbour on a chain. Its first
/// application finds its input stale when `i` is a multiple of `STALE_EVERY`.
struct Chain {
    locks: Vec<Lockable>,
    stale: Vec<AtomicBool>,
    ticket: AtomicUsize,
    committed_at: Vec<AtomicUsize>,
    late_conflicts: AtomicUsize,
}

impl Chain {
    const STALE_EVERY: usize = 5;

    fn new(tasks: usize) -> Self {
        Self {
            locks: locks(tasks + 1),
            stale: (0..tasks)
                .map(|task| AtomicBool::new(task % Self::STALE_EVERY == 0))
                .collect(),
            ticket: AtomicUsize::new(0),
            committed_at: (0..tasks).map(|_| AtomicUsize::new(usize::MAX)).collect(),
            late_conflicts: AtomicUsize::new(0),
        }
    }
}

impl Operator for Chain {
    type Task = usize;

    fn compare(&self, lhs: &usize, rhs: &usize) -> Ordering {
        lhs.cmp(rhs)
    }

    fn neighborhood<'r>(
        &'r self,
        task: &usize,
        api: &mut impl NeighborhoodApi<'r, usize>,
    ) -> Result<(), Conflict> {
        api.acquire(&self.locks[*task]);
        api.acquire(&self.locks[*task + 1]);
        Ok(())
    }

    fn apply(&self, task: &usize, _api: &mut impl OperatorApi<usize>) -> Result<(), Conflict> {
        assert!(self.locks[*task].is_locked() && self.locks[*task + 1].is_locked());
        if self.stale[*task].swap(false, Relaxed) {
            self.late_conflicts.fetch_add(1, Relaxed);
            return Err(Conflict);
        }
        let ticket = self.ticket.fetch_add(1, Relaxed);
        self.committed_at[*task].store(ticket, Relaxed);
        Ok(())
    }
}

#[test]
fn conflicting_tasks_commit_in_priority_order() {
    const TASKS: usize = 64;
    for threads in [1, 4] {
        let op = Chain::new(TASKS);
        let summary = for_each_ordered(0..TASKS, &op, config("chain", threads)).unwrap();

        let committed_at = counts(&op.committed_at);
        assert!(committed_at.iter().all(|&ticket| ticket < TASKS));
        // Neighbours share a resource, so each pair commits in priority order.
        for pair in committed_at.windows(2) {
            assert!(pair[0] < pair[1], "{committed_at:?}");
        }
        assert_eq!(summary.committed, TASKS);
        assert_eq!(
            op.late_conflicts.load(Relaxed),
            TASKS.div_ceil(Chain::STALE_EVERY)
        );
        assert!(summary.attempted - summary.committed >= op.late_conflicts.load(Relaxed));
        assert!(all_free(&op.locks));
    }
}

#[test]
fn runs_are_repeatable_on_the_same_resources() {
    let op = Cells::new(300);
    for _ in 0..3 {
        let summary = for_each_ordered(0..300u32, &op, config("again", 2)).unwrap();
        assert_eq!(summary.committed, 300);
        assert!(all_free(&op.locks));
    }
    assert_eq!(counts(&op.applied), vec![3; 300]);
}
