use core::fmt;
use parking_lot::Mutex;

/// Counters of one finished round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepStats {
    /// 1-based round index.
    pub round: usize,
    /// Attempts admitted into the round.
    pub attempted: usize,
    /// Attempts that committed.
    pub committed: usize,
    /// Window size the round was admitted with; `0` when windowing is
    /// disabled.
    pub window_size: usize,
}

/// Receiver of per-round statistics, for offline analysis of available
/// parallelism.
pub trait StatsSink: Send + Sync {
    /// Called once per round, after the round's commit decisions are final.
    fn record_step(&self, loopname: &str, step: &StepStats);
}

impl<S: StatsSink + ?Sized> StatsSink for &S {
    fn record_step(&self, loopname: &str, step: &StepStats) {
        (**self).record_step(loopname, step);
    }
}

/// `StatsSink` keeping every step in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    steps: Mutex<Vec<StepStats>>,
}

impl RecordingSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Steps recorded so far, in round order.
    #[must_use]
    pub fn steps(&self) -> Vec<StepStats> {
        self.steps.lock().clone()
    }
}

impl StatsSink for RecordingSink {
    fn record_step(&self, _loopname: &str, step: &StepStats) {
        self.steps.lock().push(*step);
    }
}

/// End-of-run totals.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RunSummary {
    /// Rounds executed.
    pub rounds: usize,
    /// Attempts that committed; equals the number of distinct tasks processed.
    pub committed: usize,
    /// All attempts, retries included.
    pub attempted: usize,
}

impl RunSummary {
    /// Fraction of attempts that committed.
    #[must_use]
    pub fn efficiency(&self) -> f64 {
        ratio(self.committed, self.attempted)
    }

    /// Average number of commits per round.
    #[must_use]
    pub fn avg_parallelism(&self) -> f64 {
        ratio(self.committed, self.rounds)
    }

    pub(crate) fn add_step(&mut self, step: &StepStats) {
        self.rounds += 1;
        self.committed += step.committed;
        self.attempted += step.attempted;
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rounds: {}, commits: {}, total: {}, efficiency: {:.3}, avg. parallelism: {:.3}",
            self.rounds,
            self.committed,
            self.attempted,
            self.efficiency(),
            self.avg_parallelism()
        )
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}
