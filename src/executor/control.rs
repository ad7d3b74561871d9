use crate::types::Comparator;
use core::cmp::Ordering;

/// A pull-based run aims to drain its initial range in at least this many
/// rounds.
const INIT_MAX_ROUNDS: usize = 500;
/// Initial window, in multiples of the floor.
const THREAD_MULT_FACTOR: usize = 16;
/// Outstanding work beyond this many windows is spilled back to the window.
const WIN_OVER_SIZE_FACTOR: usize = 8;

/// Adaptive window size controller.
///
/// The commit ratio of the previous round estimates how much parallelism the
/// current priority horizon offers: at or above the target the window
/// doubles, below it the window shrinks proportionally. The result never
/// drops below `floor` so every worker keeps a chunk to chew on.
#[derive(Debug, Clone)]
pub(crate) struct WindowSizer {
    target: f64,
    floor: usize,
    needs_push: bool,
    size: usize,
}

impl WindowSizer {
    /// `target` must be in `(0, 1]`.
    pub(crate) fn new(target: f64, floor: usize, needs_push: bool) -> Self {
        debug_assert!(target > 0.0 && target <= 1.0, "WindowSizer::new");
        Self {
            target,
            floor: floor.max(1),
            needs_push,
            size: 0,
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// Window size for the next round given the previous round's counters.
    ///
    /// `attempted == 0` means no round has run yet and picks the initial size
    /// from the size of the initial range.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub(crate) fn resize(&mut self, init_size: usize, committed: usize, attempted: usize) -> usize {
        let Self {
            target,
            floor,
            needs_push,
            size,
        } = self;
        if attempted == 0 {
            debug_assert_eq!(committed, 0, "WindowSizer::resize");
            *size = if *needs_push {
                init_size.max(THREAD_MULT_FACTOR * *floor)
            } else {
                (init_size / INIT_MAX_ROUNDS).min(THREAD_MULT_FACTOR * *floor)
            };
        } else {
            let ratio = committed as f64 / attempted as f64;
            if ratio >= *target {
                *size = size.saturating_mul(2);
            } else {
                *size = (*size as f64 * ratio / *target) as usize;
            }
        }
        *size = (*size).max(*floor);
        *size
    }

    /// Whether the outstanding work should go back to the window before the
    /// next poll.
    pub(crate) fn should_spill(&self, outstanding: usize, window_empty: bool) -> bool {
        (window_empty && outstanding > self.size)
            || outstanding > WIN_OVER_SIZE_FACTOR.saturating_mul(self.size)
    }
}

/// Where a task produced by a committed attempt goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Destination {
    NextRound,
    Window,
}

/// A produced task joins the next round unless the window holds something
/// strictly better; otherwise it would overtake pending higher-priority work.
pub(crate) fn route<T>(cmp: &impl Comparator<T>, window_min: Option<&T>, task: &T) -> Destination {
    match window_min {
        Some(min) if cmp.compare(min, task) == Ordering::Less => Destination::Window,
        _ => Destination::NextRound,
    }
}
