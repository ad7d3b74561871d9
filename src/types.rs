use crate::{operator::Operator, sync::UnsafeCell};
use core::cmp::Ordering;
use derive_more::{Debug, Deref};

/// A minimal `UnsafeCell` wrapper that is `Sync` when `T: Send + Sync`.
///
/// Used for the per-attempt state of a context: it is written only by the
/// worker visiting that context in the current phase, while other workers may
/// concurrently read the immutable parts of the same context.
#[derive(Debug, Deref)]
#[repr(transparent)]
pub(crate) struct SyncUnsafeCell<T>(UnsafeCell<T>);

unsafe impl<T: Send + Sync> Sync for SyncUnsafeCell<T> {}

impl<T> SyncUnsafeCell<T> {
    pub(crate) fn new(val: T) -> Self {
        Self(UnsafeCell::new(val))
    }
}

/// Total order over task values.
///
/// `Ordering::Less` means the left-hand task has the higher priority: it is
/// admitted first and wins every conflict against the right-hand task.
pub trait Comparator<T: ?Sized>: Sync {
    /// Compare two tasks by priority.
    fn compare(&self, lhs: &T, rhs: &T) -> Ordering;
}

impl<T: ?Sized, F> Comparator<T> for F
where
    F: Fn(&T, &T) -> Ordering + Sync,
{
    #[inline]
    fn compare(&self, lhs: &T, rhs: &T) -> Ordering {
        self(lhs, rhs)
    }
}

/// Task type processed by a given operator.
pub type TaskOf<O> = <O as Operator>::Task;

/// Adapter ordering tasks by `Operator::compare`.
#[derive(Debug)]
#[debug("OperatorOrder")]
pub(crate) struct OperatorOrder<'r, O>(pub(crate) &'r O);

impl<O> Clone for OperatorOrder<'_, O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<O> Copy for OperatorOrder<'_, O> {}

impl<O: Operator> Comparator<TaskOf<O>> for OperatorOrder<'_, O> {
    #[inline]
    fn compare(&self, lhs: &TaskOf<O>, rhs: &TaskOf<O>) -> Ordering {
        self.0.compare(lhs, rhs)
    }
}
