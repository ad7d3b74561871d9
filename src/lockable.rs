use crate::{
    context::ContextHeader,
    sync::{AtomicPtr, Ordering},
};
use core::ptr;

/// A resource word tasks claim during neighborhood expansion.
///
/// Embed one per unit of shared data (graph node, cell, wire). The word holds
/// the address of the context that currently owns the resource, or null.
/// Every claim made through the executor is released before the run returns,
/// so a `Lockable` is free between runs.
///
/// A `Lockable` must not be contended by two executors running at the same
/// time.
#[derive(Debug)]
pub struct Lockable {
    owner: AtomicPtr<ContextHeader>,
}

impl Default for Lockable {
    fn default() -> Self {
        Self::new()
    }
}

impl Lockable {
    /// Create a free resource.
    #[must_use]
    pub fn new() -> Self {
        Self {
            owner: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Whether some attempt currently holds this resource.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        !self.owner.load(Ordering::Acquire).is_null()
    }

    #[inline]
    pub(crate) fn owner(&self) -> *mut ContextHeader {
        self.owner.load(Ordering::Acquire)
    }

    /// Swap the owner from `current` to `new`. Fails if someone else got there
    /// first.
    #[inline]
    pub(crate) fn try_transfer(&self, current: *mut ContextHeader, new: *mut ContextHeader) -> bool {
        self.owner
            .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release the resource if `holder` still owns it. A resource stolen by a
    /// higher-priority attempt is left alone.
    #[inline]
    pub(crate) fn release(&self, holder: *mut ContextHeader) {
        let _ = self.owner.compare_exchange(
            holder,
            ptr::null_mut(),
            Ordering::Release,
            Ordering::Relaxed,
        );
    }
}


#[cfg(all(test, feature = "loom"))]
mod loom_tests {
    use super::*;
    use crate::context::Context;
    use std::sync::Arc;

    fn by_value(lhs: &u32, rhs: &u32) -> core::cmp::Ordering {
        lhs.cmp(rhs)
    }

    #[test]
    fn loom_highest_priority_owns_contended_resource() {
        loom::model(|| {
            let lock: &'static Lockable = Box::leak(Box::new(Lockable::new()));
            let high = Arc::new(Context::occupied(1u32, 0));
            let low = Arc::new(Context::occupied(2u32, 1));

            let t_high = {
                let high = high.clone();
                loom::thread::spawn(move || {
                    // SAFETY: this thread is the only visitor of `high`.
                    let _ = unsafe { high.acquire_ordered(lock, &by_value) };
                })
            };
            let t_low = {
                let low = low.clone();
                loom::thread::spawn(move || {
                    // SAFETY: this thread is the only visitor of `low`.
                    let _ = unsafe { low.acquire_ordered(lock, &by_value) };
                })
            };
            t_high.join().unwrap();
            t_low.join().unwrap();

            assert_eq!(lock.owner(), high.owner_ptr());
            assert!(high.is_source());
            assert!(!low.is_source());
        });
    }

    #[test]
    fn loom_two_resources_single_winner() {
        loom::model(|| {
            let first: &'static Lockable = Box::leak(Box::new(Lockable::new()));
            let second: &'static Lockable = Box::leak(Box::new(Lockable::new()));
            let a = Arc::new(Context::occupied(1u32, 0));
            let b = Arc::new(Context::occupied(2u32, 1));

            // Opposite claim order on the two resources.
            let t_a = {
                let a = a.clone();
                loom::thread::spawn(move || {
                    // SAFETY: this thread is the only visitor of `a`.
                    unsafe {
                        let _ = a.acquire_ordered(first, &by_value);
                        let _ = a.acquire_ordered(second, &by_value);
                    }
                })
            };
            let t_b = {
                let b = b.clone();
                loom::thread::spawn(move || {
                    // SAFETY: this thread is the only visitor of `b`.
                    unsafe {
                        if b.acquire_ordered(second, &by_value).is_ok() {
                            let _ = b.acquire_ordered(first, &by_value);
                        }
                    }
                })
            };
            t_a.join().unwrap();
            t_b.join().unwrap();

            assert!(a.is_source());
            assert!(!b.is_source());
            assert_eq!(first.owner(), a.owner_ptr());
            assert_eq!(second.owner(), a.owner_ptr());
        });
    }
}
