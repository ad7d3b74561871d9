mod pool;

pub(crate) use self::pool::{ContextPool, Pooled};
#[cfg(not(feature = "loom"))]
use crate::sync::{LoomPtrCompat as _, LoomUnsafeCellCompat as _};
use crate::{
    lockable::Lockable,
    operator::Conflict,
    sync::{AtomicBool, Ordering},
    types::{Comparator, SyncUnsafeCell},
};
use core::{cmp, ptr};
use derive_more::Debug;

/// Type-erased prefix of every `Context`, the thing a `Lockable` points at.
///
/// Only `src` is written while other workers may be looking: a winning
/// claimant flips it through the owner pointer it read from the resource.
#[must_use]
#[derive(Debug)]
#[repr(C)]
pub(crate) struct ContextHeader {
    /// `true` while the attempt has not lost any claim.
    src: AtomicBool,
    /// Admission index, breaks ties between equal-priority tasks.
    seq: u64,
}

/// Speculative state of one task attempt.
///
/// `repr(C)` with the header first: a pointer to the whole context doubles as
/// the owner word stored in every resource it holds.
#[must_use]
#[derive(Debug)]
#[repr(C)]
pub(crate) struct Context<'r, T> {
    header: ContextHeader,
    /// `None` only while the slot sits in the pool's free lists.
    task: Option<T>,
    #[debug(skip)]
    attempt: SyncUnsafeCell<Attempt<'r, T>>,
}

/// State mutated by the worker visiting the context in the current phase.
#[derive(Debug)]
pub(crate) struct Attempt<'r, T> {
    /// Resources claimed by this attempt, in claim order.
    held: Vec<&'r Lockable>,
    /// Tasks produced by the operator, scheduled at commit.
    pushed: Vec<T>,
}

impl<T> Default for Attempt<'_, T> {
    fn default() -> Self {
        Self {
            held: Vec::new(),
            pushed: Vec::new(),
        }
    }
}

impl<'r, T> Context<'r, T> {
    pub(crate) fn occupied(task: T, seq: u64) -> Self {
        Self {
            header: ContextHeader {
                src: AtomicBool::new(true),
                seq,
            },
            task: Some(task),
            attempt: SyncUnsafeCell::new(Attempt::default()),
        }
    }

    /// Put a new task into a recycled slot.
    fn occupy(&mut self, task: T, seq: u64) {
        debug_assert!(self.task.is_none(), "Context::occupy");
        self.header.seq = seq;
        self.header.src.store(true, Ordering::Relaxed);
        self.task = Some(task);
    }

    /// Take the task out, leaving an empty slot with cleared buffers.
    ///
    /// Claims are normally released by commit or cancel; a context dropped
    /// while unwinding from a user panic may still hold some.
    fn vacate(&mut self) -> Option<T> {
        // SAFETY: `&mut self` rules out any other access to the attempt state.
        unsafe {
            self.release_all();
            self.with_attempt(|attempt| attempt.pushed.clear());
        }
        self.task.take()
    }

    pub(crate) fn task(&self) -> &T {
        self.task.as_ref().expect("Context::task")
    }

    pub(crate) fn seq(&self) -> u64 {
        self.header.seq
    }

    pub(crate) fn is_source(&self) -> bool {
        self.header.src.load(Ordering::Relaxed)
    }

    pub(crate) fn disable(&self) {
        self.header.src.store(false, Ordering::Relaxed);
    }

    pub(crate) fn owner_ptr(&self) -> *mut ContextHeader {
        ptr::from_ref(self).cast::<ContextHeader>().cast_mut()
    }

    /// Whether this attempt wins a conflict against `other`.
    pub(crate) fn outranks(&self, other: &Self, cmp: &impl Comparator<T>) -> bool {
        cmp.compare(self.task(), other.task())
            .then_with(|| self.seq().cmp(&other.seq()))
            == cmp::Ordering::Less
    }

    /// # Safety
    ///
    /// The caller must be the only worker visiting this context: no other
    /// thread may touch its attempt state for the duration of the call.
    unsafe fn with_attempt<R>(&self, f: impl FnOnce(&mut Attempt<'r, T>) -> R) -> R {
        // SAFETY: exclusivity of the attempt state is guaranteed by the caller.
        unsafe { self.attempt.get_mut().with(|ptr| f(&mut *ptr)) }
    }

    /// Claim `lock` during neighborhood expansion, stealing it from any
    /// lower-priority holder.
    ///
    /// Losing disables this attempt but leaves its other claims in place, so
    /// it still shields its neighborhood from lower-priority attempts.
    ///
    /// # Safety
    ///
    /// - The caller must be the only worker visiting this context.
    /// - Every context that may own `lock` is a live `Context<'r, T>` of the
    ///   same run, so the owner word can be read back as one.
    pub(crate) unsafe fn acquire_ordered(
        &self,
        lock: &'r Lockable,
        cmp: &impl Comparator<T>,
    ) -> Result<(), Conflict> {
        let me = self.owner_ptr();
        loop {
            let owner = lock.owner();
            if owner == me {
                return Ok(());
            }
            if owner.is_null() {
                if lock.try_transfer(owner, me) {
                    // SAFETY: forwarded from the caller.
                    unsafe { self.with_attempt(|attempt| attempt.held.push(lock)) };
                    return Ok(());
                }
                continue;
            }
            // SAFETY: owners of `lock` are live contexts of this run (caller
            // contract) and `ContextHeader` is the first field of a `repr(C)`
            // `Context`.
            let that = unsafe { &*owner.cast::<Self>().cast_const() };
            if !self.outranks(that, cmp) {
                self.disable();
                return Err(Conflict);
            }
            if lock.try_transfer(owner, me) {
                that.disable();
                // SAFETY: forwarded from the caller.
                unsafe { self.with_attempt(|attempt| attempt.held.push(lock)) };
                return Ok(());
            }
        }
    }

    /// Release every resource this attempt still owns.
    ///
    /// # Safety
    ///
    /// The caller must be the only worker visiting this context.
    pub(crate) unsafe fn release_all(&self) {
        let me = self.owner_ptr();
        // SAFETY: forwarded from the caller.
        unsafe {
            self.with_attempt(|attempt| {
                for lock in attempt.held.drain(..) {
                    lock.release(me);
                }
            });
        }
    }

    /// # Safety
    ///
    /// The caller must be the only worker visiting this context.
    pub(crate) unsafe fn push(&self, task: T) {
        // SAFETY: forwarded from the caller.
        unsafe { self.with_attempt(|attempt| attempt.pushed.push(task)) };
    }

    /// Drain the tasks produced by the operator.
    ///
    /// # Safety
    ///
    /// The caller must be the only worker visiting this context.
    pub(crate) unsafe fn take_pushed(&self) -> Vec<T> {
        // SAFETY: forwarded from the caller.
        unsafe { self.with_attempt(|attempt| core::mem::take(&mut attempt.pushed)) }
    }

    /// Roll the attempt back: release claims, drop produced tasks and make the
    /// context a source again so it can retry next round.
    ///
    /// # Safety
    ///
    /// The caller must be the only worker visiting this context.
    pub(crate) unsafe fn cancel(&self) {
        // SAFETY: forwarded from the caller.
        unsafe {
            self.release_all();
            self.with_attempt(|attempt| attempt.pushed.clear());
        }
        self.header.src.store(true, Ordering::Relaxed);
    }

    /// # Safety
    ///
    /// The caller must be the only worker visiting this context.
    #[cfg(test)]
    pub(crate) unsafe fn held_count(&self) -> usize {
        // SAFETY: forwarded from the caller.
        unsafe { self.with_attempt(|attempt| attempt.held.len()) }
    }
}
