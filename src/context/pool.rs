use crate::{
    context::Context,
    sync::{AtomicU64, AtomicUsize, Ordering},
};
use core::{fmt, marker::PhantomData, ops::Deref, ptr::NonNull};
use crossbeam_queue::SegQueue;
use crossbeam_utils::CachePadded;
use parking_lot::Mutex;

/// Free slots a worker keeps for itself before spilling to the shared queue.
const LOCAL_CAPACITY: usize = 1024;

struct Slot<'r, T>(NonNull<Context<'r, T>>);

// SAFETY: a slot in a free list is owned by the pool alone; the context it
// points to is `Send` when `T` is.
unsafe impl<T: Send + Sync> Send for Slot<'_, T> {}

impl<'r, T> Slot<'r, T> {
    fn boxed(ctx: Context<'r, T>) -> Self {
        Self(NonNull::from(Box::leak(Box::new(ctx))))
    }
}

/// Pooled allocator of task contexts.
///
/// Every worker owns a bounded free list; overflow goes to a shared lock-free
/// queue that any worker can draw from, so a context allocated on one worker
/// may be returned on another. Slots are boxed once and keep their buffers'
/// capacity across reuse.
pub(crate) struct ContextPool<'r, T> {
    local: Box<[CachePadded<Mutex<Vec<Slot<'r, T>>>>]>,
    shared: SegQueue<Slot<'r, T>>,
    next_seq: AtomicU64,
    outstanding: AtomicUsize,
}

impl<T> fmt::Debug for ContextPool<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextPool")
            .field("workers", &self.local.len())
            .field("shared", &self.shared.len())
            .field("outstanding", &self.outstanding.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<'r, T: Send + Sync> ContextPool<'r, T> {
    pub(crate) fn new(workers: usize) -> Self {
        Self {
            local: (0..workers.max(1))
                .map(|_| CachePadded::new(Mutex::new(Vec::new())))
                .collect(),
            shared: SegQueue::new(),
            next_seq: AtomicU64::new(0),
            outstanding: AtomicUsize::new(0),
        }
    }

    /// Wrap `task` into a fresh context with the next admission index.
    pub(crate) fn allocate(&self, task: T) -> Pooled<'_, 'r, T> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let slot = match self.take_free() {
            Some(mut slot) => {
                // SAFETY: a free slot is referenced by nobody but this call.
                unsafe { slot.0.as_mut().occupy(task, seq) };
                slot
            }
            None => Slot::boxed(Context::occupied(task, seq)),
        };
        self.outstanding.fetch_add(1, Ordering::Relaxed);
        Pooled {
            slot: slot.0,
            pool: self,
            _marker: PhantomData,
        }
    }

    /// Number of contexts handed out and not yet returned.
    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Relaxed)
    }

    fn local(&self) -> &Mutex<Vec<Slot<'r, T>>> {
        let idx = rayon::current_thread_index().unwrap_or(0) % self.local.len();
        &self.local[idx]
    }

    fn take_free(&self) -> Option<Slot<'r, T>> {
        self.local().lock().pop().or_else(|| self.shared.pop())
    }

    fn recycle(&self, slot: Slot<'r, T>) {
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
        let mut local = self.local().lock();
        if local.len() < LOCAL_CAPACITY {
            local.push(slot);
        } else {
            drop(local);
            self.shared.push(slot);
        }
    }
}

impl<T> Drop for ContextPool<'_, T> {
    fn drop(&mut self) {
        let local = self.local.iter_mut().flat_map(|list| list.get_mut().drain(..));
        for Slot(ptr) in local.chain(core::iter::from_fn(|| self.shared.pop())) {
            // SAFETY: free slots were leaked from a `Box` in `Slot::boxed` and
            // nobody else references them.
            drop(unsafe { Box::from_raw(ptr.as_ptr()) });
        }
    }
}

/// Owning handle to a pooled context. Dropping it drops the task and returns
/// the slot to its pool.
pub(crate) struct Pooled<'p, 'r, T: Send + Sync> {
    slot: NonNull<Context<'r, T>>,
    pool: &'p ContextPool<'r, T>,
    _marker: PhantomData<Context<'r, T>>,
}

// SAFETY: the handle owns its context exclusively apart from the shared reads
// `Context` is designed for; `T: Send + Sync` makes both moving and sharing it
// across workers sound.
unsafe impl<T: Send + Sync> Send for Pooled<'_, '_, T> {}
// SAFETY: see above.
unsafe impl<T: Send + Sync> Sync for Pooled<'_, '_, T> {}

impl<'r, T: Send + Sync> Deref for Pooled<'_, 'r, T> {
    type Target = Context<'r, T>;

    fn deref(&self) -> &Self::Target {
        // SAFETY: the slot stays allocated for as long as the handle lives.
        unsafe { self.slot.as_ref() }
    }
}

impl<T: Send + Sync> Pooled<'_, '_, T> {
    /// Destroy the context and give its task back.
    pub(crate) fn into_task(mut self) -> T {
        // SAFETY: the handle is the only reference left to the context.
        let task = unsafe { self.slot.as_mut().vacate() };
        task.expect("Pooled::into_task")
    }
}

impl<T: Send + Sync + fmt::Debug> fmt::Debug for Pooled<'_, '_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T: Send + Sync> Drop for Pooled<'_, '_, T> {
    fn drop(&mut self) {
        // SAFETY: the handle is the only reference left to the context.
        drop(unsafe { self.slot.as_mut().vacate() });
        self.pool.recycle(Slot(self.slot));
    }
}
