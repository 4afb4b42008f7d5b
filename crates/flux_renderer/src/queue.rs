//! Fixed-capacity ring buffer shared by producers and consumers.
//!
//! The slot array is split into four regions that always partition it:
//!
//! ```text
//!   reclaim      consume        visible        alloc
//!      |  processing  |    ready     | initializing |   free ...
//! ```
//!
//! Producers claim slots with [`WorkQueue::initialize`], write them, and
//! publish them with [`WorkQueue::ready`]. Consumers take published slots
//! with [`WorkQueue::fetch`] and give them back with [`WorkQueue::release`].
//! Either side may finish out of order: a boundary only advances up to the
//! oldest range of its kind that is still in flight.
//!
//! Boundaries are monotonically increasing counters; the physical slot of a
//! logical index is `index % capacity`.

use std::cell::UnsafeCell;
use std::collections::BTreeSet;
use std::ops::{Index, IndexMut};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

struct QueueState {
    /// Everything before this is free
    reclaim: usize,
    /// First ready slot; [reclaim, consume) is processing
    consume: usize,
    /// End of the ready region; [visible, alloc) is initializing
    visible: usize,
    /// Next slot handed to a producer
    alloc: usize,
    /// Start index of every range claimed but not yet ready
    initializing: BTreeSet<usize>,
    /// Start index of every range fetched but not yet released
    processing: BTreeSet<usize>,
}

/// A lock-protected ring buffer of `T` slots.
///
/// All operations take `&self` and are safe to call from any thread. Slot
/// storage is only reachable through the [`Claim`] and [`Batch`] handles
/// returned by `initialize` and `fetch`, whose ranges never overlap.
///
/// Sharing a queue across threads requires `T: Sync`, since a shared
/// [`Batch`] hands out `&T` to every thread that can see it:
///
/// ```compile_fail
/// use std::cell::Cell;
/// use flux_renderer::WorkQueue;
///
/// fn assert_sync<T: Sync>() {}
/// assert_sync::<WorkQueue<Cell<u32>>>();
/// ```
pub struct WorkQueue<T> {
    slots: Box<[UnsafeCell<T>]>,
    state: Mutex<QueueState>,
    allocated: AtomicUsize,
    available: AtomicUsize,
}

// SAFETY: slot cells are only touched through Claim/Batch handles. The
// bookkeeping under `state` guarantees live handles cover disjoint slots,
// and the lock hand-off in ready/fetch orders a producer's writes before a
// consumer's reads. A shared Batch gives out `&T` on several threads, so
// `T: Sync` is required as well as `T: Send`.
unsafe impl<T: Send + Sync> Sync for WorkQueue<T> {}

impl<T: Default> WorkQueue<T> {
    /// Create a queue with `capacity` default-initialized slots.
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(T::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            slots,
            state: Mutex::new(QueueState {
                reclaim: 0,
                consume: 0,
                visible: 0,
                alloc: 0,
                initializing: BTreeSet::new(),
                processing: BTreeSet::new(),
            }),
            allocated: AtomicUsize::new(0),
            available: AtomicUsize::new(0),
        }
    }
}

impl<T> WorkQueue<T> {
    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slots currently initializing, ready or processing.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Acquire)
    }

    /// Slots currently ready to fetch.
    pub fn available(&self) -> usize {
        self.available.load(Ordering::Acquire)
    }

    /// Claim up to `count` free slots for writing.
    ///
    /// Returns fewer slots (possibly none) when the queue is short on space.
    /// The claim must be handed back through [`WorkQueue::ready`].
    pub fn initialize(&self, count: usize) -> Claim<'_, T> {
        let mut state = self.state.lock();

        let used = state.alloc - state.reclaim;
        let len = count.min(self.capacity() - used);
        let start = state.alloc;
        if len > 0 {
            state.alloc += len;
            state.initializing.insert(start);
            self.allocated.fetch_add(len, Ordering::AcqRel);
        }

        Claim {
            queue: self,
            start,
            len,
        }
    }

    /// Publish a claim whose slots have all been written.
    ///
    /// The ready boundary moves up to the oldest claim still being written,
    /// so slots become visible in the order they were claimed.
    pub fn ready(&self, claim: Claim<'_, T>) {
        debug_assert!(std::ptr::eq(claim.queue, self), "claim from another queue");
        if claim.is_empty() {
            return;
        }

        let mut state = self.state.lock();
        state.initializing.remove(&claim.start);

        let boundary = state.initializing.first().copied().unwrap_or(state.alloc);
        if boundary > state.visible {
            let exposed = boundary - state.visible;
            state.visible = boundary;
            self.available.fetch_add(exposed, Ordering::AcqRel);
        }
    }

    /// Take up to `count` ready slots for reading.
    ///
    /// Returns fewer slots (possibly none) when little is ready. The batch
    /// must be handed back through [`WorkQueue::release`].
    pub fn fetch(&self, count: usize) -> Batch<'_, T> {
        let mut state = self.state.lock();

        let len = count.min(state.visible - state.consume);
        let start = state.consume;
        if len > 0 {
            state.consume += len;
            state.processing.insert(start);
            self.available.fetch_sub(len, Ordering::AcqRel);
        }

        Batch {
            queue: self,
            start,
            len,
        }
    }

    /// Return a fetched batch so its slots can be reused.
    ///
    /// The reclaim boundary moves up to the oldest batch still being read.
    pub fn release(&self, batch: Batch<'_, T>) {
        debug_assert!(std::ptr::eq(batch.queue, self), "batch from another queue");
        if batch.is_empty() {
            return;
        }

        let mut state = self.state.lock();
        state.processing.remove(&batch.start);

        let boundary = state.processing.first().copied().unwrap_or(state.consume);
        if boundary > state.reclaim {
            let freed = boundary - state.reclaim;
            state.reclaim = boundary;
            self.allocated.fetch_sub(freed, Ordering::AcqRel);
        }
    }

    /// Copy as many of `items` as fit into the queue and publish them.
    ///
    /// Returns how many were written.
    pub fn push_slice(&self, items: &[T]) -> usize
    where
        T: Clone,
    {
        let mut claim = self.initialize(items.len());
        let written = claim.len();
        for (slot, item) in claim.iter_mut().zip(items) {
            *slot = item.clone();
        }
        self.ready(claim);
        written
    }

    /// Move up to `max` ready items onto the end of `out`.
    ///
    /// Returns how many were taken.
    pub fn drain_into(&self, out: &mut Vec<T>, max: usize) -> usize
    where
        T: Clone,
    {
        let batch = self.fetch(max);
        let taken = batch.len();
        out.extend(batch.iter().cloned());
        self.release(batch);
        taken
    }

    #[inline]
    fn slot(&self, index: usize) -> *mut T {
        self.slots[index % self.slots.len()].get()
    }
}

/// Slots claimed for writing by [`WorkQueue::initialize`].
///
/// Indexing is relative to the claim: `claim[0]` is its first slot.
///
/// A dropped claim is never published and stalls the queue behind it:
///
/// ```compile_fail
/// #![deny(unused_must_use)]
/// let queue = flux_renderer::WorkQueue::<u32>::new(4);
/// queue.initialize(2);
/// ```
#[must_use = "hand the claim back with `WorkQueue::ready`"]
pub struct Claim<'q, T> {
    queue: &'q WorkQueue<T>,
    start: usize,
    len: usize,
}

impl<'q, T> Claim<'q, T> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Physical index of the first slot in the ring.
    pub fn start(&self) -> usize {
        slot_start(self.start, self.queue.capacity())
    }

    /// Mutable access to every claimed slot, in order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        let queue = self.queue;
        let start = self.start;
        // SAFETY: each index maps to a distinct cell owned by this claim
        (0..self.len).map(move |i| unsafe { &mut *queue.slot(start + i) })
    }
}

impl<T> Index<usize> for Claim<'_, T> {
    type Output = T;

    fn index(&self, i: usize) -> &T {
        assert!(i < self.len, "claim index {i} out of range (len {})", self.len);
        // SAFETY: the slot belongs to this claim until it is made ready
        unsafe { &*self.queue.slot(self.start + i) }
    }
}

impl<T> IndexMut<usize> for Claim<'_, T> {
    fn index_mut(&mut self, i: usize) -> &mut T {
        assert!(i < self.len, "claim index {i} out of range (len {})", self.len);
        // SAFETY: the slot belongs to this claim and `&mut self` is unique
        unsafe { &mut *self.queue.slot(self.start + i) }
    }
}

/// Slots taken for reading by [`WorkQueue::fetch`].
#[must_use = "hand the batch back with `WorkQueue::release`"]
pub struct Batch<'q, T> {
    queue: &'q WorkQueue<T>,
    start: usize,
    len: usize,
}

impl<'q, T> Batch<'q, T> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Physical index of the first slot in the ring.
    pub fn start(&self) -> usize {
        slot_start(self.start, self.queue.capacity())
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len).map(move |i| &self[i])
    }
}

impl<T> Index<usize> for Batch<'_, T> {
    type Output = T;

    fn index(&self, i: usize) -> &T {
        assert!(i < self.len, "batch index {i} out of range (len {})", self.len);
        // SAFETY: no producer can reclaim the slot until this batch is released
        unsafe { &*self.queue.slot(self.start + i) }
    }
}

fn slot_start(logical: usize, capacity: usize) -> usize {
    if capacity == 0 {
        0
    } else {
        logical % capacity
    }
}
