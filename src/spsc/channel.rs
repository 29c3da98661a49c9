//! Safe producer/consumer handles over the ring core.
//!
//! [`channel`] allocates one [`Ring`] inside an `Arc` and hands back the two
//! role handles. Each handle is `Send` but `!Sync`, so a role can move to
//! another thread but can never be shared between two: the single-producer
//! single-consumer discipline is enforced by the type system instead of by
//! documentation.

use std::cell::Cell;
use std::hint;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::spsc::ring::Ring;

/// Marker that keeps a handle `Send` while removing `Sync`.
type PhantomUnsync = PhantomData<Cell<&'static ()>>;

/// Compile-time capacity validation, surfaced as a const so the assert fires
/// during monomorphization of [`channel`].
struct CapacityCheck<const N: usize>;

impl<const N: usize> CapacityCheck<N> {
    const OK: () = {
        assert!(N.is_power_of_two(), "ring capacity must be a power of two");
        assert!(N >= 2, "ring capacity must be at least 2");
    };
}

/// Creates a connected producer/consumer pair over a ring of `N` slots.
///
/// One slot stays reserved, so the channel holds at most `N - 1` items.
/// `N` that is not a power of two, or is smaller than 2, fails to compile.
#[must_use]
pub fn channel<T: Send, const N: usize>() -> (Producer<T, N>, Consumer<T, N>) {
    let () = CapacityCheck::<N>::OK;

    let ring = Arc::new(Ring::<T, N>::new());
    (
        Producer {
            ring: Arc::clone(&ring),
            _unsync: PhantomData,
        },
        Consumer {
            ring,
            _unsync: PhantomData,
        },
    )
}

/// Write end of the channel. Exactly one exists per ring.
pub struct Producer<T: Send, const N: usize> {
    ring: Arc<Ring<T, N>>,
    _unsync: PhantomUnsync,
}

/// Read end of the channel. Exactly one exists per ring.
pub struct Consumer<T: Send, const N: usize> {
    ring: Arc<Ring<T, N>>,
    _unsync: PhantomUnsync,
}

// Escalating backoff for the blocking push: pure spins first, then yields,
// then short parks to stop burning a core.
const SPIN_LIMIT: u32 = 64;
const YIELD_LIMIT: u32 = 128;
const PARK_INTERVAL: Duration = Duration::from_micros(50);

impl<T: Send, const N: usize> Producer<T, N> {
    /// Pushes an item, discarding it if the ring is full (drop-new policy).
    ///
    /// Returns `true` if the item was enqueued. On `false` the incoming item
    /// has been dropped and the overflow counter incremented; the buffered
    /// contents are untouched. Never blocks, suitable for interrupt-like
    /// contexts.
    #[must_use]
    pub fn push(&self, item: T) -> bool {
        // SAFETY: this handle is the only producer (!Sync, unique per ring).
        match unsafe { self.ring.push(item) } {
            Ok(()) => true,
            Err(rejected) => {
                self.ring.bump_overflow();
                drop(rejected);
                false
            }
        }
    }

    /// Pushes an item, waiting for a free slot if the ring is full.
    ///
    /// The wait escalates from spin hints through yields to short parks and
    /// is unbounded: it returns only once the item is enqueued. Never call
    /// this from an interrupt-equivalent context. Blocking pushes do not
    /// touch the overflow counter.
    pub fn push_blocking(&self, item: T) {
        let mut item = item;
        let mut attempts: u32 = 0;
        loop {
            // SAFETY: this handle is the only producer (!Sync, unique per ring).
            match unsafe { self.ring.push(item) } {
                Ok(()) => return,
                Err(rejected) => item = rejected,
            }
            if attempts < SPIN_LIMIT {
                hint::spin_loop();
            } else if attempts < YIELD_LIMIT {
                thread::yield_now();
            } else {
                thread::park_timeout(PARK_INTERVAL);
            }
            attempts = attempts.saturating_add(1);
        }
    }

    /// Usable capacity: one slot of the backing ring stays reserved.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    /// Occupied item count (monitoring snapshot).
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Whether the next non-blocking push would be rejected (monitoring
    /// snapshot; the consumer may free a slot at any moment).
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    /// Items discarded by the drop-new policy since construction.
    #[must_use]
    pub fn overflow_count(&self) -> u64 {
        self.ring.overflow_count()
    }
}

impl<T: Send, const N: usize> Consumer<T, N> {
    /// Pops the oldest item, or `None` if the ring is empty.
    ///
    /// Never blocks; an empty pop leaves all state unchanged.
    #[must_use]
    pub fn pop(&self) -> Option<T> {
        // SAFETY: this handle is the only consumer (!Sync, unique per ring).
        unsafe { self.ring.pop() }
    }

    /// Usable capacity: one slot of the backing ring stays reserved.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    /// Occupied item count (monitoring snapshot).
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Whether the ring currently holds nothing (monitoring snapshot; the
    /// producer may publish an item at any moment).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Items discarded by the drop-new policy since construction. Readable
    /// from either end.
    #[must_use]
    pub fn overflow_count(&self) -> u64 {
        self.ring.overflow_count()
    }
}
