//! Core SPSC ring algorithm.
//!
//! Indices are stored already masked to the capacity, so every loaded value
//! is a valid slot index. One slot is permanently reserved to keep full and
//! empty distinguishable without a separate occupancy counter:
//!
//! - empty:    `head == tail`
//! - full:     `(head + 1) & MASK == tail`
//! - occupied: `(head - tail) & MASK`, at most `N - 1`
//!
//! # Memory Layout
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │ ProducerState   (head, overflow)       │ 64-byte aligned
//! ├────────────────────────────────────────┤
//! │ ConsumerState   (tail)                 │ 64-byte aligned
//! ├────────────────────────────────────────┤
//! │ Padding         (false sharing guard)  │
//! ├────────────────────────────────────────┤
//! │ Buffer: [Slot<T>; N]                   │
//! └────────────────────────────────────────┘
//! ```
//!
//! # Ordering contract
//!
//! - `push`: the payload write happens before the Release store of `head`;
//!   the Acquire load of `tail` happens before the fullness check.
//! - `pop`: the Acquire load of `head` happens before the payload read; the
//!   payload read happens before the Release store of `tail`.
//!
//! The ring cannot verify the role split itself; the safe handles in
//! [`channel`](mod@super::channel) enforce single-producer single-consumer.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// One element of backing storage. Payload validity is tracked by the
/// head/tail indices, not by the slot itself.
#[repr(C)]
struct Slot<T> {
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Producer-side indices, padded to a cache line of their own.
#[repr(C)]
#[repr(align(64))]
struct ProducerState {
    /// Next slot to write. Always `< N`.
    head: AtomicUsize,
    /// Items discarded under the drop-new policy.
    overflow: AtomicU64,
}

/// Consumer-side index, padded to a cache line of its own.
#[repr(C)]
#[repr(align(64))]
struct ConsumerState {
    /// Next slot to read. Always `< N`.
    tail: AtomicUsize,
}

/// Bounded SPSC ring over `N` slots, `N - 1` of them usable.
///
/// `N` must be a power of two and at least 2; [`channel`](mod@super::channel)
/// rejects anything else at compile time.
#[repr(C)]
pub(crate) struct Ring<T, const N: usize> {
    producer: ProducerState,
    consumer: ConsumerState,
    _padding: [u8; 64],
    buffer: [Slot<T>; N],
}

// SAFETY: the ring is shared between exactly one producer thread and one
// consumer thread (enforced by the channel handles). Index updates are
// atomic, and payload accesses are ordered by the Release/Acquire pairs in
// push and pop, so no slot is ever read and written concurrently.
unsafe impl<T: Send, const N: usize> Sync for Ring<T, N> {}

// SAFETY: moving the ring moves ownership of any buffered items, which is
// sound for T: Send.
unsafe impl<T: Send, const N: usize> Send for Ring<T, N> {}

impl<T, const N: usize> Ring<T, N> {
    const MASK: usize = N - 1;

    pub(crate) fn new() -> Self {
        Self {
            producer: ProducerState {
                head: AtomicUsize::new(0),
                overflow: AtomicU64::new(0),
            },
            consumer: ConsumerState {
                tail: AtomicUsize::new(0),
            },
            _padding: [0; 64],
            // SAFETY: an array of slots whose payloads are MaybeUninit does
            // not require initialization.
            buffer: unsafe { MaybeUninit::<[Slot<T>; N]>::uninit().assume_init() },
        }
    }

    /// Attempts to push an item without blocking.
    ///
    /// Returns the item back if the ring is full, leaving all state
    /// untouched; the caller decides the overflow policy. The overflow
    /// counter is not modified here (see [`bump_overflow`](Self::bump_overflow)).
    ///
    /// # Safety
    ///
    /// Must only be called from the single producer role. Concurrent calls
    /// from two threads race on the written slot.
    pub(crate) unsafe fn push(&self, item: T) -> Result<(), T> {
        let head = self.producer.head.load(Ordering::Relaxed);
        // Acquire pairs with the Release store of tail in pop: the slot at
        // tail is only reusable once the consumer's payload read completed.
        let tail = self.consumer.tail.load(Ordering::Acquire);

        if (head + 1) & Self::MASK == tail {
            return Err(item);
        }

        // SAFETY: head is a valid index (always masked), and the slot at
        // head is unreachable from the consumer until the Release store
        // below. The producer role guarantees no concurrent writer.
        unsafe {
            (*self.buffer[head].value.get()).write(item);
        }

        // Release pairs with the Acquire load of head in pop, publishing the
        // payload write above before the slot becomes visible.
        self.producer.head.store((head + 1) & Self::MASK, Ordering::Release);
        Ok(())
    }

    /// Attempts to pop an item without blocking.
    ///
    /// Returns `None` on an empty ring, with no state change.
    ///
    /// # Safety
    ///
    /// Must only be called from the single consumer role. Concurrent calls
    /// from two threads race on the read slot.
    pub(crate) unsafe fn pop(&self) -> Option<T> {
        let tail = self.consumer.tail.load(Ordering::Relaxed);
        // Acquire pairs with the Release store of head in push: the payload
        // write is visible before the slot is observed occupied.
        let head = self.producer.head.load(Ordering::Acquire);

        if tail == head {
            return None;
        }

        // SAFETY: tail != head, so the slot at tail holds an initialized
        // payload published by push. The consumer role guarantees no
        // concurrent reader, and the slot is not reused until the Release
        // store below.
        let item = unsafe { (*self.buffer[tail].value.get()).assume_init_read() };

        // Release pairs with the Acquire load of tail in push, so the
        // producer only reuses the slot after the read above completed.
        self.consumer.tail.store((tail + 1) & Self::MASK, Ordering::Release);
        Some(item)
    }

    /// Occupied slot count. Monitoring only: exact when both roles are
    /// quiescent, otherwise a snapshot that may be stale by the time it is
    /// observed.
    pub(crate) fn len(&self) -> usize {
        let head = self.producer.head.load(Ordering::Acquire);
        let tail = self.consumer.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail) & Self::MASK
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn is_full(&self) -> bool {
        self.len() == N - 1
    }

    /// Items discarded under the drop-new policy since construction.
    pub(crate) fn overflow_count(&self) -> u64 {
        self.producer.overflow.load(Ordering::Relaxed)
    }

    /// Records one discarded item. Producer role only; Relaxed is enough
    /// because the counter orders nothing.
    pub(crate) fn bump_overflow(&self) {
        self.producer.overflow.fetch_add(1, Ordering::Relaxed);
    }
}

impl<T, const N: usize> Drop for Ring<T, N> {
    fn drop(&mut self) {
        // Exclusive access here: run destructors for anything still
        // buffered, in FIFO position order.
        let head = *self.producer.head.get_mut();
        let mut tail = *self.consumer.tail.get_mut();
        while tail != head {
            // SAFETY: slots in [tail, head) hold initialized payloads that
            // were pushed and never popped.
            unsafe {
                self.buffer[tail].value.get_mut().assume_init_drop();
            }
            tail = (tail + 1) & Self::MASK;
        }
    }
}
