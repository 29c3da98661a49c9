//! Lock-free single-producer single-consumer ring buffer.
//!
//! The ring is the only synchronization boundary between an interrupt-like
//! producer and a main-loop consumer: one side pushes, the other pops, and
//! neither ever takes a lock or blocks the other.
//!
//! # Overview
//!
//! - [`channel()`] - builds a connected [`Producer`]/[`Consumer`] pair
//! - [`Producer`] - write end; non-blocking [`push`](Producer::push) with a
//!   drop-new overflow policy, blocking [`push_blocking`](Producer::push_blocking)
//!   for non-interrupt contexts
//! - [`Consumer`] - read end; non-blocking [`pop`](Consumer::pop)
//!
//! Capacity is a const generic, checked at compile time to be a power of two
//! and at least 2. One slot stays permanently reserved so that full and empty
//! are distinguishable from the indices alone; a ring of `N` slots holds
//! `N - 1` items.
//!
//! # Overflow policy
//!
//! When the ring is full, [`Producer::push`] discards the *incoming* item and
//! increments a monitoring counter (drop-new). The alternative policy of
//! overwriting the *oldest* buffered item (drop-old) keeps the freshest data
//! at the cost of consumer-visible gaps; it is not implemented here.
//!
//! # Example
//!
//! ```
//! use rhea::spsc;
//!
//! let (tx, rx) = spsc::channel::<u64, 8>();
//! assert!(tx.push(7));
//! assert_eq!(rx.pop(), Some(7));
//! assert_eq!(rx.pop(), None);
//! ```

pub(crate) mod ring;

pub mod channel;

pub use channel::{Consumer, Producer, channel};
