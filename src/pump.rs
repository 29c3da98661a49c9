//! Main-loop drain pump: ring consumer feeding the backend.
//!
//! The pump owns the consumer role of the application ring. It pops bytes
//! in small batches, forwards them through
//! [`Bsp::transmit_partial`](crate::backend::Bsp::transmit_partial), and
//! carries any unaccepted remainder into the next round, so no byte is lost
//! or duplicated between the ring and the backend.
//!
//! # Thread as interrupt handler
//!
//! On the host, an OS thread stands in for the interrupt-driven producer
//! that would feed the ring on real hardware. The substitution changes the
//! scheduling model, not the protocol: a real interrupt handler has no
//! scheduler-visible thread and must never call `push_blocking`, `flush`,
//! or `sleep_until`. The pump is the main-loop side and may block freely.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::backend::{Bsp, InitError};
use crate::spsc::Consumer;
use crate::trace::{debug, info, warn};

/// Bytes popped per forwarding round.
const BATCH: usize = 32;

/// Nap while the ring is empty.
const IDLE_NAP: Duration = Duration::from_micros(100);

/// Nap after a round in which the backend accepted nothing.
const STALL_NAP: Duration = Duration::from_micros(200);

/// Consecutive zero-accept rounds tolerated during the final drain before
/// the pump gives up on a backend that stopped accepting.
const MAX_DRAIN_STALLS: u32 = 1_000;

/// Handle to the running pump thread.
pub struct DrainPump {
    handle: Option<JoinHandle<(Bsp, DrainStats)>>,
    running: Arc<AtomicBool>,
}

/// Forwarding totals, returned by [`DrainPump::stop`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainStats {
    /// Bytes accepted by the backend.
    pub bytes_forwarded: u64,
    /// Rounds in which the backend accepted only part of a batch.
    pub partial_retries: u64,
}

impl DrainPump {
    /// Spawns the pump thread ("rhea-drain") over the consumer end of the
    /// ring and the backend facade.
    ///
    /// The `running` flag stays owned by the caller and should be `true`
    /// when the pump starts; the pump only ever reads it. Clearing it from
    /// anywhere stops the pump after its current round completes
    /// (cooperative cancellation, never mid-batch).
    ///
    /// # Errors
    ///
    /// Returns [`InitError::Spawn`] if the pump thread cannot be created.
    pub fn spawn<const N: usize>(
        rx: Consumer<u8, N>,
        bsp: Bsp,
        running: Arc<AtomicBool>,
    ) -> Result<Self, InitError> {
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("rhea-drain".into())
            .spawn(move || run(rx, bsp, flag))
            .map_err(|source| InitError::Spawn {
                name: "rhea-drain",
                source,
            })?;
        Ok(Self {
            handle: Some(handle),
            running,
        })
    }

    /// Clears the running flag and joins the pump.
    ///
    /// Before exiting, the pump forwards whatever is left in the ring,
    /// flushes the backend, and hands the backend back for shutdown.
    ///
    /// # Panics
    ///
    /// Panics if the pump thread panicked.
    #[must_use]
    pub fn stop(mut self) -> (Bsp, DrainStats) {
        self.running.store(false, Ordering::Relaxed);
        let handle = self.handle.take().expect("pump already stopped");
        handle.join().expect("drain pump thread panicked")
    }
}

impl Drop for DrainPump {
    fn drop(&mut self) {
        // best-effort stop without joining; stop() is the orderly path
        self.running.store(false, Ordering::Relaxed);
    }
}

/// Tops the batch buffer up from the ring.
fn refill<const N: usize>(rx: &Consumer<u8, N>, buf: &mut [u8; BATCH], pending: &mut usize) {
    while *pending < BATCH {
        match rx.pop() {
            Some(byte) => {
                buf[*pending] = byte;
                *pending += 1;
            }
            None => break,
        }
    }
}

fn run<const N: usize>(
    rx: Consumer<u8, N>,
    mut bsp: Bsp,
    running: Arc<AtomicBool>,
) -> (Bsp, DrainStats) {
    debug!("drain pump started");
    let mut stats = DrainStats::default();
    let mut buf = [0u8; BATCH];
    let mut pending = 0usize;

    while running.load(Ordering::Relaxed) {
        refill(&rx, &mut buf, &mut pending);
        if pending == 0 {
            thread::sleep(IDLE_NAP);
            continue;
        }

        let accepted = bsp.transmit_partial(&buf[..pending]);
        stats.bytes_forwarded += accepted as u64;
        if accepted < pending {
            stats.partial_retries += 1;
            // keep the unaccepted tail at the front for the next round
            buf.copy_within(accepted..pending, 0);
            pending -= accepted;
            if accepted == 0 {
                thread::sleep(STALL_NAP);
            }
        } else {
            pending = 0;
        }
    }

    // final drain: forward everything already popped or still buffered, then
    // flush, so stopping the pump never strands accepted bytes
    let mut stalls: u32 = 0;
    loop {
        refill(&rx, &mut buf, &mut pending);
        if pending == 0 {
            break;
        }

        let accepted = bsp.transmit_partial(&buf[..pending]);
        stats.bytes_forwarded += accepted as u64;
        if accepted == pending {
            pending = 0;
            stalls = 0;
            continue;
        }

        stats.partial_retries += 1;
        buf.copy_within(accepted..pending, 0);
        pending -= accepted;
        if accepted == 0 {
            stalls += 1;
            if stalls > MAX_DRAIN_STALLS {
                warn!(left_behind = pending, "backend stopped accepting; abandoning final drain");
                break;
            }
            thread::sleep(STALL_NAP);
        } else {
            stalls = 0;
        }
    }
    bsp.flush();

    info!(
        forwarded = stats.bytes_forwarded,
        partial_retries = stats.partial_retries,
        "drain pump exiting"
    );
    (bsp, stats)
}
