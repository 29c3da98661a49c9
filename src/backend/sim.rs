//! Host-runnable simulated backend.
//!
//! Models the UART transmit path with plain host facilities: accepted bytes
//! go into an internal SPSC ring, a dedicated worker thread drains them to
//! an injectable byte sink with a per-byte delay derived from the configured
//! baud rate, and a [`HostClock`] stands in for the hardware tick counter.
//!
//! The worker keeps draining after the stop flag falls and only exits once
//! the ring is empty, so joining it guarantees that every accepted byte
//! reached the sink.

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::backend::InitError;
use crate::backend::config::BackendConfig;
use crate::clock::HostClock;
use crate::spsc::{self, Consumer, Producer};
use crate::trace::{debug, info, warn};

/// Slot count of the internal byte ring (1023 bytes usable).
const SIM_RING_SLOTS: usize = 1024;

/// Worker nap while the ring is empty.
const IDLE_NAP: Duration = Duration::from_micros(100);

/// Poll interval while `flush` waits on the drained watermark.
const FLUSH_POLL: Duration = Duration::from_millis(1);

/// Counters and the stop flag shared with the worker thread.
struct SimShared {
    running: AtomicBool,
    /// Bytes accepted into the internal ring.
    accepted: AtomicU64,
    /// Bytes fully emitted, including their wire time.
    drained: AtomicU64,
}

/// Simulated UART + timer backend.
pub struct SimBackend {
    tx: Producer<u8, SIM_RING_SLOTS>,
    // both move into the worker at init
    parked_rx: Option<Consumer<u8, SIM_RING_SLOTS>>,
    sink: Option<Box<dyn Write + Send>>,
    shared: Arc<SimShared>,
    worker: Option<JoinHandle<()>>,
    clock: Option<HostClock>,
}

impl SimBackend {
    /// Creates a backend that writes to stdout once initialized.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = spsc::channel::<u8, SIM_RING_SLOTS>();
        Self {
            tx,
            parked_rx: Some(rx),
            sink: Some(Box::new(io::stdout())),
            shared: Arc::new(SimShared {
                running: AtomicBool::new(false),
                accepted: AtomicU64::new(0),
                drained: AtomicU64::new(0),
            }),
            worker: None,
            clock: None,
        }
    }

    /// Replaces the byte sink. Takes effect at init; calling this after init
    /// has no effect because the worker already owns the previous sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn Write + Send>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Bytes accepted but not yet fully emitted by the worker.
    #[must_use]
    pub fn tx_pending(&self) -> u64 {
        let accepted = self.shared.accepted.load(Ordering::Relaxed);
        let drained = self.shared.drained.load(Ordering::Relaxed);
        accepted.saturating_sub(drained)
    }

    /// Resets the tick epoch and spawns the drain worker.
    ///
    /// # Errors
    ///
    /// Returns [`InitError::Spawn`] if the worker thread cannot be created.
    pub(crate) fn init(&mut self, config: &BackendConfig) -> Result<(), InitError> {
        let rx = self.parked_rx.take().expect("simulated backend initialized twice");
        let sink = self.sink.take().expect("simulated backend initialized twice");
        let byte_delay = config.baud.byte_delay();
        let shared = Arc::clone(&self.shared);

        self.clock = Some(HostClock::new(config.tick_rate));
        self.shared.running.store(true, Ordering::Release);

        let handle = thread::Builder::new()
            .name("rhea-sim-tx".into())
            .spawn(move || drain_worker(rx, sink, byte_delay, shared))
            .map_err(|source| InitError::Spawn {
                name: "rhea-sim-tx",
                source,
            })?;
        self.worker = Some(handle);

        info!(
            baud = config.baud.bits_per_sec(),
            tick_hz = config.tick_rate.hz(),
            "simulated backend up"
        );
        Ok(())
    }

    /// Pushes bytes into the internal ring, stopping at the first rejection.
    /// Returns the number of bytes accepted.
    pub(crate) fn transmit(&mut self, bytes: &[u8]) -> usize {
        if self.worker.is_none() {
            warn!("transmit before init; no bytes accepted");
            return 0;
        }
        let mut accepted = 0usize;
        for &byte in bytes {
            if !self.tx.push(byte) {
                break;
            }
            accepted += 1;
        }
        if accepted > 0 {
            self.shared.accepted.fetch_add(accepted as u64, Ordering::Relaxed);
        }
        accepted
    }

    /// Blocks until the drained watermark catches up with every byte
    /// accepted so far. No-op before init.
    pub(crate) fn flush(&mut self) {
        let Some(worker) = &self.worker else { return };
        while self.shared.drained.load(Ordering::Relaxed)
            < self.shared.accepted.load(Ordering::Relaxed)
        {
            if worker.is_finished() {
                warn!("sim tx worker gone; flush abandoned");
                return;
            }
            thread::sleep(FLUSH_POLL);
        }
    }

    /// Ticks since init; 0 before init (epoch unset).
    pub(crate) fn now(&self) -> u64 {
        self.clock.map_or(0, |clock| clock.now_ticks())
    }

    /// Sleeps until `now() >= target`. Returns immediately before init.
    pub(crate) fn sleep_until(&self, target: u64) {
        if let Some(clock) = &self.clock {
            clock.sleep_until(target);
        }
    }

    pub(crate) fn clock(&self) -> Option<HostClock> {
        self.clock
    }

    /// Stop, drain, join. The worker exits only once the ring is empty, so
    /// no accepted byte is lost.
    pub(crate) fn shutdown(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        info!(
            drained = self.shared.drained.load(Ordering::Relaxed),
            "simulated backend down"
        );
    }
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SimBackend {
    fn drop(&mut self) {
        // best-effort stop without joining; shutdown() is the orderly path
        self.shared.running.store(false, Ordering::Release);
    }
}

fn drain_worker(
    rx: Consumer<u8, SIM_RING_SLOTS>,
    mut sink: Box<dyn Write + Send>,
    byte_delay: Duration,
    shared: Arc<SimShared>,
) {
    debug!("sim tx worker started");
    loop {
        match rx.pop() {
            Some(byte) => {
                if sink.write_all(&[byte]).and_then(|()| sink.flush()).is_err() {
                    warn!("sim sink write failed");
                }
                // model the wire time before declaring the byte emitted
                thread::sleep(byte_delay);
                shared.drained.fetch_add(1, Ordering::Relaxed);
            }
            None => {
                if !shared.running.load(Ordering::Acquire) {
                    break;
                }
                thread::sleep(IDLE_NAP);
            }
        }
    }
    debug!("sim tx worker exiting");
}
