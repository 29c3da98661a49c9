//! Swappable hardware backend behind one fixed transmit/timing contract.
//!
//! [`Backend`] is a closed set. Selecting a backend means constructing the
//! variant and handing it to [`Bsp::new`]; there is no runtime re-selection
//! API, so the binding can never change after construction. [`Bsp`] owns the
//! chosen backend and forwards the uniform contract: `init`, `transmit`,
//! `flush`, `now`, `sleep_until`, `shutdown`.
//!
//! Before `init`, the facade is inert: `transmit` accepts zero bytes,
//! `flush` has nothing to wait on, and the simulated clock reads 0.

pub mod config;
pub mod hw;
pub mod sim;

use thiserror::Error;

use crate::backend::config::BackendConfig;
use crate::backend::hw::{MmioBackend, MmioClock};
use crate::backend::sim::SimBackend;
use crate::clock::HostClock;
use crate::trace::warn;

/// Transmit/timing backend implementations.
pub enum Backend {
    /// Host-runnable simulation: internal ring, drain worker, byte sink.
    Simulated(SimBackend),
    /// Memory-mapped UART and timer on real hardware.
    RealDevice(MmioBackend),
}

/// Failure to bring the transmit path up.
#[derive(Debug, Error)]
pub enum InitError {
    /// A worker thread (sim drain worker or drain pump) could not be spawned.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        /// Thread name that was requested.
        name: &'static str,
        source: std::io::Error,
    },
}

/// Board-support facade: owns the selected backend and exposes the uniform
/// transmit/timing contract.
///
/// # Lifecycle
///
/// `new` → `init` → (`transmit` | `flush` | `now` | `sleep_until` |
/// `clock`)* → `shutdown`. `init` runs exactly once; a second call panics.
///
/// # Example
///
/// ```
/// use rhea::backend::config::BackendConfig;
/// use rhea::backend::sim::SimBackend;
/// use rhea::backend::{Backend, Bsp};
///
/// let sim = SimBackend::new().with_sink(Box::new(std::io::sink()));
/// let mut bsp = Bsp::new(Backend::Simulated(sim));
/// bsp.init(&BackendConfig::default())?;
/// assert!(bsp.transmit(b"ping"));
/// bsp.flush();
/// bsp.shutdown();
/// # Ok::<(), rhea::backend::InitError>(())
/// ```
pub struct Bsp {
    backend: Backend,
    initialized: bool,
}

impl Bsp {
    /// Binds the facade to a backend. The variant is fixed from here on.
    #[must_use]
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            initialized: false,
        }
    }

    /// Applies the configuration and brings the backend up.
    ///
    /// # Errors
    ///
    /// Returns [`InitError`] if the simulated backend cannot spawn its
    /// worker thread. The real-device path cannot fail.
    ///
    /// # Panics
    ///
    /// Panics on a second call. Re-initialization is a programmer error,
    /// not a runtime condition to recover from.
    pub fn init(&mut self, config: &BackendConfig) -> Result<(), InitError> {
        assert!(!self.initialized, "Bsp::init called twice");
        match &mut self.backend {
            Backend::Simulated(sim) => sim.init(config)?,
            Backend::RealDevice(hw) => hw.init(config),
        }
        self.initialized = true;
        Ok(())
    }

    /// Queues bytes for transmission without blocking.
    ///
    /// Returns `true` only if every byte was accepted. On `false` the
    /// accepted prefix stays queued; use
    /// [`transmit_partial`](Self::transmit_partial) to learn the exact count
    /// and retry the remainder without duplicating bytes.
    pub fn transmit(&mut self, bytes: &[u8]) -> bool {
        self.transmit_partial(bytes) == bytes.len()
    }

    /// Queues bytes for transmission, returning how many were accepted.
    ///
    /// Accepts zero bytes before `init`.
    pub fn transmit_partial(&mut self, bytes: &[u8]) -> usize {
        if !self.initialized {
            warn!("transmit before init; no bytes accepted");
            return 0;
        }
        match &mut self.backend {
            Backend::Simulated(sim) => sim.transmit(bytes),
            Backend::RealDevice(hw) => hw.transmit(bytes),
        }
    }

    /// Blocks the calling thread until every previously accepted byte has
    /// been fully emitted. No-op before `init`.
    pub fn flush(&mut self) {
        if !self.initialized {
            return;
        }
        match &mut self.backend {
            Backend::Simulated(sim) => sim.flush(),
            Backend::RealDevice(hw) => hw.flush(),
        }
    }

    /// Current tick count. The simulated backend reads 0 before `init`.
    #[must_use]
    pub fn now(&self) -> u64 {
        match &self.backend {
            Backend::Simulated(sim) => sim.now(),
            Backend::RealDevice(hw) => hw.now(),
        }
    }

    /// Waits until `now() >= target`. Sleeping on the simulated backend,
    /// busy-waiting on the real device.
    pub fn sleep_until(&self, target: u64) {
        match &self.backend {
            Backend::Simulated(sim) => sim.sleep_until(target),
            Backend::RealDevice(hw) => hw.sleep_until(target),
        }
    }

    /// Shareable timing handle, so the application can schedule against the
    /// same clock while something else (typically the drain pump) owns the
    /// `Bsp` itself.
    ///
    /// # Panics
    ///
    /// Panics before `init` on the simulated backend: the tick epoch does
    /// not exist yet.
    #[must_use]
    pub fn clock(&self) -> Clock {
        match &self.backend {
            Backend::Simulated(sim) => {
                Clock::Host(sim.clock().expect("clock() before init: tick epoch unset"))
            }
            Backend::RealDevice(hw) => Clock::Mmio(hw.clock()),
        }
    }

    /// Graceful stop, consuming the facade.
    ///
    /// Simulated: signals the worker to stop, lets it drain the remaining
    /// bytes, joins it. Real device: drains the transmitter.
    pub fn shutdown(mut self) {
        match &mut self.backend {
            Backend::Simulated(sim) => sim.shutdown(),
            Backend::RealDevice(hw) => {
                if self.initialized {
                    hw.flush();
                }
            }
        }
    }
}

/// Cheap-to-copy timing handle decoupled from `Bsp` ownership.
#[derive(Debug, Clone, Copy)]
pub enum Clock {
    /// Host monotonic clock (simulated backend).
    Host(HostClock),
    /// Free-running MMIO counter (real-device backend).
    Mmio(MmioClock),
}

impl Clock {
    /// Current tick count.
    #[must_use]
    pub fn now(&self) -> u64 {
        match self {
            Clock::Host(host) => host.now_ticks(),
            Clock::Mmio(mmio) => mmio.now(),
        }
    }

    /// Waits until `now() >= target`; sleeping for [`Clock::Host`],
    /// busy-waiting for [`Clock::Mmio`].
    pub fn sleep_until(&self, target: u64) {
        match self {
            Clock::Host(host) => host.sleep_until(target),
            Clock::Mmio(mmio) => mmio.sleep_until(target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    #[should_panic(expected = "Bsp::init called twice")]
    fn test_reinit_panics() {
        let sim = SimBackend::new().with_sink(Box::new(std::io::sink()));
        let mut bsp = Bsp::new(Backend::Simulated(sim));
        bsp.init(&BackendConfig::default()).unwrap();
        let _ = bsp.init(&BackendConfig::default());
    }

    #[test]
    #[should_panic(expected = "clock() before init")]
    fn test_clock_before_init_panics() {
        let bsp = Bsp::new(Backend::Simulated(SimBackend::new()));
        let _ = bsp.clock();
    }

    #[test]
    fn test_facade_inert_before_init() {
        let mut bsp = Bsp::new(Backend::Simulated(SimBackend::new()));
        assert!(!bsp.transmit(b"x"));
        assert_eq!(bsp.transmit_partial(b"xyz"), 0);
        bsp.flush();
        assert_eq!(bsp.now(), 0);
    }

    #[test]
    fn test_empty_transmit_always_complete() {
        let sim = SimBackend::new().with_sink(Box::new(std::io::sink()));
        let mut bsp = Bsp::new(Backend::Simulated(sim));
        bsp.init(&BackendConfig::default()).unwrap();
        assert!(bsp.transmit(b""));
        bsp.shutdown();
    }

    #[test]
    fn test_clock_outlives_bsp_ownership() {
        let sim = SimBackend::new().with_sink(Box::new(std::io::sink()));
        let mut bsp = Bsp::new(Backend::Simulated(sim));
        bsp.init(&BackendConfig::default()).unwrap();

        let clock = bsp.clock();
        let t0 = clock.now();
        let handle = std::thread::spawn(move || bsp.shutdown());

        std::thread::sleep(Duration::from_millis(5));
        assert!(clock.now() >= t0);
        handle.join().unwrap();
    }

    #[test]
    fn test_sleep_until_advances_sim_clock() {
        let sim = SimBackend::new().with_sink(Box::new(std::io::sink()));
        let mut bsp = Bsp::new(Backend::Simulated(sim));
        bsp.init(&BackendConfig::default()).unwrap();

        let target = bsp.now() + 15; // 15 ms at the default 1 kHz
        bsp.sleep_until(target);
        assert!(bsp.now() >= target);
        bsp.shutdown();
    }
}
