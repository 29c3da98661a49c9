//! Host-side workbench for an embedded UART transmit path.
//!
//! Three pieces, wired the way the firmware would wire them:
//!
//! - a lock-free SPSC ring buffer ([`spsc`]) as the only synchronization
//!   boundary between an interrupt-like producer and a main-loop consumer;
//! - a swappable hardware backend ([`backend`]) behind one fixed contract,
//!   either a host simulation or a memory-mapped UART/timer register block;
//! - a monotonic tick clock ([`clock`]) with wraparound-safe arithmetic.
//!
//! The [`pump`] module supplies the main-loop consumer that bridges the
//! ring to the backend.
//!
//! # Architecture
//!
//! ```text
//! producer thread         pump thread             sim worker / device
//! (interrupt stand-in)    (main-loop stand-in)
//!       │                       │                        │
//!       │ push (lock-free)      │ pop + transmit         │ sink / wire
//!       ▼                       ▼                        ▼
//!   [ SPSC ring ] ────────> [ DrainPump ] ───────> [ Bsp / Backend ]
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//!
//! use rhea::backend::config::BackendConfig;
//! use rhea::backend::sim::SimBackend;
//! use rhea::backend::{Backend, Bsp};
//! use rhea::pump::DrainPump;
//! use rhea::spsc;
//!
//! let sim = SimBackend::new().with_sink(Box::new(std::io::sink()));
//! let mut bsp = Bsp::new(Backend::Simulated(sim));
//! bsp.init(&BackendConfig::default())?;
//!
//! let (tx, rx) = spsc::channel::<u8, 64>();
//! let running = Arc::new(AtomicBool::new(true));
//! let pump = DrainPump::spawn(rx, bsp, Arc::clone(&running))?;
//!
//! // producer role: non-blocking pushes, drop-new on overflow
//! for &byte in b"telemetry\n" {
//!     let _ = tx.push(byte);
//! }
//!
//! let (bsp, stats) = pump.stop();
//! bsp.shutdown();
//! assert_eq!(stats.bytes_forwarded + tx.overflow_count(), 10);
//! # Ok::<(), rhea::backend::InitError>(())
//! ```

pub mod backend;
pub mod clock;
pub mod pump;
pub mod spsc;

mod trace;

pub use trace::init_tracing;

pub use backend::config::{BackendConfig, Baud};
pub use backend::{Backend, Bsp, Clock, InitError};
pub use clock::{ConfigError, HostClock, TickRate};
pub use pump::{DrainPump, DrainStats};
pub use spsc::{Consumer, Producer};
