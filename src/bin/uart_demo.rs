//! End-to-end transmit path demo on the simulated backend.
//!
//! A producer thread feeds the ring, the drain pump plays the main loop,
//! and the simulated backend prints to stdout at UART pace. The burst path
//! uses the non-blocking push an interrupt handler would be restricted to;
//! the greeting and the timed reports use the blocking conveniences
//! available to a task context.
//!
//! Usage:
//!     cargo run --bin uart_demo

use std::process::exit;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::Duration;

use rhea::backend::config::BackendConfig;
use rhea::backend::sim::SimBackend;
use rhea::backend::{Backend, Bsp, Clock, InitError};
use rhea::pump::DrainPump;
use rhea::spsc::{self, Producer};

const RING_SLOTS: usize = 64;

/// Report grid: 200 ms at the default 1 kHz tick rate.
const REPORT_PERIOD_TICKS: u64 = 200;

fn main() {
    rhea::init_tracing();

    if let Err(e) = run() {
        eprintln!("uart_demo: {e}");
        exit(1);
    }
}

fn run() -> Result<(), InitError> {
    let mut bsp = Bsp::new(Backend::Simulated(SimBackend::new()));
    bsp.init(&BackendConfig::default())?;
    let clock = bsp.clock();

    let (tx, rx) = spsc::channel::<u8, RING_SLOTS>();
    let running = Arc::new(AtomicBool::new(true));
    let pump = DrainPump::spawn(rx, bsp, Arc::clone(&running))?;

    let producer = thread::Builder::new()
        .name("rhea-producer".into())
        .spawn(move || produce(tx, clock))
        .expect("failed to spawn producer thread");

    let dropped = producer.join().expect("producer thread panicked");

    let (bsp, stats) = pump.stop();
    bsp.shutdown();

    eprintln!(
        "forwarded {} bytes, {} partial retries, {} dropped at the ring",
        stats.bytes_forwarded, stats.partial_retries, dropped
    );
    Ok(())
}

/// Producer role: greeting, jittered telemetry bursts, three timed reports.
/// Returns the number of bytes the ring refused.
fn produce(tx: Producer<u8, RING_SLOTS>, clock: Clock) -> u64 {
    push_line(&tx, "hello from rhea (non-blocking uart)\n");

    for seq in 0..10u32 {
        let line = format!("sample seq={seq}\n");
        for &byte in line.as_bytes() {
            if !tx.push(byte) {
                // drop-new: the report is cut short rather than blocking
                break;
            }
        }
        let jitter_ms = 5 + rand::random::<u64>() % 20;
        thread::sleep(Duration::from_millis(jitter_ms));
    }

    let mut target = clock.now();
    for _ in 0..3 {
        target += REPORT_PERIOD_TICKS;
        clock.sleep_until(target);
        push_line(&tx, &format!("ticks={}\n", clock.now()));
    }

    tx.overflow_count()
}

fn push_line(tx: &Producer<u8, RING_SLOTS>, line: &str) {
    for &byte in line.as_bytes() {
        tx.push_blocking(byte);
    }
}
