//! End-to-end integration tests for the transmit path.
//!
//! These tests verify the complete flow:
//! 1. A producer thread pushes bytes into the SPSC ring
//! 2. The drain pump pops them and forwards them to the Bsp
//! 3. The backend emits them (sim worker to a sink, or MMIO registers)
//! 4. The observed byte sequence matches what the producer sent
//!
//! # Running with tracing
//!
//! To see full debug output, run with the tracing feature and no capture:
//! ```bash
//! RUST_LOG=rhea=trace cargo test --features tracing -- --nocapture
//! ```

use std::io::{self, Write};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, Once};
use std::thread;

use rhea::backend::config::{BackendConfig, Baud};
use rhea::backend::sim::SimBackend;
use rhea::backend::{Backend, Bsp};
use rhea::pump::DrainPump;
use rhea::spsc;

static INIT_TRACING: Once = Once::new();

/// Initialize tracing for tests (only once).
fn init_test_tracing() {
    INIT_TRACING.call_once(|| {
        rhea::init_tracing();
    });
}

/// Byte sink shared between the sim worker and the test assertions.
#[derive(Clone)]
struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl SharedSink {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Builds an initialized simulated Bsp writing into the returned sink.
fn sim_bsp(baud: Baud) -> (Bsp, SharedSink) {
    let sink = SharedSink::new();
    let sim = SimBackend::new().with_sink(Box::new(sink.clone()));
    let mut bsp = Bsp::new(Backend::Simulated(sim));
    bsp.init(&BackendConfig::default().with_baud(baud)).expect("backend init");
    (bsp, sink)
}

/// 5 us per byte: fast enough that draining stays in the millisecond range.
fn fast_baud() -> Baud {
    Baud::new(2_000_000).unwrap()
}

// =============================================================================
// Full transmit path over the simulated backend
// =============================================================================

#[test]
fn end_to_end_bytes_arrive_in_order() {
    init_test_tracing();

    let (bsp, sink) = sim_bsp(fast_baud());
    let (tx, rx) = spsc::channel::<u8, 64>();
    let running = Arc::new(AtomicBool::new(true));
    let pump = DrainPump::spawn(rx, bsp, Arc::clone(&running)).unwrap();

    let payload: Vec<u8> = (0..500u32).map(|i| (i % 256) as u8).collect();
    let expected = payload.clone();

    let producer = thread::spawn(move || {
        for &byte in &payload {
            tx.push_blocking(byte);
        }
    });

    producer.join().unwrap();
    let (bsp, stats) = pump.stop();
    bsp.shutdown();

    assert_eq!(sink.contents(), expected);
    assert_eq!(stats.bytes_forwarded, expected.len() as u64);
}

#[test]
fn overflow_accounted_when_producer_outpaces_drain() {
    init_test_tracing();

    // tiny app ring in front of a backend whose internal ring caps what it
    // can absorb during the burst:
    // a 2000-byte burst must see drops, and every drop must be counted
    let (bsp, sink) = sim_bsp(fast_baud());
    let (tx, rx) = spsc::channel::<u8, 8>();
    let running = Arc::new(AtomicBool::new(true));
    let pump = DrainPump::spawn(rx, bsp, Arc::clone(&running)).unwrap();

    let producer = thread::spawn(move || {
        let mut sent = Vec::new();
        for i in 0..2000u32 {
            let byte = (i % 256) as u8;
            if tx.push(byte) {
                sent.push(byte);
            }
        }
        (sent, tx.overflow_count())
    });

    let (sent, dropped) = producer.join().unwrap();
    let (bsp, stats) = pump.stop();
    bsp.shutdown();

    assert!(dropped > 0, "burst should have overrun the ring");
    assert_eq!(sent.len() as u64 + dropped, 2000);

    // conservation and order: exactly the accepted bytes reach the sink,
    // exactly once, in push order
    assert_eq!(sink.contents(), sent);
    assert_eq!(stats.bytes_forwarded, sent.len() as u64);
}

#[test]
fn pump_retries_partial_accepts_without_loss() {
    init_test_tracing();

    // more bytes than the backend's internal ring can hold at once, so the
    // pump must observe partial accepts and carry the remainders
    let (bsp, sink) = sim_bsp(Baud::B115200);
    let (tx, rx) = spsc::channel::<u8, 4096>();
    let running = Arc::new(AtomicBool::new(true));
    let pump = DrainPump::spawn(rx, bsp, Arc::clone(&running)).unwrap();

    let payload: Vec<u8> = (0..1200u32).map(|i| (i * 7 % 251) as u8).collect();
    for &byte in &payload {
        tx.push_blocking(byte);
    }

    let (bsp, stats) = pump.stop();
    bsp.shutdown();

    assert_eq!(sink.contents(), payload);
    assert_eq!(stats.bytes_forwarded, payload.len() as u64);
    assert!(stats.partial_retries >= 1, "internal ring never filled");
}

#[test]
fn stop_sequence_preserves_tail_bytes() {
    init_test_tracing();

    let (bsp, sink) = sim_bsp(fast_baud());
    let (tx, rx) = spsc::channel::<u8, 256>();
    let running = Arc::new(AtomicBool::new(true));
    let pump = DrainPump::spawn(rx, bsp, Arc::clone(&running)).unwrap();

    for &byte in b"last words" {
        tx.push_blocking(byte);
    }

    // stop immediately: the pump's final drain and the worker's post-stop
    // drain must hand the tail all the way to the sink
    let (bsp, _stats) = pump.stop();
    bsp.shutdown();

    assert_eq!(sink.contents(), b"last words");
}

#[test]
fn flush_blocks_until_wire_drained() {
    init_test_tracing();

    // 100 us per byte: the wire lags transmit by about a millisecond
    let (mut bsp, sink) = sim_bsp(Baud::new(100_000).unwrap());
    assert!(bsp.transmit(b"0123456789"));
    bsp.flush();
    assert_eq!(sink.contents(), b"0123456789");
    bsp.shutdown();
}

// =============================================================================
// Real-device backend over a fake register bank
// =============================================================================

#[test]
fn mmio_path_forwards_through_registers() {
    use rhea::backend::hw::{MmioBackend, RegBlock, uart};

    init_test_tracing();

    let mut uart_bank = [0u32; 4];
    let mut timer_bank = [0u32; 3];
    let uart_regs = unsafe { RegBlock::new(uart_bank.as_mut_ptr(), uart_bank.len()) };
    let timer_regs = unsafe { RegBlock::new(timer_bank.as_mut_ptr(), timer_bank.len()) };
    let dev = uart_regs;

    let mut bsp = Bsp::new(Backend::RealDevice(MmioBackend::new(uart_regs, timer_regs)));
    bsp.init(&BackendConfig::default()).unwrap();
    dev.write(uart::STATUS, uart::STATUS_TX_EMPTY); // device reports ready

    let (tx, rx) = spsc::channel::<u8, 64>();
    let running = Arc::new(AtomicBool::new(true));
    let pump = DrainPump::spawn(rx, bsp, Arc::clone(&running)).unwrap();

    for &byte in b"mmio" {
        tx.push_blocking(byte);
    }

    let (bsp, stats) = pump.stop();
    // no second flush: the fake bank records the W1C acknowledge from the
    // pump's own flush, which clears the ready bit a real device would re-raise
    drop(bsp);

    assert_eq!(stats.bytes_forwarded, 4);
    assert_eq!(dev.read(uart::TXDATA), u32::from(b'o'));
}

// =============================================================================
// Latency smoke test
// =============================================================================

/// Ring round-trip time with two channels ping-ponging one value.
///
/// Run with:
/// ```bash
/// cargo test --release --test tx_path -- --nocapture --ignored
/// ```
#[test]
#[ignore] // Run explicitly with --ignored
fn ring_round_trip_latency() {
    const WARMUP: usize = 10_000;
    const SAMPLES: usize = 100_000;

    let (ping_tx, ping_rx) = spsc::channel::<u64, 1024>();
    let (pong_tx, pong_rx) = spsc::channel::<u64, 1024>();

    let responder = thread::spawn(move || {
        for _ in 0..(WARMUP + SAMPLES) {
            loop {
                if let Some(v) = ping_rx.pop() {
                    while !pong_tx.push(v) {
                        std::hint::spin_loop();
                    }
                    break;
                }
                std::hint::spin_loop();
            }
        }
    });

    let mut rtts = Vec::with_capacity(SAMPLES);
    for i in 0..(WARMUP + SAMPLES) as u64 {
        let start = minstant::Instant::now();
        while !ping_tx.push(i) {
            std::hint::spin_loop();
        }
        loop {
            if pong_rx.pop().is_some() {
                break;
            }
            std::hint::spin_loop();
        }
        if i >= WARMUP as u64 {
            rtts.push(start.elapsed().as_nanos() as u64);
        }
    }
    responder.join().unwrap();

    rtts.sort_unstable();
    println!("\n========== RING RTT ==========");
    println!("min:    {} ns", rtts[0]);
    println!("median: {} ns", rtts[SAMPLES / 2]);
    println!("p99:    {} ns", rtts[SAMPLES * 99 / 100]);
    println!("max:    {} ns", rtts[SAMPLES - 1]);
    println!("==============================\n");
}
