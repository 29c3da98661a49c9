//! SPSC ring throughput and latency benchmark.
//!
//! Usage:
//!     cargo run --release --bin ring_bench
//!
//! Environment variables:
//!     PRODUCER_CPU=0  Pin producer to CPU 0 (default: 0)
//!     CONSUMER_CPU=2  Pin consumer to CPU 2 (default: 2)

use std::env;
use std::hint;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rhea::spsc;

const RING_SLOTS: usize = 1 << 16;
const ITERATIONS: usize = 1 << 24;

type Payload = u64;

fn get_cpu_affinity() -> (Option<usize>, Option<usize>) {
    let producer_cpu = env::var("PRODUCER_CPU")
        .ok()
        .and_then(|s| s.parse().ok())
        .or(Some(0));
    let consumer_cpu = env::var("CONSUMER_CPU")
        .ok()
        .and_then(|s| s.parse().ok())
        .or(Some(2));
    (producer_cpu, consumer_cpu)
}

fn pin_to_cpu(cpu: Option<usize>) {
    if let Some(id) = cpu {
        core_affinity::set_for_current(core_affinity::CoreId { id });
    }
}

fn bench_throughput(producer_cpu: Option<usize>, consumer_cpu: Option<usize>) {
    let (tx, rx) = spsc::channel::<Payload, RING_SLOTS>();

    let ready = Arc::new(AtomicBool::new(false));
    let ready_clone = ready.clone();

    // Consumer thread
    let consumer_thread = std::thread::spawn(move || {
        pin_to_cpu(consumer_cpu);

        // Signal ready
        ready_clone.store(true, Ordering::Release);

        for expected in 0..ITERATIONS as Payload {
            loop {
                if let Some(value) = rx.pop() {
                    if value != expected {
                        panic!("data corruption: expected {expected}, got {value}");
                    }
                    break;
                }
                hint::spin_loop();
            }
        }
    });

    // Wait for consumer to be ready
    while !ready.load(Ordering::Acquire) {
        hint::spin_loop();
    }

    pin_to_cpu(producer_cpu);

    let start = Instant::now();

    for i in 0..ITERATIONS as Payload {
        // a rejected push re-attempts the same value, so order is preserved
        while !tx.push(i) {
            hint::spin_loop();
        }
    }

    consumer_thread.join().unwrap();
    let elapsed = start.elapsed();

    let ops_per_ms = ITERATIONS as u128 * 1_000_000 / elapsed.as_nanos();
    println!("{} ops/ms", ops_per_ms);
}

fn bench_rtt(producer_cpu: Option<usize>, consumer_cpu: Option<usize>) {
    let (q1_tx, q1_rx) = spsc::channel::<Payload, RING_SLOTS>();
    let (q2_tx, q2_rx) = spsc::channel::<Payload, RING_SLOTS>();

    let ready = Arc::new(AtomicBool::new(false));
    let ready_clone = ready.clone();

    // Responder thread
    let responder = std::thread::spawn(move || {
        pin_to_cpu(consumer_cpu);

        // Signal ready
        ready_clone.store(true, Ordering::Release);

        for _ in 0..ITERATIONS {
            loop {
                if let Some(value) = q1_rx.pop() {
                    while !q2_tx.push(value) {
                        hint::spin_loop();
                    }
                    break;
                }
                hint::spin_loop();
            }
        }
    });

    // Wait for responder to be ready
    while !ready.load(Ordering::Acquire) {
        hint::spin_loop();
    }

    pin_to_cpu(producer_cpu);

    let start = Instant::now();

    for i in 0..ITERATIONS as Payload {
        while !q1_tx.push(i) {
            hint::spin_loop();
        }
        loop {
            if q2_rx.pop().is_some() {
                break;
            }
            hint::spin_loop();
        }
    }

    let elapsed = start.elapsed();
    responder.join().unwrap();

    let rtt_ns = elapsed.as_nanos() / ITERATIONS as u128;
    println!("{} ns RTT", rtt_ns);
}

fn main() {
    let (producer_cpu, consumer_cpu) = get_cpu_affinity();

    println!("rhea SPSC (slots={}, iters={}):", RING_SLOTS, ITERATIONS);
    bench_throughput(producer_cpu, consumer_cpu);
    bench_rtt(producer_cpu, consumer_cpu);
}
