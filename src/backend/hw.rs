//! Memory-mapped register contract for the real-device backend.
//!
//! Everything here talks to device registers through [`RegBlock`], a
//! bounds-checked volatile window. The access rules are the ones the device
//! sheet would impose:
//!
//! - every register access is `read_volatile`/`write_volatile`; no access is
//!   ever elided, merged, or reordered by the compiler
//! - write-1-to-clear (W1C) status bits are acknowledged by writing the mask
//!   itself, never by read-modify-write
//! - read-modify-write of control registers happens only during `init`,
//!   while the device is quiescent and no interrupt path is live
//! - a barrier follows every register write; on a hosted build this is
//!   `compiler_fence(SeqCst)` standing in for the target's data memory
//!   barrier instruction
//!
//! # Register map
//!
//! ```text
//! UART block                          TIMER block
//! 0x00  TXDATA    WO  transmit byte   0x00  COUNT_LO  RO  counter bits 31:0
//! 0x04  STATUS        bit0 TX_EMPTY   0x04  COUNT_HI  RO  counter bits 63:32
//!                     (RO), bit1      0x08  CTRL          bit0 ENABLE
//!                     TX_COMPLETE
//!                     (W1C)
//! 0x08  CTRL          bit0 ENABLE,
//!                     bit1 IRQ_EN
//! 0x0C  BAUD_DIV  RW  16x oversample divisor
//! ```

use std::ptr;
use std::sync::atomic::{Ordering, compiler_fence};
use std::{hint, thread};

use crate::backend::config::BackendConfig;

/// UART register offsets and bit masks, in bytes from the block base.
pub mod uart {
    /// Transmit data register (write-only).
    pub const TXDATA: usize = 0x00;
    /// Status register.
    pub const STATUS: usize = 0x04;
    /// Control register.
    pub const CTRL: usize = 0x08;
    /// Baud divisor register.
    pub const BAUD_DIV: usize = 0x0C;

    /// Transmitter can accept a byte (read-only).
    pub const STATUS_TX_EMPTY: u32 = 1 << 0;
    /// Transmission finished (write 1 to clear).
    pub const STATUS_TX_COMPLETE: u32 = 1 << 1;

    /// Enables the peripheral.
    pub const CTRL_ENABLE: u32 = 1 << 0;
    /// Enables transmit interrupts.
    pub const CTRL_IRQ_EN: u32 = 1 << 1;
}

/// Timer register offsets and bit masks, in bytes from the block base.
pub mod timer {
    /// Low 32 bits of the free-running counter (read-only).
    pub const COUNT_LO: usize = 0x00;
    /// High 32 bits of the free-running counter (read-only).
    pub const COUNT_HI: usize = 0x04;
    /// Control register.
    pub const CTRL: usize = 0x08;

    /// Starts the counter.
    pub const CTRL_ENABLE: u32 = 1 << 0;
}

/// Reference clock feeding the UART baud generator.
pub const UART_REF_CLK_HZ: u32 = 48_000_000;

/// Bounds-checked volatile window over a block of 32-bit registers.
///
/// Copyable: a copy is just another window onto the same registers, which is
/// how a register block behaves on hardware.
#[derive(Debug, Clone, Copy)]
pub struct RegBlock {
    base: *mut u32,
    words: usize,
}

// SAFETY: the block is a raw window; it carries no thread-affine state.
// Serializing concurrent access to the underlying registers is part of the
// validity contract given to `new`.
unsafe impl Send for RegBlock {}

impl RegBlock {
    /// Creates a window over `words` consecutive 32-bit registers at `base`.
    ///
    /// # Safety
    ///
    /// `base` must be non-null, 4-byte aligned, and valid for volatile reads
    /// and writes of `words * 4` bytes for as long as any copy of the block
    /// is in use. If copies end up on multiple threads, the caller must
    /// serialize access per the device's rules.
    #[must_use]
    pub unsafe fn new(base: *mut u32, words: usize) -> Self {
        Self { base, words }
    }

    fn word_index(&self, off: usize) -> usize {
        debug_assert_eq!(off % 4, 0, "register offset must be word aligned");
        debug_assert!(off / 4 < self.words, "register offset out of range");
        off / 4
    }

    /// Volatile read of the register at byte offset `off`.
    #[must_use]
    pub fn read(&self, off: usize) -> u32 {
        let idx = self.word_index(off);
        // SAFETY: idx < words, and the constructor contract makes the
        // address valid for a volatile read.
        unsafe { ptr::read_volatile(self.base.add(idx)) }
    }

    /// Volatile write of the register at byte offset `off`, followed by a
    /// barrier so the write is ordered before anything that depends on the
    /// device having seen it. Hosted stand-in for a DMB instruction.
    pub fn write(&self, off: usize, value: u32) {
        let idx = self.word_index(off);
        // SAFETY: idx < words, and the constructor contract makes the
        // address valid for a volatile write.
        unsafe { ptr::write_volatile(self.base.add(idx), value) }
        compiler_fence(Ordering::SeqCst);
    }
}

/// Shareable reading end of the MMIO timer.
#[derive(Debug, Clone, Copy)]
pub struct MmioClock {
    timer: RegBlock,
}

impl MmioClock {
    #[must_use]
    pub fn new(timer: RegBlock) -> Self {
        Self { timer }
    }

    /// Current counter value assembled from the two 32-bit halves.
    ///
    /// The high half is read before and after the low half; a mismatch means
    /// the counter carried between the reads, so the pair is retried. Without
    /// the re-read a carry could pair a stale high half with a wrapped low
    /// half and jump the clock by 2^32 ticks.
    #[must_use]
    pub fn now(&self) -> u64 {
        loop {
            let hi = self.timer.read(timer::COUNT_HI);
            let lo = self.timer.read(timer::COUNT_LO);
            let hi2 = self.timer.read(timer::COUNT_HI);
            if hi == hi2 {
                return (u64::from(hi) << 32) | u64::from(lo);
            }
        }
    }

    /// Busy-waits until `now() >= target`.
    ///
    /// Burns CPU for the whole wait, with a yield every few rounds so the
    /// host scheduler is not starved. Where an OS timer is available the
    /// host clock's sleeping wait is the better tool.
    pub fn sleep_until(&self, target: u64) {
        let mut polls: u32 = 0;
        while self.now() < target {
            hint::spin_loop();
            polls = polls.wrapping_add(1);
            if polls % 64 == 0 {
                thread::yield_now();
            }
        }
    }
}

/// UART + timer backend over injected register windows.
///
/// The register blocks are injected at construction; nothing here owns a
/// global device instance. On a hosted build the windows point at plain
/// memory and the register traffic can be inspected by tests.
pub struct MmioBackend {
    uart: RegBlock,
    clock: MmioClock,
}

impl MmioBackend {
    /// Binds the backend to its UART and timer register blocks.
    #[must_use]
    pub fn new(uart: RegBlock, timer: RegBlock) -> Self {
        Self {
            uart,
            clock: MmioClock::new(timer),
        }
    }

    /// Programs the baud divisor, enables the UART with transmit interrupts,
    /// and starts the timer.
    ///
    /// The CTRL update is a read-modify-write. That is allowed here and only
    /// here: init runs while the device is quiescent, so no interrupt or
    /// other core can touch the register between the read and the write.
    pub fn init(&mut self, config: &BackendConfig) {
        // Baud::MAX_BPS caps the rate at REF_CLK/16, so 16 * baud fits in
        // u32 and the divisor is at least 1.
        let divisor = UART_REF_CLK_HZ / (16 * config.baud.bits_per_sec());
        self.uart.write(uart::BAUD_DIV, divisor);

        let ctrl = self.uart.read(uart::CTRL);
        self.uart
            .write(uart::CTRL, ctrl | uart::CTRL_ENABLE | uart::CTRL_IRQ_EN);

        self.clock.timer.write(timer::CTRL, timer::CTRL_ENABLE);
    }

    /// Writes bytes to the transmit register while the device reports room.
    ///
    /// Returns the number of bytes accepted. Stops at the first byte for
    /// which `TX_EMPTY` is clear; the caller retries the remainder.
    pub fn transmit(&mut self, bytes: &[u8]) -> usize {
        for (i, &byte) in bytes.iter().enumerate() {
            if self.uart.read(uart::STATUS) & uart::STATUS_TX_EMPTY == 0 {
                return i;
            }
            self.uart.write(uart::TXDATA, u32::from(byte));
        }
        bytes.len()
    }

    /// Polls until the transmitter is idle, then acknowledges completion.
    pub fn flush(&mut self) {
        while self.uart.read(uart::STATUS) & uart::STATUS_TX_EMPTY == 0 {
            hint::spin_loop();
        }
        // W1C: write exactly the mask. A read-modify-write would write back
        // every other W1C bit that happened to read as set, acknowledging
        // events nobody has handled.
        self.uart.write(uart::STATUS, uart::STATUS_TX_COMPLETE);
    }

    /// Current tick count from the free-running counter.
    #[must_use]
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Busy-waits until the counter reaches `target`.
    pub fn sleep_until(&self, target: u64) {
        self.clock.sleep_until(target);
    }

    /// Shareable handle onto the timer.
    #[must_use]
    pub fn clock(&self) -> MmioClock {
        self.clock
    }
}
