//! Tick-domain time arithmetic and the host-side clock source.
//!
//! A tick counter is a free-running unsigned integer that increments at a
//! fixed [`TickRate`] and wraps at its bit width. All arithmetic on tick
//! values lives here so that every caller agrees on the same conversion and
//! wraparound rules.
//!
//! # Overview
//!
//! - [`TickRate`] - validated ticks-per-second rate with widening conversions
//! - [`elapsed_ticks`] / [`elapsed_ticks32`] - wraparound-safe elapsed time
//! - [`HostClock`] - monotonic host clock that reports time in ticks

use std::num::NonZeroU32;
use std::thread;
use std::time::Duration;

use minstant::Instant;
use serde::{Deserialize, Serialize};

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Validation error for rate-valued configuration.
///
/// Returned by the fallible constructors ([`TickRate::from_hz`],
/// [`Baud::new`](crate::backend::config::Baud::new)). Out-of-range rates are
/// rejected at construction instead of checked at every use site, so a value
/// that exists is always safe to convert with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Tick rate of 0 Hz was requested.
    #[error("tick rate must be non-zero")]
    ZeroTickRate,
    /// Tick rate above [`TickRate::MAX_HZ`] was requested.
    #[error("tick rate must not exceed 1 GHz")]
    TickRateTooFast,
    /// Baud rate of 0 was requested.
    #[error("baud rate must be non-zero")]
    ZeroBaud,
    /// Baud rate above [`Baud::MAX_BPS`](crate::backend::config::Baud::MAX_BPS)
    /// was requested.
    #[error("baud rate must not exceed 3 Mbaud")]
    BaudTooFast,
}

/// Ticks-per-second rate of a counter, guaranteed in `1..=`[`MAX_HZ`](Self::MAX_HZ).
///
/// The upper bound keeps one tick at least one nanosecond long, so
/// [`period_ns`](Self::period_ns) can never truncate to zero. Conversions
/// widen to `u128` before multiplying so that no intermediate product can
/// overflow the narrower tick or nanosecond domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickRate(NonZeroU32);

impl TickRate {
    /// 1 kHz: one tick per millisecond. The default rate for backend configs.
    pub const HZ_1000: TickRate = TickRate::from_raw(1_000);

    /// Fastest representable rate: 1 GHz, one tick per nanosecond.
    pub const MAX_HZ: u32 = 1_000_000_000;

    const fn from_raw(hz: u32) -> Self {
        assert!(hz <= TickRate::MAX_HZ, "tick rate must not exceed 1 GHz");
        match NonZeroU32::new(hz) {
            Some(v) => Self(v),
            None => panic!("tick rate must be non-zero"),
        }
    }

    /// Creates a rate from a frequency in Hz.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroTickRate`] if `hz` is 0, or
    /// [`ConfigError::TickRateTooFast`] if it exceeds [`Self::MAX_HZ`].
    pub fn from_hz(hz: u32) -> Result<Self, ConfigError> {
        if hz > Self::MAX_HZ {
            return Err(ConfigError::TickRateTooFast);
        }
        NonZeroU32::new(hz).map(Self).ok_or(ConfigError::ZeroTickRate)
    }

    /// Frequency in Hz.
    #[must_use]
    pub const fn hz(self) -> u32 {
        self.0.get()
    }

    /// Length of one tick in nanoseconds, truncated.
    ///
    /// Rates that do not divide a second evenly lose the fractional
    /// nanosecond (3 Hz reports 333_333_333 ns).
    #[must_use]
    pub const fn period_ns(self) -> u64 {
        NANOS_PER_SEC / self.0.get() as u64
    }

    /// Converts a tick count to a [`Duration`].
    #[must_use]
    pub fn ticks_to_duration(self, ticks: u64) -> Duration {
        let nanos = u128::from(ticks) * u128::from(self.period_ns());
        let secs = (nanos / u128::from(NANOS_PER_SEC)) as u64;
        let rem = (nanos % u128::from(NANOS_PER_SEC)) as u32;
        Duration::new(secs, rem)
    }

    /// Converts a [`Duration`] to whole ticks, rounding down.
    ///
    /// A duration shorter than one tick period maps to 0. Saturates at
    /// `u64::MAX` for durations beyond the counter range.
    #[must_use]
    pub fn duration_to_ticks(self, d: Duration) -> u64 {
        let ticks = d.as_nanos() / u128::from(self.period_ns());
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }
}

impl Default for TickRate {
    fn default() -> Self {
        Self::HZ_1000
    }
}

impl std::fmt::Display for TickRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} Hz", self.0)
    }
}

/// Elapsed ticks between two readings of a 64-bit counter.
///
/// Wrapping subtraction keeps the result correct across a counter wrap, as
/// long as less than one full counter period separates the two readings.
#[must_use]
pub const fn elapsed_ticks(start: u64, now: u64) -> u64 {
    now.wrapping_sub(start)
}

/// Elapsed ticks between two readings of a 32-bit counter.
///
/// Same wraparound rule as [`elapsed_ticks`], for hardware counters that
/// expose only 32 bits.
#[must_use]
pub const fn elapsed_ticks32(start: u32, now: u32) -> u32 {
    now.wrapping_sub(start)
}

/// Monotonic host clock that reports time as ticks since its epoch.
///
/// The epoch is captured at construction. Readings go through
/// [`TickRate::duration_to_ticks`], so clock readings and standalone
/// conversions can never disagree on rounding.
#[derive(Debug, Clone, Copy)]
pub struct HostClock {
    epoch: Instant,
    rate: TickRate,
}

impl HostClock {
    /// Starts a clock with its epoch at the current instant.
    #[must_use]
    pub fn new(rate: TickRate) -> Self {
        Self { epoch: Instant::now(), rate }
    }

    /// Ticks elapsed since the epoch.
    #[must_use]
    pub fn now_ticks(&self) -> u64 {
        self.rate.duration_to_ticks(self.epoch.elapsed())
    }

    /// Sleeps the calling thread until `now_ticks() >= target`.
    ///
    /// Returns immediately if the target is already in the past. The sleep
    /// re-checks after waking because `thread::sleep` may wake early.
    pub fn sleep_until(&self, target: u64) {
        loop {
            let now = self.now_ticks();
            if now >= target {
                return;
            }
            thread::sleep(self.rate.ticks_to_duration(target - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_rate_rejected() {
        assert!(matches!(TickRate::from_hz(0), Err(ConfigError::ZeroTickRate)));
    }

    #[test]
    fn test_rate_above_1ghz_rejected() {
        // above 1 GHz the tick period would truncate to 0 ns and every
        // duration-to-ticks conversion would divide by zero
        assert!(matches!(
            TickRate::from_hz(1_500_000_000),
            Err(ConfigError::TickRateTooFast)
        ));
        assert!(matches!(
            TickRate::from_hz(TickRate::MAX_HZ + 1),
            Err(ConfigError::TickRateTooFast)
        ));
    }

    #[test]
    fn test_max_rate_converts_cleanly() {
        let rate = TickRate::from_hz(TickRate::MAX_HZ).unwrap();
        assert_eq!(rate.period_ns(), 1);
        assert_eq!(rate.duration_to_ticks(Duration::from_millis(1)), 1_000_000);
        let clock = HostClock::new(rate);
        let _ = clock.now_ticks();
    }

    #[test]
    fn test_period_truncates() {
        let rate = TickRate::from_hz(3).unwrap();
        assert_eq!(rate.period_ns(), 333_333_333);
    }

    #[test]
    fn test_ticks_to_duration_widens() {
        // 100 kHz -> 10 us per tick
        let rate = TickRate::from_hz(100_000).unwrap();
        assert_eq!(rate.ticks_to_duration(1234), Duration::from_nanos(12_340_000));
    }

    #[test]
    fn test_duration_to_ticks_rounds_down() {
        let rate = TickRate::from_hz(100_000).unwrap();
        assert_eq!(rate.duration_to_ticks(Duration::from_millis(5)), 500);
        // one nanosecond short of a tick boundary still rounds down
        assert_eq!(rate.duration_to_ticks(Duration::from_nanos(19_999)), 1);
        assert_eq!(rate.duration_to_ticks(Duration::from_nanos(9_999)), 0);
    }

    #[test]
    fn test_conversion_no_overflow_in_wide_domain() {
        // 1 Hz: period of a full second, large tick counts must not overflow
        let rate = TickRate::from_hz(1).unwrap();
        let d = rate.ticks_to_duration(u64::from(u32::MAX));
        assert_eq!(d.as_secs(), u64::from(u32::MAX));
    }

    #[test]
    fn test_elapsed_wraparound_32() {
        assert_eq!(elapsed_ticks32(0xFFFF_FFFE, 0x0000_0001), 3);
        assert_eq!(elapsed_ticks32(5, 5), 0);
        assert_eq!(elapsed_ticks32(0, 100), 100);
    }

    #[test]
    fn test_elapsed_wraparound_64() {
        assert_eq!(elapsed_ticks(u64::MAX - 1, 1), 3);
        assert_eq!(elapsed_ticks(100, 350), 250);
    }

    #[test]
    fn test_host_clock_monotonic() {
        let clock = HostClock::new(TickRate::from_hz(1_000_000).unwrap());
        let a = clock.now_ticks();
        let b = clock.now_ticks();
        assert!(b >= a);
    }

    #[test]
    fn test_host_clock_sleep_until_reaches_target() {
        let clock = HostClock::new(TickRate::HZ_1000);
        let target = clock.now_ticks() + 20; // 20 ms ahead
        clock.sleep_until(target);
        assert!(clock.now_ticks() >= target);
    }

    #[test]
    fn test_host_clock_sleep_until_past_target_returns() {
        let clock = HostClock::new(TickRate::HZ_1000);
        clock.sleep_until(0);
    }
}
