//! Typed configuration for backend initialization.

use std::num::NonZeroU32;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::{ConfigError, TickRate};

/// UART baud rate in bits per second, guaranteed in `1..=`[`MAX_BPS`](Self::MAX_BPS).
///
/// The upper bound is the fastest line rate the hardware's 16x-oversampling
/// baud generator can produce from its 48 MHz reference clock (divisor 1);
/// anything faster would program a divisor of zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baud(NonZeroU32);

impl Baud {
    pub const B9600: Baud = Baud::from_raw(9_600);
    pub const B19200: Baud = Baud::from_raw(19_200);
    pub const B38400: Baud = Baud::from_raw(38_400);
    pub const B57600: Baud = Baud::from_raw(57_600);
    pub const B115200: Baud = Baud::from_raw(115_200);

    /// Fastest supported line rate: 48 MHz / 16.
    pub const MAX_BPS: u32 = 3_000_000;

    const fn from_raw(rate: u32) -> Self {
        assert!(rate <= Baud::MAX_BPS, "baud rate must not exceed 3 Mbaud");
        match NonZeroU32::new(rate) {
            Some(v) => Self(v),
            None => panic!("baud rate must be non-zero"),
        }
    }

    /// Creates a baud rate from bits per second.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroBaud`] if `rate` is 0, or
    /// [`ConfigError::BaudTooFast`] if it exceeds [`Self::MAX_BPS`].
    pub fn new(rate: u32) -> Result<Self, ConfigError> {
        if rate > Self::MAX_BPS {
            return Err(ConfigError::BaudTooFast);
        }
        NonZeroU32::new(rate).map(Self).ok_or(ConfigError::ZeroBaud)
    }

    /// Bits per second.
    #[must_use]
    pub const fn bits_per_sec(self) -> u32 {
        self.0.get()
    }

    /// Wire time of one byte under 8N1 framing (start + 8 data + stop =
    /// 10 bit times). The simulated backend sleeps this long per byte.
    #[must_use]
    pub fn byte_delay(self) -> Duration {
        Duration::from_nanos(10 * 1_000_000_000 / u64::from(self.0.get()))
    }
}

impl std::fmt::Display for Baud {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} baud", self.0)
    }
}

/// Settings applied by [`Bsp::init`](crate::backend::Bsp::init).
///
/// **Default**: 115200 baud, 1 kHz tick rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// UART line rate. Drives the baud divisor on real hardware and the
    /// per-byte delay in simulation.
    pub baud: Baud,
    /// Tick counter frequency reported by the backend clock.
    pub tick_rate: TickRate,
}

impl BackendConfig {
    /// Replaces the baud rate.
    #[must_use]
    pub const fn with_baud(mut self, baud: Baud) -> Self {
        self.baud = baud;
        self
    }

    /// Replaces the tick rate.
    #[must_use]
    pub const fn with_tick_rate(mut self, tick_rate: TickRate) -> Self {
        self.tick_rate = tick_rate;
        self
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            baud: Baud::B115200,
            tick_rate: TickRate::HZ_1000,
        }
    }
}
