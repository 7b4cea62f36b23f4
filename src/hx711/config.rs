//! Gain selection and driver settings.

use core::time::Duration;

use crate::error::ConfigError;

/// Default time to wait for the data line to go low.
/// Covers the 10 SPS rate (100 ms per conversion) with a wide margin.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(1);
/// Default delay between two samples of the data line while waiting.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_micros(100);
/// Default settle time after the clock line is pulled low on power up.
pub const DEFAULT_POWER_SETTLE: Duration = Duration::from_millis(1);
/// Default guard interval for [`ReadyStrategy::Debounced`].
pub const DEFAULT_READY_GUARD: Duration = Duration::from_millis(10);

/// Channel and gain for the *next* conversion.
///
/// The discriminant is the number of extra clock pulses sent after the
/// 24 data bits. This is fixed by the chip.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GainMode {
    /// Channel A, gain 128
    #[default]
    A128 = 1, // extra pulses
    /// Channel B, gain 32
    B32 = 2,
    /// Channel A, gain 64
    A64 = 3,
}

impl GainMode {
    /// Extra clock pulses after the 24 data bits.
    pub const fn pulses(self) -> u8 {
        self as u8
    }

    /// The amplifier gain factor.
    pub const fn factor(self) -> u16 {
        match self {
            GainMode::A128 => 128,
            GainMode::A64 => 64,
            GainMode::B32 => 32,
        }
    }
}

impl TryFrom<u16> for GainMode {
    type Error = ConfigError;

    fn try_from(gain: u16) -> Result<Self, Self::Error> {
        match gain {
            128 => Ok(GainMode::A128),
            64 => Ok(GainMode::A64),
            32 => Ok(GainMode::B32),
            other => Err(ConfigError::InvalidGain(other)),
        }
    }
}

/// How the driver decides a conversion is ready to be clocked out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReadyStrategy {
    /// Poll the data line until it reads low.
    #[default]
    Poll,
    /// Wait `guard` after the previous conversion was clocked out, then poll.
    /// For boards where the data line settles slowly.
    Debounced { guard: Duration },
}

impl ReadyStrategy {
    /// Debounced polling with [`DEFAULT_READY_GUARD`].
    pub const fn debounced() -> Self {
        ReadyStrategy::Debounced {
            guard: DEFAULT_READY_GUARD,
        }
    }
}

/// Whether each read is wrapped in a power cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReadMode {
    /// Leave the chip running between reads.
    #[default]
    Continuous,
    /// Power down, settle and power up before every conversion.
    /// Much slower, but some boards read more stable values this way.
    PowerCycled,
}

/// Driver settings. Fixed for the lifetime of the driver, apart from the gain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    pub gain: GainMode,
    pub ready: ReadyStrategy,
    pub read_mode: ReadMode,
    /// Upper bound on the wait for the data line to go low.
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
    pub power_settle: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gain: GainMode::A128,
            ready: ReadyStrategy::Poll,
            read_mode: ReadMode::Continuous,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            power_settle: DEFAULT_POWER_SETTLE,
        }
    }
}

impl Config {
    pub fn with_gain(mut self, gain: GainMode) -> Self {
        self.gain = gain;
        self
    }

    pub fn with_ready(mut self, ready: ReadyStrategy) -> Self {
        self.ready = ready;
        self
    }

    pub fn with_read_mode(mut self, read_mode: ReadMode) -> Self {
        self.read_mode = read_mode;
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_power_settle(mut self, settle: Duration) -> Self {
        self.power_settle = settle;
        self
    }

    /// Check the settings before any pin is touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ready_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }

    /// Number of data line polls that fit in the ready timeout, at least one.
    pub(crate) fn max_polls(&self) -> u128 {
        (self.ready_timeout.as_nanos() / self.poll_interval.as_nanos()).max(1)
    }
}
