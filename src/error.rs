//! Error types returned by the driver.

use core::fmt::Debug;

/// A configuration the driver refuses to run with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The hx711 only supports gains of 128, 64 and 32.
    #[error("unsupported gain {0}, expected 128, 64 or 32")]
    InvalidGain(u16),
    /// The ready timeout must be non-zero, otherwise every read times out.
    #[error("ready timeout must be non-zero")]
    ZeroTimeout,
    /// The poll interval must be non-zero, otherwise the wait is unbounded.
    #[error("poll interval must be non-zero")]
    ZeroPollInterval,
}

/// Errors from the hx711 driver, generic over the pin error `E`.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum Error<E: Debug> {
    /// Invalid driver configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// The clock line could not be driven low while setting up the driver.
    #[error("failed to set up the clock line: {0:?}")]
    Setup(E),
    /// The data line never signalled a finished conversion.
    #[error("hx711 not ready before timeout")]
    Timeout,
    /// Bad argument, e.g. zero samples or a zero scale. Hardware is never touched.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// A conversion was requested while the chip is powered down.
    #[error("hx711 is powered down")]
    PoweredDown,
    /// A pin operation failed in the middle of a transaction.
    #[error("pin error during transaction: {0:?}")]
    Pin(E),
}

impl<E: Debug> Error<E> {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Timeout)
    }
}
