//! A no-std driver for the hx711 load cell amplifier, built on the
//! embedded-hal 1.0 digital and delay traits.
//!
//! ```ignore
//! use hx711_loadcell::{hx711::HX711, LoadCell};
//!
//! let mut load_sensor = HX711::new(sck, dt, delay)?;
//! // zero the readings
//! load_sensor.tare(16)?;
//! load_sensor.set_scale(420.0)?;
//! let grams = load_sensor.read_averaged(5)?;
//! ```

#![cfg_attr(not(test), no_std)]

pub mod error;
pub mod hx711;

#[cfg(test)]
mod sim;

pub use error::{ConfigError, Error};

/// Operations common to load cell ADCs.
pub trait LoadCell {
    type Offset;
    type Scale;
    type Error;

    /// One conversion, offset relative to the tare.
    fn read_raw(&mut self) -> Result<i32, Self::Error>;

    /// Mean of `times` offset readings. Fails if `times` is zero.
    fn read_raw_averaged(&mut self, times: usize) -> Result<Self::Scale, Self::Error>;

    /// Read the value after applying offset and scale.
    fn read(&mut self) -> Result<Self::Scale, Self::Error>;

    /// [`LoadCell::read_raw_averaged`] divided by the scale.
    fn read_averaged(&mut self, times: usize) -> Result<Self::Scale, Self::Error>;

    /// Zero the load cell offset by averaging `num_samples` readings.
    fn tare(&mut self, num_samples: usize) -> Result<(), Self::Error>;

    /// Whether a conversion can be read right now, without blocking.
    fn is_ready(&mut self) -> Result<bool, Self::Error>;

    /// Get the load cell offset.
    fn get_offset(&self) -> Self::Offset;

    /// Set the scale (AKA calibrate the scale).
    /// Use this to ensure that 1kg ~ 1kg
    fn set_scale(&mut self, scale: Self::Scale) -> Result<(), Self::Error>;

    /// Get the scale.
    fn get_scale(&self) -> Self::Scale;
}
