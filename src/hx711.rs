//! Bit-banged driver for the hx711 24-bit load cell ADC.

use core::fmt::Debug;
use core::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use log::{debug, trace, warn};

use crate::error::Error;
use crate::LoadCell;

mod config;
mod shared;

pub use config::{
    Config, GainMode, ReadMode, ReadyStrategy, DEFAULT_POLL_INTERVAL, DEFAULT_POWER_SETTLE,
    DEFAULT_READY_GUARD, DEFAULT_READY_TIMEOUT,
};
pub use shared::SharedHx711;

pub const HX711_MINIMUM: i32 = -(1 << 23);
pub const HX711_MAXIMUM: i32 = (1 << 23) - 1;
/// Samples used by a tare when the caller has no preference.
pub const DEFAULT_TARE_SAMPLES: usize = 10;

/// Clock low time after each pulse. Nothing waits while the clock is high:
/// data is valid 0.1 µs after the rising edge and the chip powers down if
/// the clock stays high for 60 µs.
const CLOCK_LOW_TIME: Duration = Duration::from_micros(1);
/// How long the clock is held high to power down. Datasheet minimum is 60 µs.
const POWER_DOWN_HOLD: Duration = Duration::from_micros(100);
const DATA_BITS: u32 = 24;

/// Where the driver is in a conversion transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    AwaitingReady,
    ClockingData,
    ClockingGain,
}

/// Power state of the chip, as driven through the clock line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Power {
    Powered,
    PoweredDown,
}

/// Sign-extend a 24-bit two's complement field. Bits above 23 are ignored.
pub const fn decode(field: u32) -> i32 {
    let field = field & 0x00FF_FFFF;
    (field & 0x7F_FFFF) as i32 - (field & 0x80_0000) as i32
}

/// Rounded mean of `count` samples summing to `sum`, halves rounded up.
fn rounded_mean(sum: i64, count: usize) -> i64 {
    let count = count as i64;
    (2 * sum + count).div_euclid(2 * count)
}

pub struct HX711<SckPin, DTPin, Delay> {
    sck_pin: SckPin,
    dt_pin: DTPin,
    delay: Delay,
    config: Config,
    state: State,
    power: Power,
    last_reading: i32,
    offset: i32, // tare
    scale: f32,  // calibration value
    // monotonic uptime, for the debounce guard
    clock: Option<fn() -> Duration>,
    // time spent in the driver's own delays, used when no clock is installed
    waited: Duration,
    last_conversion: Option<Duration>,
    // the chip runs at a different gain than configured until one conversion is clocked out
    needs_priming: bool,
}

impl<SckPin, DTPin, Delay, E> HX711<SckPin, DTPin, Delay>
where
    SckPin: OutputPin<Error = E>,
    DTPin: InputPin<Error = E>,
    Delay: DelayNs,
    E: Debug,
{
    /// Create a driver with the default [`Config`] (gain 128, plain polling).
    pub fn new(sck_pin: SckPin, dt_pin: DTPin, delay: Delay) -> Result<Self, Error<E>> {
        Self::with_config(sck_pin, dt_pin, delay, Config::default())
    }

    /// Create a driver. The clock line is driven low, which powers the chip up.
    pub fn with_config(
        mut sck_pin: SckPin,
        dt_pin: DTPin,
        delay: Delay,
        config: Config,
    ) -> Result<Self, Error<E>> {
        config.validate()?;
        sck_pin.set_low().map_err(Error::Setup)?;
        debug!("hx711 configured: {:?}", config);
        Ok(Self {
            sck_pin,
            dt_pin,
            delay,
            config,
            state: State::Idle,
            power: Power::Powered,
            last_reading: 0,
            offset: 0,
            scale: 1.0,
            clock: None,
            waited: Duration::ZERO,
            last_conversion: None,
            // the chip starts out on channel A, gain 128
            needs_priming: config.gain != GainMode::A128,
        })
    }

    /// Install a monotonic uptime source. With [`ReadyStrategy::Debounced`]
    /// the guard is then measured against real time, including time spent
    /// outside the driver. Without one only the driver's own waits count, so
    /// [`LoadCell::is_ready`] stays false until a read has waited the guard.
    pub fn with_clock(mut self, uptime: fn() -> Duration) -> Self {
        self.clock = Some(uptime);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_powered(&self) -> bool {
        self.power == Power::Powered
    }

    pub fn gain(&self) -> GainMode {
        self.config.gain
    }

    /// Change channel and gain. The next read clocks out one extra
    /// conversion so the returned value is taken at the new gain.
    pub fn set_gain(&mut self, gain: GainMode) {
        if gain != self.config.gain {
            debug!("hx711 gain {:?} -> {:?}", self.config.gain, gain);
            self.config.gain = gain;
            self.needs_priming = true;
        }
    }

    /// Set the raw offset directly, e.g. from a stored calibration.
    pub fn set_offset(&mut self, offset: i32) {
        self.offset = offset;
    }

    /// Last sample clocked out, before offset and scale.
    pub fn last_raw(&self) -> i32 {
        self.last_reading
    }

    /// Last sample, offset relative to the tare, and scaled.
    pub fn last_reading(&self) -> f32 {
        self.last_reading.saturating_add(self.offset) as f32 / self.scale
    }

    /// Derive the scale from a known reference load, after a tare.
    /// Returns the new scale.
    pub fn calibrate(&mut self, known_load: f32, times: usize) -> Result<f32, Error<E>> {
        if known_load == 0.0 || !known_load.is_finite() {
            return Err(Error::InvalidArgument("reference load must be finite and non-zero"));
        }
        let counts = self.read_raw_averaged(times)?;
        if counts == 0.0 {
            return Err(Error::InvalidArgument("no load detected on the cell"));
        }
        self.scale = counts / known_load;
        debug!("hx711 calibrated: scale = {}", self.scale);
        Ok(self.scale)
    }

    /// Hold the clock high until the chip sleeps. Reads fail until [`Self::power_up`].
    pub fn power_down(&mut self) -> Result<(), Error<E>> {
        self.sck_pin.set_high().map_err(Error::Pin)?;
        self.pause(POWER_DOWN_HOLD);
        self.power = Power::PoweredDown;
        debug!("hx711 powered down");
        Ok(())
    }

    /// Pull the clock low and wait for the chip to settle.
    /// The chip comes back on channel A, gain 128.
    pub fn power_up(&mut self) -> Result<(), Error<E>> {
        self.sck_pin.set_low().map_err(Error::Pin)?;
        self.pause(self.config.power_settle);
        if self.power == Power::PoweredDown {
            self.needs_priming = self.config.gain != GainMode::A128;
            self.last_conversion = None;
        }
        self.power = Power::Powered;
        debug!("hx711 powered up");
        Ok(())
    }

    /// Give back the pins and the delay.
    pub fn release(self) -> (SckPin, DTPin, Delay) {
        (self.sck_pin, self.dt_pin, self.delay)
    }

    /// One sample, without offset or scale applied.
    fn convert(&mut self) -> Result<i32, Error<E>> {
        if self.power == Power::PoweredDown {
            return Err(Error::PoweredDown);
        }
        if self.config.read_mode == ReadMode::PowerCycled {
            self.power_down()?;
            self.power_up()?;
        }
        if self.needs_priming {
            trace!("hx711 priming conversion for {:?}", self.config.gain);
            self.transaction()?;
            self.needs_priming = false;
        }
        let value = self.transaction()?;
        self.last_reading = value;
        Ok(value)
    }

    /// Wait for ready, clock out 24 data bits and the gain pulses.
    fn transaction(&mut self) -> Result<i32, Error<E>> {
        self.state = State::AwaitingReady;
        if let Err(err) = self.wait_ready() {
            self.state = State::Idle;
            return Err(err);
        }

        let clocked = self.clock_out();
        self.state = State::Idle;
        match clocked {
            Ok(field) => {
                self.last_conversion = Some(self.now());
                let value = decode(field);
                trace!("hx711 raw {:#08x} = {}", field, value);
                Ok(value)
            }
            Err(err) => {
                self.recover();
                Err(Error::Pin(err))
            }
        }
    }

    fn wait_ready(&mut self) -> Result<(), Error<E>> {
        let guard = self.guard_remaining();
        if !guard.is_zero() {
            self.pause(guard);
        }

        let max_polls = self.config.max_polls();
        let mut polls = 0;
        loop {
            // if the dt pin is low, device is ready for read
            if self.dt_pin.is_low().map_err(Error::Pin)? {
                return Ok(());
            }
            if polls >= max_polls {
                warn!("hx711 not ready after {:?}", self.config.ready_timeout);
                return Err(Error::Timeout);
            }
            self.pause(self.config.poll_interval);
            polls += 1;
        }
    }

    /// Once the first pulse is sent this has to run to the end, a partial
    /// pulse train leaves the chip on the wrong gain.
    fn clock_out(&mut self) -> Result<u32, E> {
        self.state = State::ClockingData;
        let mut value: u32 = 0;
        for _ in 0..DATA_BITS / 8 {
            // bytes arrive MSB first
            value = (value << 8) | u32::from(self.read_byte()?);
        }

        // send gain mode for next reading
        self.state = State::ClockingGain;
        for _ in 0..self.config.gain.pulses() {
            self.read_hx711_bit()?;
        }
        Ok(value)
    }

    fn read_byte(&mut self) -> Result<u8, E> {
        let mut byte = 0u8;
        for _ in 0..8 {
            byte = (byte << 1) | u8::from(self.read_hx711_bit()?);
        }
        Ok(byte)
    }

    fn read_hx711_bit(&mut self) -> Result<bool, E> {
        self.sck_pin.set_high()?;
        // sample while the clock is high, then always bring it back down
        let bit = self.dt_pin.is_high();
        self.sck_pin.set_low()?;

        self.pause(CLOCK_LOW_TIME);
        bit
    }

    /// Best effort power cycle after a failed transaction, so the chip
    /// starts the next conversion from a known state.
    fn recover(&mut self) {
        warn!("hx711 transaction failed, power cycling");
        if self.sck_pin.set_high().is_ok() {
            self.pause(POWER_DOWN_HOLD);
        }
        if self.sck_pin.set_low().is_ok() {
            self.pause(self.config.power_settle);
        }
        self.needs_priming = self.config.gain != GainMode::A128;
        self.last_conversion = None;
    }

    fn now(&self) -> Duration {
        match self.clock {
            Some(uptime) => uptime(),
            None => self.waited,
        }
    }

    /// What is left of the debounce guard since the last conversion.
    fn guard_remaining(&self) -> Duration {
        match (self.config.ready, self.last_conversion) {
            (ReadyStrategy::Debounced { guard }, Some(at)) => {
                guard.saturating_sub(self.now().saturating_sub(at))
            }
            _ => Duration::ZERO,
        }
    }

    fn pause(&mut self, duration: Duration) {
        self.waited = self.waited.saturating_add(duration);
        match u32::try_from(duration.as_nanos()) {
            Ok(ns) => self.delay.delay_ns(ns),
            Err(_) => self
                .delay
                .delay_ms(u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)),
        }
    }

    fn check_times(times: usize) -> Result<(), Error<E>> {
        if times == 0 {
            return Err(Error::InvalidArgument("sample count must be at least 1"));
        }
        Ok(())
    }

    /// Sum of `times` samples without offset.
    fn sum_unadjusted(&mut self, times: usize) -> Result<i64, Error<E>> {
        let mut sum: i64 = 0;
        for _ in 0..times {
            sum += i64::from(self.convert()?);
        }
        Ok(sum)
    }
}

impl<SckPin, DTPin, Delay, E> LoadCell for HX711<SckPin, DTPin, Delay>
where
    SckPin: OutputPin<Error = E>,
    DTPin: InputPin<Error = E>,
    Delay: DelayNs,
    E: Debug,
{
    type Offset = i32;
    type Scale = f32;
    type Error = Error<E>;

    fn read_raw(&mut self) -> Result<i32, Self::Error> {
        Ok(self.convert()?.saturating_add(self.offset))
    }

    fn read_raw_averaged(&mut self, times: usize) -> Result<f32, Self::Error> {
        Self::check_times(times)?;
        let sum = self.sum_unadjusted(times)? + i64::from(self.offset) * times as i64;
        Ok((sum as f64 / times as f64) as f32)
    }

    fn read(&mut self) -> Result<f32, Self::Error> {
        Ok(self.read_raw()? as f32 / self.scale)
    }

    fn read_averaged(&mut self, times: usize) -> Result<f32, Self::Error> {
        Ok(self.read_raw_averaged(times)? / self.scale)
    }

    /// zero the scale by averaging `num_samples` readings, blocking.
    fn tare(&mut self, num_samples: usize) -> Result<(), Self::Error> {
        Self::check_times(num_samples)?;
        let sum = self.sum_unadjusted(num_samples)?;
        let average = rounded_mean(sum, num_samples);
        // the mean of 24-bit samples always fits
        self.offset = -(average as i32);
        debug!("hx711 tare over {} samples: offset = {}", num_samples, self.offset);
        Ok(())
    }

    /// With [`ReadyStrategy::Debounced`] this stays false until the guard
    /// has passed since the last conversion, see [`HX711::with_clock`].
    fn is_ready(&mut self) -> Result<bool, Self::Error> {
        if self.state != State::Idle
            || self.power == Power::PoweredDown
            || !self.guard_remaining().is_zero()
        {
            return Ok(false);
        }
        self.dt_pin.is_low().map_err(Error::Pin)
    }

    fn get_offset(&self) -> i32 {
        self.offset
    }

    fn set_scale(&mut self, scale: f32) -> Result<(), Self::Error> {
        if scale == 0.0 || !scale.is_finite() {
            return Err(Error::InvalidArgument("scale must be finite and non-zero"));
        }
        self.scale = scale;
        Ok(())
    }

    fn get_scale(&self) -> f32 {
        self.scale
    }
}
