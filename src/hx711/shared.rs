//! Sharing one hx711 between threads or an interrupt handler and main.

use core::cell::RefCell;
use core::fmt::Debug;
use core::sync::atomic::{AtomicBool, Ordering};

use critical_section::Mutex;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use super::HX711;
use crate::error::Error;
use crate::LoadCell;

/// An [`HX711`] behind a critical section.
///
/// Every call holds the lock for the whole transaction, so clock pulses
/// from two callers never interleave. Do not call back into the same
/// `SharedHx711` from inside [`SharedHx711::with_lock`].
///
/// On single core targets the critical section masks interrupts, and the
/// blocking reads keep it held through the ready wait (up to
/// [`Config::ready_timeout`](super::Config)), the debounce guard and any
/// power settle time. Latency sensitive callers should use
/// [`SharedHx711::try_read_raw`], which only locks to clock out a
/// conversion that is already waiting.
pub struct SharedHx711<SckPin, DTPin, Delay> {
    inner: Mutex<RefCell<HX711<SckPin, DTPin, Delay>>>,
    busy: AtomicBool,
}

impl<SckPin, DTPin, Delay, E> SharedHx711<SckPin, DTPin, Delay>
where
    SckPin: OutputPin<Error = E>,
    DTPin: InputPin<Error = E>,
    Delay: DelayNs,
    E: Debug,
{
    pub const fn new(hx711: HX711<SckPin, DTPin, Delay>) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(hx711)),
            busy: AtomicBool::new(false),
        }
    }

    /// Run `f` with exclusive access to the driver.
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut HX711<SckPin, DTPin, Delay>) -> R) -> R {
        critical_section::with(|cs| {
            let mut hx711 = self.inner.borrow_ref_mut(cs);
            self.busy.store(true, Ordering::Release);
            let result = f(&mut hx711);
            self.busy.store(false, Ordering::Release);
            result
        })
    }

    /// Ready when the data line is low and no other caller holds the driver.
    /// Never waits for the lock to be released.
    pub fn is_ready(&self) -> Result<bool, Error<E>> {
        if self.busy.load(Ordering::Acquire) {
            return Ok(false);
        }
        self.with_lock(|hx711| hx711.is_ready())
    }

    /// Read a conversion only if one is ready now, otherwise `Ok(None)`.
    /// A pending priming conversion or [`ReadMode::PowerCycled`](super::ReadMode)
    /// still waits inside the lock.
    pub fn try_read_raw(&self) -> Result<Option<i32>, Error<E>> {
        if self.busy.load(Ordering::Acquire) {
            return Ok(None);
        }
        self.with_lock(|hx711| {
            if hx711.is_ready()? {
                hx711.read_raw().map(Some)
            } else {
                Ok(None)
            }
        })
    }

    pub fn read_raw(&self) -> Result<i32, Error<E>> {
        self.with_lock(|hx711| hx711.read_raw())
    }

    pub fn read_raw_averaged(&self, times: usize) -> Result<f32, Error<E>> {
        self.with_lock(|hx711| hx711.read_raw_averaged(times))
    }

    pub fn read(&self) -> Result<f32, Error<E>> {
        self.with_lock(|hx711| hx711.read())
    }

    pub fn read_averaged(&self, times: usize) -> Result<f32, Error<E>> {
        self.with_lock(|hx711| hx711.read_averaged(times))
    }

    pub fn tare(&self, num_samples: usize) -> Result<(), Error<E>> {
        self.with_lock(|hx711| hx711.tare(num_samples))
    }

    pub fn power_up(&self) -> Result<(), Error<E>> {
        self.with_lock(|hx711| hx711.power_up())
    }

    pub fn power_down(&self) -> Result<(), Error<E>> {
        self.with_lock(|hx711| hx711.power_down())
    }

    pub fn into_inner(self) -> HX711<SckPin, DTPin, Delay> {
        self.inner.into_inner().into_inner()
    }
}
