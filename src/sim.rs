//! A simulated hx711 behind embedded-hal pins, for host tests.
//!
//! The chip shifts one bit out per rising clock edge, counts the trailing
//! pulses to pick the gain for the next conversion, powers down when the
//! clock is held high for 60 µs, and keeps the data line high for a
//! configurable number of reads while converting. Time only moves through
//! [`SimDelay`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::Duration;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, ErrorKind, ErrorType, InputPin, OutputPin};

use crate::hx711::{Config, HX711};

const POWER_DOWN_NS: u64 = 60_000;
const DATA_BITS: u8 = 24;

/// 24-bit two's complement field for `value`.
pub fn field(value: i32) -> u32 {
    (value as u32) & 0x00FF_FFFF
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimError;

impl digital::Error for SimError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// One successful write to the clock line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockEdge {
    pub thread: ThreadId,
    pub high: bool,
}

#[derive(Debug)]
struct Chip {
    samples: VecDeque<u32>,
    // repeated once the queue runs dry
    hold: u32,
    pulses: u8,
    out: bool,
    converting_reads: u32,
    conversion_reads: u32,
    never_ready: bool,
    clock_high: bool,
    high_since: u64,
    now_ns: u64,
    // trailing pulses in effect for the conversion being clocked out
    selected: u8,
    transactions: Vec<u8>,
    gains: Vec<u8>,
    // longest high time of a pulse that did not power the chip down
    widest_pulse_ns: u64,
    // longest time between a rising edge and a data sample taken while high
    sample_lag_ns: u64,
    resets: usize,
    edges: Vec<ClockEdge>,
    clock_writes: usize,
    fail_at: Option<usize>,
}

impl Chip {
    fn asleep(&self) -> bool {
        self.clock_high && self.now_ns - self.high_since >= POWER_DOWN_NS
    }

    fn finish(&mut self, pulses: u8) {
        self.transactions.push(pulses);
        self.gains.push(self.selected);
        self.selected = pulses - DATA_BITS;
        if let Some(sample) = self.samples.pop_front() {
            self.hold = sample;
        }
        self.pulses = 0;
        self.out = true;
        self.converting_reads = self.conversion_reads;
    }

    /// Close a transaction whose last pulse has been sent.
    fn settle(&mut self) {
        if !self.clock_high && self.pulses > DATA_BITS {
            self.finish(self.pulses);
        }
    }

    fn reset(&mut self) {
        self.resets += 1;
        self.pulses = 0;
        self.out = true;
        self.selected = 1;
        self.converting_reads = self.conversion_reads;
    }

    fn rising(&mut self) {
        if self.clock_high {
            return;
        }
        self.clock_high = true;
        self.high_since = self.now_ns;
        if self.never_ready || (self.pulses == 0 && self.converting_reads > 0) {
            return;
        }

        let index = self.pulses;
        self.pulses = self.pulses.saturating_add(1);
        self.out = if index < DATA_BITS {
            let sample = self.samples.front().copied().unwrap_or(self.hold);
            (sample >> (DATA_BITS - 1 - index)) & 1 == 1
        } else {
            true
        };
    }

    fn falling(&mut self) {
        if !self.clock_high {
            return;
        }
        let long = self.asleep();
        self.clock_high = false;
        if !long {
            self.widest_pulse_ns = self.widest_pulse_ns.max(self.now_ns - self.high_since);
        }
        if long {
            // the long pulse itself is not part of the transaction
            let sent = self.pulses.saturating_sub(1);
            if sent > DATA_BITS {
                self.finish(sent);
            }
            self.reset();
        }
    }

    fn data_high(&mut self) -> bool {
        if self.never_ready || self.asleep() {
            return true;
        }
        if self.clock_high {
            self.sample_lag_ns = self.sample_lag_ns.max(self.now_ns - self.high_since);
            return self.out;
        }
        self.settle();
        if self.pulses > 0 {
            return self.out;
        }
        if self.converting_reads > 0 {
            self.converting_reads -= 1;
            return true;
        }
        false
    }
}

/// Handle on the simulated chip, shared with its pins.
#[derive(Debug, Clone)]
pub struct Sim(Arc<Mutex<Chip>>);

impl Sim {
    /// A chip with a conversion ready, returning `samples` (24-bit fields) in order.
    pub fn new(samples: &[u32]) -> Self {
        Sim(Arc::new(Mutex::new(Chip {
            samples: samples.iter().copied().collect(),
            hold: 0,
            pulses: 0,
            out: true,
            converting_reads: 0,
            conversion_reads: 2,
            never_ready: false,
            clock_high: false,
            high_since: 0,
            now_ns: 0,
            selected: 1,
            transactions: Vec::new(),
            gains: Vec::new(),
            widest_pulse_ns: 0,
            sample_lag_ns: 0,
            resets: 0,
            edges: Vec::new(),
            clock_writes: 0,
            fail_at: None,
        })))
    }

    /// A chip whose data line is stuck high.
    pub fn never_ready() -> Self {
        let sim = Self::new(&[]);
        sim.chip().never_ready = true;
        sim
    }

    fn chip(&self) -> MutexGuard<'_, Chip> {
        self.0.lock().unwrap()
    }

    pub fn pins(&self) -> (SimClock, SimData, SimDelay) {
        (
            SimClock(self.clone()),
            SimData(self.clone()),
            SimDelay(self.clone()),
        )
    }

    pub fn hx711(&self, config: Config) -> HX711<SimClock, SimData, SimDelay> {
        let (sck, dt, delay) = self.pins();
        HX711::with_config(sck, dt, delay, config).unwrap()
    }

    /// Data line reads that return "busy" after each conversion starts.
    pub fn set_conversion_reads(&self, reads: u32) {
        self.chip().conversion_reads = reads;
    }

    /// Start a conversion now, as if one had just been clocked out.
    pub fn start_converting(&self) {
        let mut chip = self.chip();
        chip.converting_reads = chip.conversion_reads;
    }

    /// Fail the clock write with this zero-based index, once.
    pub fn fail_clock_write(&self, index: usize) {
        self.chip().fail_at = Some(index);
    }

    /// Pulse count of every completed transaction.
    pub fn transactions(&self) -> Vec<u8> {
        let mut chip = self.chip();
        chip.settle();
        chip.transactions.clone()
    }

    /// Trailing pulse setting each completed conversion was taken with.
    pub fn gains(&self) -> Vec<u8> {
        let mut chip = self.chip();
        chip.settle();
        chip.gains.clone()
    }

    pub fn resets(&self) -> usize {
        self.chip().resets
    }

    pub fn clock_edges(&self) -> Vec<ClockEdge> {
        self.chip().edges.clone()
    }

    /// Longest clock high time that was a data or gain pulse.
    pub fn widest_pulse(&self) -> Duration {
        Duration::from_nanos(self.chip().widest_pulse_ns)
    }

    /// Longest time from a rising edge to the data sample that followed it.
    pub fn sample_lag(&self) -> Duration {
        Duration::from_nanos(self.chip().sample_lag_ns)
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.chip().now_ns)
    }
}

#[derive(Debug)]
pub struct SimClock(Sim);

impl SimClock {
    fn write(&mut self, high: bool) -> Result<(), SimError> {
        let mut chip = self.0.chip();
        let index = chip.clock_writes;
        chip.clock_writes += 1;
        if chip.fail_at == Some(index) {
            chip.fail_at = None;
            return Err(SimError);
        }
        chip.edges.push(ClockEdge {
            thread: thread::current().id(),
            high,
        });
        if high {
            chip.rising();
        } else {
            chip.falling();
        }
        Ok(())
    }
}

impl ErrorType for SimClock {
    type Error = SimError;
}

impl OutputPin for SimClock {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.write(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.write(true)
    }
}

#[derive(Debug)]
pub struct SimData(Sim);

impl ErrorType for SimData {
    type Error = SimError;
}

impl InputPin for SimData {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0.chip().data_high())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.0.chip().data_high())
    }
}

#[derive(Debug)]
pub struct SimDelay(Sim);

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.chip().now_ns += u64::from(ns);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pulse(clock: &mut SimClock, data: &mut SimData) -> bool {
        clock.set_high().unwrap();
        let bit = data.is_high().unwrap();
        clock.set_low().unwrap();
        bit
    }

    #[test]
    fn shifts_msb_first_and_counts_pulses() {
        let sim = Sim::new(&[0xA0_0001]);
        let (mut clock, mut data, _) = sim.pins();

        assert!(data.is_low().unwrap());
        let mut value = 0u32;
        for _ in 0..24 {
            value = (value << 1) | u32::from(pulse(&mut clock, &mut data));
        }
        assert_eq!(value, 0xA0_0001);
        for _ in 0..3 {
            assert!(pulse(&mut clock, &mut data));
        }
        assert_eq!(sim.transactions(), [27]);
        // converting again
        assert!(data.is_high().unwrap());
    }

    #[test]
    fn long_high_resets_the_chip() {
        let sim = Sim::new(&[1]);
        let (mut clock, mut data, mut delay) = sim.pins();
        pulse(&mut clock, &mut data);

        clock.set_high().unwrap();
        delay.delay_us(70);
        assert!(data.is_high().unwrap());
        clock.set_low().unwrap();

        assert_eq!(sim.resets(), 1);
        assert!(sim.transactions().is_empty());
    }

    #[test]
    fn field_wraps_negative_values() {
        assert_eq!(field(-1), 0xFF_FFFF);
        assert_eq!(field(-8_388_608), 0x80_0000);
        assert_eq!(field(8_388_607), 0x7F_FFFF);
    }
}
