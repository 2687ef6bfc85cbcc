//! GPIO controller: pin function select, level writes, level reads.
//!
//! Register layout per the BCM2711 peripheral datasheet: function-select
//! bits are packed ten pins per GPFSELn word (3 bits each); output levels go
//! through the GPSETn/GPCLRn pair so a write to one pin can never race the
//! other pins sharing the word; GPLEVn reads the sampled level regardless of
//! direction.

use crate::error::Result;
use crate::mmio::{GPIO_DEVICE, MmioBlock};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, trace};

/// Number of physical GPIO pins on the SoC (BCM 0..=53).
pub const PIN_COUNT: u8 = 54;

// GPIO register word indices.
const GPFSEL0: usize = 0;
const GPSET0: usize = 7;
const GPCLR0: usize = 10;
const GPLEV0: usize = 13;

/// Hardware function-select encoding for one pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PinFunction {
    /// Plain GPIO input (the power-on default).
    Input = 0b000,
    /// Plain GPIO output.
    Output = 0b001,
    /// Alternate function 0.
    Alt0 = 0b100,
    /// Alternate function 1.
    Alt1 = 0b101,
    /// Alternate function 2.
    Alt2 = 0b110,
    /// Alternate function 3.
    Alt3 = 0b111,
    /// Alternate function 4.
    Alt4 = 0b011,
    /// Alternate function 5 (PWM on pins 12/13/18/19).
    Alt5 = 0b010,
}

/// Pin direction for plain GPIO use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    /// High-impedance input.
    Input,
    /// Driven output.
    Output,
}

impl PinMode {
    fn function(self) -> PinFunction {
        match self {
            PinMode::Input => PinFunction::Input,
            PinMode::Output => PinFunction::Output,
        }
    }
}

/// Logic level on a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Level {
    /// Driven or sampled low.
    Low = 0,
    /// Driven or sampled high.
    High = 1,
}

impl Level {
    /// Whether this level is [`Level::High`].
    pub fn is_high(self) -> bool {
        matches!(self, Level::High)
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

// Pin-to-register mapping, kept as pure functions rather than scattered
// shifts at the call sites.
const fn fsel_word(pin: u8) -> usize {
    GPFSEL0 + pin as usize / 10
}

const fn fsel_shift(pin: u8) -> u32 {
    (pin as u32 % 10) * 3
}

const fn level_bank(pin: u8) -> usize {
    pin as usize / 32
}

const fn bank_bit(pin: u8) -> u32 {
    1 << (pin as u32 % 32)
}

/// GPIO controller over the mapped GPIO register block.
///
/// Callers share one instance as an `Arc<Gpio>`; the PWM components hold
/// clones so the mapping is unmapped only when the last owner drops.
/// Out-of-range pin numbers are ignored by every operation — never an
/// undefined register write.
pub struct Gpio {
    regs: MmioBlock,
    /// Bitmask of pins whose function select this handle has written.
    touched: AtomicU64,
}

impl Gpio {
    /// Map the GPIO register block and return a controller.
    pub fn new() -> Result<Self> {
        let regs = MmioBlock::open(GPIO_DEVICE, 0)?;
        info!("GPIO controller initialized");
        Ok(Self {
            regs,
            touched: AtomicU64::new(0),
        })
    }

    /// Set a pin's direction for plain GPIO use.
    pub fn set_mode(&self, pin: u8, mode: PinMode) {
        self.set_function(pin, mode.function());
    }

    /// Select a pin's hardware function.
    ///
    /// Masked read-modify-write of the pin's 3 function-select bits; the
    /// other nine pins in the word are untouched.
    pub fn set_function(&self, pin: u8, function: PinFunction) {
        if pin >= PIN_COUNT {
            trace!(pin, "set_function: pin out of range, ignored");
            return;
        }
        let shift = fsel_shift(pin);
        self.regs
            .modify(fsel_word(pin), 0b111 << shift, (function as u32) << shift);
        self.touched.fetch_or(1 << pin, Ordering::Relaxed);
    }

    /// Drive an output pin high or low.
    ///
    /// Single store to the set/clear register pair — never a read-modify-
    /// write — so concurrent writers to other pins in the same bank cannot
    /// be raced.
    pub fn write(&self, pin: u8, level: Level) {
        if pin >= PIN_COUNT {
            return;
        }
        #[cfg(feature = "hardware")]
        {
            let reg = match level {
                Level::High => GPSET0,
                Level::Low => GPCLR0,
            };
            self.regs.write(reg + level_bank(pin), bank_bit(pin));
        }
        #[cfg(not(feature = "hardware"))]
        {
            // No silicon behind the set/clear pair off-target: model the
            // level register so read() observes what was driven.
            let bits = match level {
                Level::High => bank_bit(pin),
                Level::Low => 0,
            };
            self.regs.modify(GPLEV0 + level_bank(pin), bank_bit(pin), bits);
        }
    }

    /// Sample a pin's level. Valid regardless of configured direction.
    pub fn read(&self, pin: u8) -> Level {
        if pin >= PIN_COUNT {
            return Level::Low;
        }
        let word = self.regs.read(GPLEV0 + level_bank(pin));
        Level::from(word & bank_bit(pin) != 0)
    }

    /// Return every touched pin to input, the safe power-on default.
    fn restore_touched(&self) {
        let touched = self.touched.load(Ordering::Relaxed);
        if touched == 0 {
            return;
        }
        for pin in 0..PIN_COUNT {
            if touched & (1 << pin) != 0 {
                let shift = fsel_shift(pin);
                self.regs.modify(fsel_word(pin), 0b111 << shift, 0);
            }
        }
        debug!(
            pins = touched.count_ones(),
            "restored touched pins to input"
        );
    }
}

impl Drop for Gpio {
    fn drop(&mut self) {
        self.restore_touched();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_select_lands_in_the_right_field() {
        let gpio = Gpio::new().unwrap();
        // Pin 17: GPFSEL1, bits 21..24.
        gpio.set_function(17, PinFunction::Alt5);
        assert_eq!(gpio.regs.read(1), (PinFunction::Alt5 as u32) << 21);
    }

    #[test]
    fn pins_sharing_a_word_do_not_clobber() {
        let gpio = Gpio::new().unwrap();
        gpio.set_mode(10, PinMode::Output);
        gpio.set_function(17, PinFunction::Alt0);
        let word = gpio.regs.read(1);
        assert_eq!(word & 0b111, PinFunction::Output as u32);
        assert_eq!((word >> 21) & 0b111, PinFunction::Alt0 as u32);

        // Reconfiguring one leaves the other alone.
        gpio.set_mode(17, PinMode::Input);
        let word = gpio.regs.read(1);
        assert_eq!(word & 0b111, PinFunction::Output as u32);
        assert_eq!((word >> 21) & 0b111, 0);
    }

    #[test]
    fn write_is_observable_through_read() {
        let gpio = Gpio::new().unwrap();
        gpio.set_mode(21, PinMode::Output);
        gpio.write(21, Level::High);
        assert_eq!(gpio.read(21), Level::High);
        gpio.write(21, Level::Low);
        assert_eq!(gpio.read(21), Level::Low);
    }

    #[test]
    fn upper_bank_pins_use_the_second_word() {
        let gpio = Gpio::new().unwrap();
        gpio.set_mode(45, PinMode::Output);
        gpio.write(45, Level::High);
        assert_eq!(gpio.read(45), Level::High);
        assert_eq!(gpio.read(13), Level::Low);
    }

    #[test]
    fn out_of_range_pins_are_ignored() {
        let gpio = Gpio::new().unwrap();
        gpio.set_mode(PIN_COUNT, PinMode::Output);
        gpio.write(99, Level::High);
        assert_eq!(gpio.read(99), Level::Low);
        // No function-select word was written.
        for word in 0..6 {
            assert_eq!(gpio.regs.read(word), 0);
        }
    }

    #[test]
    fn cleanup_restores_touched_pins_to_input() {
        let gpio = Gpio::new().unwrap();
        gpio.set_mode(4, PinMode::Output);
        gpio.set_function(18, PinFunction::Alt5);
        gpio.restore_touched();
        assert_eq!(gpio.regs.read(0) >> 12 & 0b111, 0);
        assert_eq!(gpio.regs.read(1) >> 24 & 0b111, 0);
    }
}
