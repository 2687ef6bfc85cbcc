//! Hardware PWM driver for the BCM2711 PWM peripheral.
//!
//! Programs the dedicated PWM block and its clock-manager channel for
//! jitter-free output on the four PWM-capable pins: channel 0 on BCM 12/18,
//! channel 1 on BCM 13/19. The clock manager is brought up once to a 1 MHz
//! reference (54 MHz oscillator / 54); per-set() frequency then only moves
//! the channel's range register, duty the compare register.

use crate::error::{Error, Result};
use crate::gpio::{Gpio, PinFunction};
use crate::mmio::{CLK_OFFSET, MEM_DEVICE, MmioBlock, PERIPHERAL_BASE, PWM_OFFSET};
use crate::timing::delay_us;
use bitflags::bitflags;
use static_assertions::const_assert;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, trace};

// PWM block register word indices.
const PWM_CTL: usize = 0;
const PWM_RNG1: usize = 4;
const PWM_DAT1: usize = 5;
const PWM_RNG2: usize = 8;
const PWM_DAT2: usize = 9;

// Clock-manager register word indices for the PWM clock.
const CM_PWMCTL: usize = 40;
const CM_PWMDIV: usize = 41;

/// Clock-manager password, required in the top byte of every write.
const CM_PASSWD: u32 = 0x5A << 24;

/// BCM2711 crystal oscillator.
const OSC_HZ: u32 = 54_000_000;
/// Integer divisor bringing the oscillator down to the PWM reference.
const CLOCK_DIVISOR: u32 = 54;
/// PWM reference clock after division.
pub const PWM_CLOCK_HZ: u32 = OSC_HZ / CLOCK_DIVISOR;

const_assert!(OSC_HZ % CLOCK_DIVISOR == 0);
const_assert!(PWM_CLOCK_HZ == 1_000_000);

/// Upper bound on the clock-stop busy wait. The original peripheral settles
/// in well under a millisecond; a stuck flag means the block is wedged.
const CLK_BUSY_TIMEOUT_US: u64 = 5_000;

bitflags! {
    /// PWM_CTL control word bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct PwmCtl: u32 {
        /// Channel 1 enable.
        const PWEN1 = 1 << 0;
        /// Channel 1 mark-space mode.
        const MSEN1 = 1 << 7;
        /// Channel 2 enable.
        const PWEN2 = 1 << 8;
        /// Channel 2 mark-space mode.
        const MSEN2 = 1 << 15;
    }
}

bitflags! {
    /// Clock-manager control word bits (CM_PWMCTL).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct ClkCtl: u32 {
        /// Clock source: crystal oscillator.
        const SRC_OSC = 1;
        /// Clock enable.
        const ENAB = 1 << 4;
        /// Busy flag (read-only).
        const BUSY = 1 << 7;
    }
}

/// Register selectors for one hardware channel.
struct Channel {
    rng: usize,
    dat: usize,
    enable: PwmCtl,
    msen: PwmCtl,
}

/// Map a BCM pin to its hardware PWM channel, if it has one.
fn channel_for_pin(pin: u8) -> Option<Channel> {
    match pin {
        12 | 18 => Some(Channel {
            rng: PWM_RNG1,
            dat: PWM_DAT1,
            enable: PwmCtl::PWEN1,
            msen: PwmCtl::MSEN1,
        }),
        13 | 19 => Some(Channel {
            rng: PWM_RNG2,
            dat: PWM_DAT2,
            enable: PwmCtl::PWEN2,
            msen: PwmCtl::MSEN2,
        }),
        _ => None,
    }
}

/// One live handle per process: the PWM block and its clock are global
/// hardware state.
static CONTROLLER_CLAIMED: AtomicBool = AtomicBool::new(false);

/// Hardware PWM controller handle.
///
/// Holds its own mappings of the PWM and clock blocks plus a shared handle
/// to the GPIO controller for ALT5 pin routing — dropping this can never
/// unmap a block the GPIO controller still needs.
pub struct HwPwm {
    gpio: Arc<Gpio>,
    pwm: MmioBlock,
    clk: MmioBlock,
}

impl HwPwm {
    /// Map the PWM and clock blocks and bring the PWM clock up to the 1 MHz
    /// reference.
    ///
    /// Fails with [`Error::ControllerActive`] while another handle is live,
    /// [`Error::PermissionDenied`] without access to `/dev/mem`, and
    /// [`Error::DeviceUnavailable`] if mapping fails or the clock never
    /// settles.
    pub fn new(gpio: Arc<Gpio>) -> Result<Self> {
        if CONTROLLER_CLAIMED.swap(true, Ordering::AcqRel) {
            return Err(Error::ControllerActive);
        }
        match Self::init(gpio) {
            Ok(hw) => Ok(hw),
            Err(e) => {
                CONTROLLER_CLAIMED.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    fn init(gpio: Arc<Gpio>) -> Result<Self> {
        let pwm = MmioBlock::open(MEM_DEVICE, PERIPHERAL_BASE + PWM_OFFSET)?;
        let clk = MmioBlock::open(MEM_DEVICE, PERIPHERAL_BASE + CLK_OFFSET)?;

        // Stop the PWM clock and wait for the busy flag to clear before
        // touching the divisor.
        clk.write(CM_PWMCTL, CM_PASSWD | ClkCtl::SRC_OSC.bits());
        delay_us(100);
        let mut waited_us = 0;
        while clk.read(CM_PWMCTL) & ClkCtl::BUSY.bits() != 0 {
            if waited_us >= CLK_BUSY_TIMEOUT_US {
                return Err(Error::DeviceUnavailable {
                    device: MEM_DEVICE,
                    reason: "PWM clock stuck busy during init".to_string(),
                });
            }
            delay_us(10);
            waited_us += 10;
        }

        clk.write(CM_PWMDIV, CM_PASSWD | (CLOCK_DIVISOR << 12));
        clk.write(
            CM_PWMCTL,
            CM_PASSWD | (ClkCtl::ENAB | ClkCtl::SRC_OSC).bits(),
        );
        delay_us(100);

        info!(reference_hz = PWM_CLOCK_HZ, "hardware PWM controller initialized");
        Ok(Self { gpio, pwm, clk })
    }

    /// Whether `pin` is served by a hardware PWM channel.
    pub fn supports_pin(pin: u8) -> bool {
        channel_for_pin(pin).is_some()
    }

    /// Program `pin`'s channel to `freq_hz` with duty in per-mille.
    ///
    /// Unsupported pins are a silent no-op (best-effort actuation, matching
    /// the software engine); duty is clamped to 0..=1000. A frequency of
    /// zero or above the 1 MHz reference has no realizable range and fails
    /// with [`Error::InvalidFrequency`]. The other channel is untouched.
    pub fn set(&self, pin: u8, freq_hz: u32, duty_per_mille: i32) -> Result<()> {
        if freq_hz == 0 || freq_hz > PWM_CLOCK_HZ {
            return Err(Error::InvalidFrequency { freq_hz });
        }
        let Some(channel) = channel_for_pin(pin) else {
            trace!(pin, "hardware PWM set: unsupported pin, ignored");
            return Ok(());
        };

        let duty = duty_per_mille.clamp(0, 1000) as u64;
        let range = PWM_CLOCK_HZ / freq_hz;
        let data = (range as u64 * duty / 1000) as u32;

        self.gpio.set_function(pin, PinFunction::Alt5);

        // Disable the channel while reprogramming; range lands before the
        // compare value so the channel can never run with a stale range.
        self.pwm.modify(PWM_CTL, channel.enable.bits(), 0);
        delay_us(10);
        self.pwm.write(channel.rng, range);
        self.pwm.write(channel.dat, data);
        let on = channel.enable | channel.msen;
        self.pwm.modify(PWM_CTL, on.bits(), on.bits());

        debug!(pin, freq_hz, duty_per_mille = duty, range, data, "hardware PWM programmed");
        Ok(())
    }

    /// Disable both hardware channels. Idempotent; the mappings stay valid
    /// until the handle is dropped.
    pub fn disable(&self) {
        self.pwm.write(PWM_CTL, 0);
        debug!("hardware PWM channels disabled");
    }
}

impl Drop for HwPwm {
    fn drop(&mut self) {
        self.disable();
        // Park the PWM clock (enable bit cleared, source kept).
        self.clk.write(CM_PWMCTL, CM_PASSWD | ClkCtl::SRC_OSC.bits());
        CONTROLLER_CLAIMED.store(false, Ordering::Release);
        debug!("hardware PWM controller released");
    }
}
