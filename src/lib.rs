//! # rpi_pulse — GPIO and PWM actuation for the Raspberry Pi 4B
//!
//! Low-level, low-jitter control of general-purpose I/O and PWM outputs from
//! user space, with no per-peripheral kernel driver: LEDs, motors, and servos
//! driven straight through the BCM2711's memory-mapped registers.
//!
//! ## Components
//!
//! - **Register access** ([`mmio`]): mapped 4 KiB blocks of 32-bit peripheral
//!   registers with typed read / write / masked read-modify-write.
//! - **Timing** ([`timing`]): monotonic `millis`/`micros`, bounded-overshoot
//!   delays, and the cooperative non-blocking [`Timer`].
//! - **GPIO** ([`gpio`]): pin function select, atomic level writes through
//!   the set/clear register pair, level reads.
//! - **Software PWM** ([`softpwm`]): a background timing loop per pin,
//!   approximating any duty cycle on any output pin.
//! - **Hardware PWM** ([`hwpwm`]): the SoC's dedicated PWM channels on BCM
//!   12/13/18/19, clocked from a 1 MHz reference for jitter-free output.
//! - **RT controls** ([`rt`]): SCHED_FIFO elevation, CPU pinning, and memory
//!   locking to bound software-PWM jitter on a non-RT kernel.
//!
//! ## Features
//!
//! - `hardware`: map the real registers via `/dev/gpiomem` and `/dev/mem`
//!   (target only; PWM and clock blocks need root). Without it every block
//!   is a process-local model, so the full API runs on any Linux host.
//!
//! ## Usage
//!
//! ```no_run
//! use rpi_pulse::{Gpio, HwPwm, Level, PinMode, SoftPwm, Timer, rt};
//! use std::sync::Arc;
//!
//! # fn main() -> rpi_pulse::Result<()> {
//! let gpio = Arc::new(Gpio::new()?);
//! gpio.set_mode(21, PinMode::Output);
//! gpio.write(21, Level::High);
//!
//! // Fade an LED on pin 18 in software.
//! let _ = rt::stabilize(3); // advisory: lower jitter when privileged
//! let pwm = SoftPwm::new(Arc::clone(&gpio));
//! pwm.start(18)?;
//! pwm.set_duty(18, 50);
//!
//! // Drive a servo on pin 12 from the hardware peripheral.
//! let servo = HwPwm::new(Arc::clone(&gpio))?;
//! servo.set(12, 50, 75)?; // 50 Hz, 7.5% duty
//!
//! // Cooperative pacing of the caller's own loop.
//! let mut tick = Timer::new();
//! tick.set(20);
//! loop {
//!     if tick.tick() {
//!         // runs once per 20 ms boundary, drift-free
//!     }
//! }
//! # }
//! ```
//!
//! Shutdown order follows ownership: engines stop (joining their workers)
//! before the GPIO mapping they share is unmapped on last drop.

pub mod error;
pub mod gpio;
pub mod hwpwm;
pub mod mmio;
pub mod rt;
pub mod softpwm;
pub mod timing;

pub use error::{Error, Result};
pub use gpio::{Gpio, Level, PIN_COUNT, PinFunction, PinMode};
pub use hwpwm::{HwPwm, PWM_CLOCK_HZ};
pub use softpwm::{DEFAULT_FREQUENCY_HZ, SoftPwm};
pub use timing::{Timer, delay_ms, delay_us, micros, millis};
