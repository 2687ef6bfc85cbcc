//! Software PWM engine: one background timing loop per pin.
//!
//! Emulates PWM on any GPIO pin by precisely timed toggling. Each channel
//! owns a worker thread; the owning handle talks to it through an atomic
//! duty field and a cancellation flag, and joins it synchronously on stop.
//! Duty updates are snapshotted once per period, so a change takes effect at
//! the next period boundary and never mid-pulse.

use crate::error::{Error, Result};
use crate::gpio::{Gpio, Level, PIN_COUNT, PinMode};
use crate::timing::{delay_us, micros};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, trace, warn};

/// Default PWM frequency when none is given (10 ms period).
pub const DEFAULT_FREQUENCY_HZ: u32 = 100;

/// How often a waiting worker re-checks its cancellation flag.
const CANCEL_CHECK_US: u64 = 1_000;

/// State shared between a channel's handle and its worker thread.
struct ChannelShared {
    pin: u8,
    period_us: u64,
    /// Target duty 0..=100, re-read by the worker once per period.
    duty: AtomicU8,
    running: AtomicBool,
}

struct Channel {
    shared: Arc<ChannelShared>,
    worker: Option<JoinHandle<()>>,
}

/// Software PWM engine over a shared GPIO controller.
///
/// At most one active channel per physical pin. Dropping the engine stops
/// and joins every worker.
pub struct SoftPwm {
    gpio: Arc<Gpio>,
    channels: Mutex<HashMap<u8, Channel>>,
}

impl SoftPwm {
    /// Create an engine over the shared GPIO controller.
    pub fn new(gpio: Arc<Gpio>) -> Self {
        Self {
            gpio,
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Start a channel on `pin` at the default 100 Hz.
    pub fn start(&self, pin: u8) -> Result<()> {
        self.start_with_frequency(pin, DEFAULT_FREQUENCY_HZ)
    }

    /// Start a channel on `pin` at `freq_hz`, beginning at duty 0.
    ///
    /// Fails with [`Error::AlreadyActive`] if the pin already has a running
    /// channel and [`Error::InvalidFrequency`] if the frequency is zero or
    /// has no realizable period. An out-of-range pin is a silent no-op,
    /// even when the frequency is also bad: no such pin, nothing to reject.
    pub fn start_with_frequency(&self, pin: u8, freq_hz: u32) -> Result<()> {
        if pin >= PIN_COUNT {
            warn!(pin, "software PWM start: pin out of range, ignored");
            return Ok(());
        }
        if freq_hz == 0 || freq_hz > 1_000_000 {
            return Err(Error::InvalidFrequency { freq_hz });
        }

        let mut channels = self.channels.lock();
        if channels.contains_key(&pin) {
            return Err(Error::AlreadyActive { pin });
        }

        self.gpio.set_mode(pin, PinMode::Output);

        let shared = Arc::new(ChannelShared {
            pin,
            period_us: 1_000_000 / freq_hz as u64,
            duty: AtomicU8::new(0),
            running: AtomicBool::new(true),
        });

        let gpio = Arc::clone(&self.gpio);
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(format!("softpwm-{pin}"))
            .spawn(move || run_channel(gpio, worker_shared))?;

        channels.insert(
            pin,
            Channel {
                shared,
                worker: Some(worker),
            },
        );
        info!(pin, freq_hz, "software PWM channel started");
        Ok(())
    }

    /// Update a channel's target duty cycle.
    ///
    /// Clamps to 0..=100 — best-effort actuation, never an error. Takes
    /// effect at the channel's next period boundary. Unknown pins are
    /// ignored.
    pub fn set_duty(&self, pin: u8, duty: i32) {
        let clamped = duty.clamp(0, 100) as u8;
        match self.channels.lock().get(&pin) {
            Some(channel) => channel.shared.duty.store(clamped, Ordering::Release),
            None => trace!(pin, "set_duty on inactive pin, ignored"),
        }
    }

    /// The stored duty target for `pin`, if a channel is active.
    pub fn duty(&self, pin: u8) -> Option<u8> {
        self.channels
            .lock()
            .get(&pin)
            .map(|channel| channel.shared.duty.load(Ordering::Acquire))
    }

    /// Whether `pin` has a running channel.
    pub fn is_active(&self, pin: u8) -> bool {
        self.channels.lock().contains_key(&pin)
    }

    /// Stop the channel on `pin`: signal the worker, join it, drive the pin
    /// low, and release it.
    ///
    /// Safe from any thread; stopping an inactive pin is a no-op.
    pub fn stop(&self, pin: u8) {
        // Take the channel out under the lock, join outside it.
        let channel = self.channels.lock().remove(&pin);
        let Some(mut channel) = channel else {
            return;
        };

        channel.shared.running.store(false, Ordering::Release);
        if let Some(worker) = channel.worker.take() {
            let _ = worker.join();
        }
        self.gpio.write(pin, Level::Low);
        debug!(pin, "software PWM channel stopped");
    }
}

impl Drop for SoftPwm {
    fn drop(&mut self) {
        let pins: Vec<u8> = self.channels.lock().keys().copied().collect();
        for pin in pins {
            self.stop(pin);
        }
    }
}

/// Per-channel timing loop.
///
/// Duty 0 and 100 degenerate to a steady level with no toggling, avoiding
/// zero-width pulses.
fn run_channel(gpio: Arc<Gpio>, ch: Arc<ChannelShared>) {
    while ch.running.load(Ordering::Acquire) {
        let duty = ch.duty.load(Ordering::Acquire) as u64;

        if duty == 0 {
            gpio.write(ch.pin, Level::Low);
            wait_cancellable(&ch, ch.period_us);
        } else if duty >= 100 {
            gpio.write(ch.pin, Level::High);
            wait_cancellable(&ch, ch.period_us);
        } else {
            let on_time = ch.period_us * duty / 100;
            gpio.write(ch.pin, Level::High);
            wait_cancellable(&ch, on_time);
            gpio.write(ch.pin, Level::Low);
            wait_cancellable(&ch, ch.period_us - on_time);
        }
    }
}

/// Wait until `us` elapse or the channel is cancelled.
///
/// Deadline-based so the chunked checks do not accumulate overshoot; stop
/// latency is bounded by one check interval, not a full PWM period.
fn wait_cancellable(ch: &ChannelShared, us: u64) {
    let deadline = micros() + us;
    loop {
        if !ch.running.load(Ordering::Acquire) {
            return;
        }
        let now = micros();
        if now >= deadline {
            return;
        }
        delay_us((deadline - now).min(CANCEL_CHECK_US));
    }
}
