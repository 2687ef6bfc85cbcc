//! Full-lifecycle tests across GPIO, software PWM, and hardware PWM.

use rpi_pulse::{Error, Gpio, HwPwm, Level, PinMode, Result, SoftPwm};
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[test]
fn full_gpio_pwm_lifecycle() -> Result<()> {
    init_tracing();

    let gpio = Arc::new(Gpio::new()?);
    gpio.set_mode(21, PinMode::Output);
    gpio.write(21, Level::High);
    assert_eq!(gpio.read(21), Level::High);
    gpio.write(21, Level::Low);
    assert_eq!(gpio.read(21), Level::Low);

    let pwm = SoftPwm::new(Arc::clone(&gpio));
    pwm.start(18)?;
    pwm.set_duty(18, 50);

    let servo = HwPwm::new(Arc::clone(&gpio))?;
    servo.set(12, 50, 75)?;

    // Teardown: engines before the shared mapping.
    pwm.stop(18);
    drop(servo);
    drop(pwm);
    drop(gpio);
    Ok(())
}

#[test]
fn repeated_init_cleanup_cycles() -> Result<()> {
    init_tracing();

    for _ in 0..5 {
        let gpio = Arc::new(Gpio::new()?);
        let pwm = SoftPwm::new(Arc::clone(&gpio));
        pwm.start(18)?;
        pwm.set_duty(18, 80);
        pwm.stop(18);
    }
    Ok(())
}

#[test]
fn stop_from_another_thread_joins_the_worker() -> Result<()> {
    init_tracing();

    let gpio = Arc::new(Gpio::new()?);
    let pwm = Arc::new(SoftPwm::new(Arc::clone(&gpio)));
    pwm.start(23)?;
    pwm.set_duty(23, 40);

    let stopper = {
        let pwm = Arc::clone(&pwm);
        std::thread::spawn(move || pwm.stop(23))
    };
    stopper.join().unwrap();

    assert!(!pwm.is_active(23));
    assert_eq!(gpio.read(23), Level::Low);

    // A second stop from this thread stays a no-op.
    pwm.stop(23);
    Ok(())
}

#[test]
fn concurrent_channels_on_distinct_pins() -> Result<()> {
    init_tracing();

    let gpio = Arc::new(Gpio::new()?);
    let pwm = SoftPwm::new(Arc::clone(&gpio));
    for pin in [5, 6, 16, 26] {
        pwm.start(pin)?;
        pwm.set_duty(pin, i32::from(pin) * 3);
    }
    for pin in [5, 6, 16, 26] {
        assert_eq!(pwm.duty(pin), Some(pin * 3));
        pwm.stop(pin);
        assert!(!pwm.is_active(pin));
    }
    Ok(())
}

#[test]
fn double_start_reports_already_active() -> Result<()> {
    let gpio = Arc::new(Gpio::new()?);
    let pwm = SoftPwm::new(gpio);
    pwm.start(18)?;
    assert!(matches!(pwm.start(18), Err(Error::AlreadyActive { pin: 18 })));
    pwm.stop(18);
    Ok(())
}
