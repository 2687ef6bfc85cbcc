//! Property tests for the silent-clamp policies and timer arming.

use proptest::prelude::*;
use rpi_pulse::{Gpio, SoftPwm, Timer, millis};
use std::sync::Arc;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Any duty input, however wild, is stored as clamp(duty, 0, 100).
    #[test]
    fn software_duty_clamps_to_percent(duty in any::<i32>()) {
        let gpio = Arc::new(Gpio::new().unwrap());
        let pwm = SoftPwm::new(gpio);
        pwm.start(18).unwrap();

        pwm.set_duty(18, duty);
        let stored = pwm.duty(18).unwrap();
        prop_assert_eq!(i32::from(stored), duty.clamp(0, 100));

        pwm.stop(18);
    }

    /// Arming always places the expiry exactly one interval ahead.
    #[test]
    fn arming_anchors_expiry_one_interval_ahead(interval in 0u64..1_000_000) {
        let before = millis();
        let mut t = Timer::new();
        t.set(interval);
        let after = millis();

        prop_assert_eq!(t.interval, interval);
        prop_assert!(t.next_expiry >= before + interval);
        prop_assert!(t.next_expiry <= after + interval);
    }

    /// A comfortably-long interval is never expired right after arming; a
    /// zero interval always is.
    #[test]
    fn freshly_armed_expiry_matches_interval(interval in prop_oneof![Just(0u64), 60_000u64..1_000_000]) {
        let mut t = Timer::new();
        t.set(interval);
        prop_assert_eq!(t.expired(), interval == 0);
    }

    /// Out-of-range pins never disturb engine state.
    #[test]
    fn out_of_range_pins_are_inert(pin in 54u8..=u8::MAX) {
        let gpio = Arc::new(Gpio::new().unwrap());
        let pwm = SoftPwm::new(gpio);

        pwm.start(pin).unwrap();
        prop_assert!(!pwm.is_active(pin));
        pwm.set_duty(pin, 50);
        prop_assert_eq!(pwm.duty(pin), None);
        pwm.stop(pin);
    }
}
