//! Fan drive and tachometer line bindings.

use embassy_stm32::gpio::Input;
use embassy_stm32::peripherals::TIM3;
use embassy_stm32::timer::simple_pwm::SimplePwm;
use embassy_time::Instant;

use psu_core::supervisor::FanPwm;
use psu_core::thermal::{Clock, EdgeProbe};

/// 8-bit fan duty driven out through TIM3 channel 1.
pub struct FanDrive<'d> {
    pwm: SimplePwm<'d, TIM3>,
}

impl<'d> FanDrive<'d> {
    pub fn new(mut pwm: SimplePwm<'d, TIM3>) -> Self {
        pwm.ch1().enable();
        Self { pwm }
    }
}

impl FanPwm for FanDrive<'_> {
    fn set_duty(&mut self, duty: u8) {
        self.pwm.ch1().set_duty_cycle_fraction(duty.into(), 255);
    }
}

/// Open-collector tachometer line, pulled up and sampled as a level.
pub struct TachLine<'d> {
    line: Input<'d>,
}

impl<'d> TachLine<'d> {
    pub fn new(line: Input<'d>) -> Self {
        Self { line }
    }
}

impl EdgeProbe for TachLine<'_> {
    fn level(&mut self) -> bool {
        self.line.is_high()
    }
}

/// Monotonic microsecond clock backed by the Embassy time driver.
#[derive(Copy, Clone, Debug, Default)]
pub struct WallClock;

impl Clock for WallClock {
    fn now_micros(&mut self) -> u64 {
        Instant::now().as_micros()
    }
}
