//! Per-iteration orchestration of the whole control core.
//!
//! The supervisor owns the portable control state (knob pair, lock latch,
//! overtemperature monitor) and drives the peripheral seams gathered in a
//! [`PsuPeripherals`] context object: knob reads flow through calibration
//! to the DAC, averaged readings flow through calibration to the display,
//! and the averaged temperature feeds the overtemperature policy and the
//! fan duty output. Peripherals are constructed once at startup and handed
//! in whole, so firmware, emulator, and tests all run the same loop body.

use libm::roundf;

use crate::calibration::{CURRENT_OUTPUT, CURRENT_READING, VOLTAGE_OUTPUT, VOLTAGE_READING};
use crate::knob::{Axis, KnobConfig, KnobInput, KnobMode, KnobPair};
use crate::thermal::{Clock, EdgeProbe, FanController, OvertempMonitor, OvertempTransition};

/// Logical DAC channel, one per controlled axis.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DacChannel {
    Voltage,
    Current,
}

/// Dual-channel setpoint DAC.
pub trait SetpointDac {
    /// Writes a 0..=4095 code to one channel.
    fn write(&mut self, channel: DacChannel, code: u16);
}

/// DAC that performs no hardware interaction.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopDac;

impl SetpointDac for NoopDac {
    fn write(&mut self, _: DacChannel, _: u16) {}
}

/// Fan PWM duty register.
pub trait FanPwm {
    fn set_duty(&mut self, duty: u8);
}

/// Change-tracked display fields fed once per loop iteration.
///
/// Implementations own their redraw strategy; only the coarse-indicator
/// side effects on mode toggle and the normal/overtemp screen switches are
/// observable behavior the core relies on.
pub trait DisplaySink {
    /// Switches to the normal set/actual screen.
    fn show_normal(&mut self);
    /// Switches to the overtemperature protection screen.
    fn show_overtemp(&mut self);
    /// Shows or hides the lock indicator.
    fn set_lock_indicator(&mut self, locked: bool);
    /// Shows or hides the coarse-tuning indicator for an axis.
    fn set_coarse_indicator(&mut self, axis: Axis, coarse: bool);
    /// Calibrated setpoint in millivolts or milliamps.
    fn set_setpoint_milli(&mut self, axis: Axis, value: i32);
    /// Calibrated averaged reading in millivolts or milliamps.
    fn set_actual_milli(&mut self, axis: Axis, value: i32);
    /// Commanded and measured power in centiwatts.
    fn set_power_centiwatts(&mut self, set: i32, actual: i32);
    /// Averaged heatsink temperature.
    fn set_temperature(&mut self, celsius: f32);
    /// Cached fan speed.
    fn set_fan_rpm(&mut self, rpm: u16);
    /// Flushes changed fields to the panel.
    fn refresh(&mut self);
}

/// Raw operator input state sampled once per iteration.
pub trait ControlPanel {
    /// Monotonic quadrature position for an axis.
    fn knob_position(&mut self, axis: Axis) -> i32;
    /// Debounce-raw press level for an axis.
    fn knob_pressed(&mut self, axis: Axis) -> bool;
    /// Whether the lock-enable input is engaged.
    fn lock_engaged(&mut self) -> bool;
}

/// Averaged sensor snapshot consumed by one loop iteration.
///
/// Values are the raw (uncalibrated) batch averages published by the
/// sampling interrupt.
#[derive(Copy, Clone, Debug, Default)]
pub struct Readings {
    pub voltage_mv: f32,
    pub current_ma: f32,
    pub temp_celsius: f32,
}

/// Owned peripheral handles, constructed once at startup.
pub struct PsuPeripherals<P, D, S, F, E, C> {
    pub panel: P,
    pub dac: D,
    pub display: S,
    pub fan_pwm: F,
    pub fan: FanController<E, C>,
}

/// DAC resolution: codes 0..=4095 span the full output range.
pub const DAC_FULL_SCALE: f32 = 4096.0;
const DAC_MAX_CODE: f32 = 4095.0;

/// Voltage knob: 0..30 V in millivolts, 10 mV fine / 500 mV coarse.
pub const VOLTAGE_KNOB: KnobConfig = KnobConfig::new(0, 30_000, 10, 500);

/// Current knob: 0..2 A in milliamps, 10 mA fine / 100 mA coarse.
pub const CURRENT_KNOB: KnobConfig = KnobConfig::new(0, 2_000, 10, 100);

/// Averaged temperature above which overtemperature protection engages.
pub const OVERTEMP_ON_CELSIUS: f32 = 90.0;

/// Averaged temperature below which protection releases.
pub const OVERTEMP_OFF_CELSIUS: f32 = 80.0;

/// Portable control state driven once per mainline iteration.
pub struct Supervisor {
    knobs: KnobPair,
    overtemp: OvertempMonitor,
    locked: bool,
    reapply_setpoints: bool,
}

impl Supervisor {
    /// Creates a supervisor with the standard knob ranges and thresholds.
    pub fn new() -> Self {
        Self::with_config(
            VOLTAGE_KNOB,
            CURRENT_KNOB,
            OVERTEMP_ON_CELSIUS,
            OVERTEMP_OFF_CELSIUS,
        )
    }

    /// Creates a supervisor with explicit knob and threshold configuration.
    pub fn with_config(
        voltage: KnobConfig,
        current: KnobConfig,
        overtemp_on: f32,
        overtemp_off: f32,
    ) -> Self {
        Self {
            knobs: KnobPair::new(voltage, current),
            overtemp: OvertempMonitor::new(overtemp_on, overtemp_off),
            locked: false,
            reapply_setpoints: false,
        }
    }

    /// Current setpoint for an axis in millivolts or milliamps.
    pub fn setpoint_milli(&self, axis: Axis) -> i32 {
        self.knobs.knob(axis).value()
    }

    /// Current tuning mode for an axis.
    pub fn mode(&self, axis: Axis) -> KnobMode {
        self.knobs.knob(axis).mode()
    }

    /// Whether the front-panel lock is engaged.
    pub const fn is_locked(&self) -> bool {
        self.locked
    }

    /// Whether overtemperature protection is active.
    pub fn is_overtemp(&self) -> bool {
        self.overtemp.is_overtemp()
    }

    /// Runs one mainline iteration.
    ///
    /// Every DAC write issued here derives from this iteration's own knob
    /// read; stale and fresh values are never mixed across iterations.
    pub fn poll<P, D, S, F, E, C>(
        &mut self,
        io: &mut PsuPeripherals<P, D, S, F, E, C>,
        readings: Readings,
    ) where
        P: ControlPanel,
        D: SetpointDac,
        S: DisplaySink,
        F: FanPwm,
        E: EdgeProbe,
        C: Clock,
    {
        // Lock edges. A value adjusted while locked must take effect the
        // moment the lock releases, even if numerically unchanged.
        let locked = io.panel.lock_engaged();
        if locked != self.locked {
            self.locked = locked;
            io.display.set_lock_indicator(locked);
            if !locked {
                self.reapply_setpoints = true;
            }
        }

        // Knobs -> calibration -> DAC. Suppressed entirely while the
        // supply is cooling off.
        if !self.overtemp.is_overtemp() {
            let voltage_in = KnobInput {
                position: io.panel.knob_position(Axis::Voltage),
                pressed: io.panel.knob_pressed(Axis::Voltage),
            };
            let current_in = KnobInput {
                position: io.panel.knob_position(Axis::Current),
                pressed: io.panel.knob_pressed(Axis::Current),
            };
            let (voltage_ev, current_ev) = self.knobs.service(voltage_in, current_in);

            if let Some(coarse) = voltage_ev.coarse_changed {
                io.display.set_coarse_indicator(Axis::Voltage, coarse);
            }
            if let Some(coarse) = current_ev.coarse_changed {
                io.display.set_coarse_indicator(Axis::Current, coarse);
            }

            let dirty =
                voltage_ev.value_changed || current_ev.value_changed || self.reapply_setpoints;
            if dirty && !self.locked {
                self.write_setpoints(&mut io.dac);
                self.reapply_setpoints = false;
            }
        }

        // Overtemperature hysteresis on the averaged temperature.
        match self.overtemp.evaluate(readings.temp_celsius) {
            OvertempTransition::Entered => {
                self.knobs.zero_values();
                io.dac.write(DacChannel::Voltage, 0);
                io.dac.write(DacChannel::Current, 0);
                io.display.show_overtemp();
            }
            OvertempTransition::Exited => {
                io.display.show_normal();
                self.reapply_setpoints = true;
            }
            OvertempTransition::Unchanged => {}
        }

        // Display fields and diffed refresh.
        let v_set = self.knobs.knob(Axis::Voltage).value();
        let i_set = self.knobs.knob(Axis::Current).value();
        let v_act = VOLTAGE_READING.correct_milli(readings.voltage_mv as i32);
        let i_act = CURRENT_READING.correct_milli(readings.current_ma as i32);
        io.display.set_setpoint_milli(Axis::Voltage, v_set);
        io.display.set_setpoint_milli(Axis::Current, i_set);
        io.display.set_actual_milli(Axis::Voltage, v_act);
        io.display.set_actual_milli(Axis::Current, i_act);
        io.display
            .set_power_centiwatts(centiwatts(v_set, i_set), centiwatts(v_act, i_act));
        io.display.set_temperature(readings.temp_celsius);
        io.display.set_fan_rpm(io.fan.cached_rpm());
        io.display.refresh();

        // Fan duty policy.
        let duty = io.fan.duty(readings.temp_celsius);
        io.fan_pwm.set_duty(duty);
    }

    fn write_setpoints<D: SetpointDac>(&self, dac: &mut D) {
        let v_mv = self.knobs.knob(Axis::Voltage).value();
        let i_ma = self.knobs.knob(Axis::Current).value();
        dac.write(
            DacChannel::Voltage,
            output_code(VOLTAGE_OUTPUT.correct_milli(v_mv), 30_000),
        );
        dac.write(
            DacChannel::Current,
            output_code(CURRENT_OUTPUT.correct_milli(i_ma), 2_000),
        );
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts a calibrated milli-unit setpoint to a DAC code.
fn output_code(milli: i32, full_scale_milli: i32) -> u16 {
    let code = roundf(milli as f32 / full_scale_milli as f32 * DAC_FULL_SCALE);
    if code <= 0.0 {
        0
    } else if code >= DAC_MAX_CODE {
        DAC_MAX_CODE as u16
    } else {
        code as u16
    }
}

/// Power from milli-unit factors, in centiwatts.
fn centiwatts(milli_volts: i32, milli_amps: i32) -> i32 {
    milli_volts * milli_amps / 10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_code_spans_the_dac_range() {
        assert_eq!(output_code(0, 30_000), 0);
        assert_eq!(output_code(15_000, 30_000), 2048);
        // Full scale saturates at the last representable code.
        assert_eq!(output_code(30_000, 30_000), 4095);
        assert_eq!(output_code(-5, 30_000), 0);
    }

    #[test]
    fn centiwatts_from_milli_factors() {
        assert_eq!(centiwatts(5_000, 1_000), 500);
        assert_eq!(centiwatts(30_000, 2_000), 6_000);
        assert_eq!(centiwatts(0, 2_000), 0);
    }
}
