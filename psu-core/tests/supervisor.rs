//! End-to-end loop scenarios against mock peripherals.

use psu_core::knob::{Axis, KnobMode};
use psu_core::supervisor::{
    ControlPanel, DacChannel, DisplaySink, FanPwm, PsuPeripherals, Readings, SetpointDac,
    Supervisor,
};
use psu_core::thermal::{Clock, EdgeProbe, FanController, FanPolicy};

#[derive(Default)]
struct MockPanel {
    voltage_position: i32,
    voltage_pressed: bool,
    current_position: i32,
    current_pressed: bool,
    lock: bool,
}

impl ControlPanel for MockPanel {
    fn knob_position(&mut self, axis: Axis) -> i32 {
        match axis {
            Axis::Voltage => self.voltage_position,
            Axis::Current => self.current_position,
        }
    }

    fn knob_pressed(&mut self, axis: Axis) -> bool {
        match axis {
            Axis::Voltage => self.voltage_pressed,
            Axis::Current => self.current_pressed,
        }
    }

    fn lock_engaged(&mut self) -> bool {
        self.lock
    }
}

#[derive(Default)]
struct MockDac {
    writes: Vec<(DacChannel, u16)>,
}

impl SetpointDac for MockDac {
    fn write(&mut self, channel: DacChannel, code: u16) {
        self.writes.push((channel, code));
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Screen {
    Normal,
    Overtemp,
}

struct MockDisplay {
    screen: Screen,
    locked: bool,
    coarse: Vec<(Axis, bool)>,
    setpoints: [i32; 2],
    actuals: [i32; 2],
    refresh_count: u32,
}

impl Default for MockDisplay {
    fn default() -> Self {
        Self {
            screen: Screen::Normal,
            locked: false,
            coarse: Vec::new(),
            setpoints: [0; 2],
            actuals: [0; 2],
            refresh_count: 0,
        }
    }
}

fn slot(axis: Axis) -> usize {
    match axis {
        Axis::Voltage => 0,
        Axis::Current => 1,
    }
}

impl DisplaySink for MockDisplay {
    fn show_normal(&mut self) {
        self.screen = Screen::Normal;
    }

    fn show_overtemp(&mut self) {
        self.screen = Screen::Overtemp;
    }

    fn set_lock_indicator(&mut self, locked: bool) {
        self.locked = locked;
    }

    fn set_coarse_indicator(&mut self, axis: Axis, coarse: bool) {
        self.coarse.push((axis, coarse));
    }

    fn set_setpoint_milli(&mut self, axis: Axis, value: i32) {
        self.setpoints[slot(axis)] = value;
    }

    fn set_actual_milli(&mut self, axis: Axis, value: i32) {
        self.actuals[slot(axis)] = value;
    }

    fn set_power_centiwatts(&mut self, _set: i32, _actual: i32) {}

    fn set_temperature(&mut self, _celsius: f32) {}

    fn set_fan_rpm(&mut self, _rpm: u16) {}

    fn refresh(&mut self) {
        self.refresh_count += 1;
    }
}

#[derive(Default)]
struct MockFanPwm {
    duty: u8,
}

impl FanPwm for MockFanPwm {
    fn set_duty(&mut self, duty: u8) {
        self.duty = duty;
    }
}

/// Tachometer line that never transitions; every measurement times out.
struct DeadLine;

impl EdgeProbe for DeadLine {
    fn level(&mut self) -> bool {
        false
    }
}

struct TickClock {
    now: u64,
}

impl Clock for TickClock {
    fn now_micros(&mut self) -> u64 {
        self.now += 1_000;
        self.now
    }
}

type TestPeripherals = PsuPeripherals<MockPanel, MockDac, MockDisplay, MockFanPwm, DeadLine, TickClock>;

fn test_rig() -> (Supervisor, TestPeripherals) {
    let io = PsuPeripherals {
        panel: MockPanel::default(),
        dac: MockDac::default(),
        display: MockDisplay::default(),
        fan_pwm: MockFanPwm::default(),
        fan: FanController::new(DeadLine, TickClock { now: 0 }, FanPolicy::new(40.0, 70.0)),
    };
    (Supervisor::new(), io)
}

fn cool() -> Readings {
    Readings {
        voltage_mv: 0.0,
        current_ma: 0.0,
        temp_celsius: 25.0,
    }
}

fn at_temp(celsius: f32) -> Readings {
    Readings {
        temp_celsius: celsius,
        ..cool()
    }
}

#[test]
fn knob_turn_writes_calibrated_codes_same_iteration() {
    let (mut supervisor, mut io) = test_rig();

    // One detent on each knob in slow mode: +10 mV, +10 mA.
    io.panel.voltage_position = 1;
    io.panel.current_position = 1;
    supervisor.poll(&mut io, cool());

    assert_eq!(supervisor.setpoint_milli(Axis::Voltage), 10);
    assert_eq!(supervisor.setpoint_milli(Axis::Current), 10);
    assert_eq!(io.dac.writes.len(), 2);
    assert_eq!(io.dac.writes[0].0, DacChannel::Voltage);
    assert_eq!(io.dac.writes[1].0, DacChannel::Current);
    assert_eq!(io.display.setpoints, [10, 10]);
    assert_eq!(io.display.refresh_count, 1);
}

#[test]
fn idle_iterations_do_not_rewrite_the_dac() {
    let (mut supervisor, mut io) = test_rig();

    io.panel.voltage_position = 5;
    supervisor.poll(&mut io, cool());
    let writes = io.dac.writes.len();

    supervisor.poll(&mut io, cool());
    supervisor.poll(&mut io, cool());
    assert_eq!(io.dac.writes.len(), writes);
}

#[test]
fn readings_flow_through_reading_calibration() {
    let (mut supervisor, mut io) = test_rig();

    supervisor.poll(
        &mut io,
        Readings {
            voltage_mv: 10_000.0,
            current_ma: 1_000.0,
            temp_celsius: 25.0,
        },
    );

    // The 10 V grid point reads 10.11 V on this supply; the 1 A point 1.23 A.
    assert_eq!(io.display.actuals[0], 10_110);
    assert_eq!(io.display.actuals[1], 1_230);
}

#[test]
fn overtemp_sequence_zeroes_and_recovers() {
    let (mut supervisor, mut io) = test_rig();

    io.panel.voltage_position = 10;
    supervisor.poll(&mut io, at_temp(85.0));
    assert_eq!(supervisor.setpoint_milli(Axis::Voltage), 100);
    assert!(!supervisor.is_overtemp());

    // 85 -> 91 crosses the ON threshold: setpoints and outputs zeroed,
    // protective screen shown.
    io.dac.writes.clear();
    supervisor.poll(&mut io, at_temp(91.0));
    assert!(supervisor.is_overtemp());
    assert_eq!(supervisor.setpoint_milli(Axis::Voltage), 0);
    assert_eq!(io.dac.writes, vec![(DacChannel::Voltage, 0), (DacChannel::Current, 0)]);
    assert_eq!(io.display.screen, Screen::Overtemp);

    // Back to 85: OFF (80) not crossed, still protected and knobs ignored.
    io.panel.voltage_position = 20;
    io.dac.writes.clear();
    supervisor.poll(&mut io, at_temp(85.0));
    assert!(supervisor.is_overtemp());
    assert_eq!(supervisor.setpoint_milli(Axis::Voltage), 0);
    assert!(io.dac.writes.is_empty());

    // 79 crosses OFF: normal display restored, control resumes.
    supervisor.poll(&mut io, at_temp(79.0));
    assert!(!supervisor.is_overtemp());
    assert_eq!(io.display.screen, Screen::Normal);

    // The next iteration reapplies setpoints (still zero) to the DAC.
    supervisor.poll(&mut io, at_temp(79.0));
    assert!(!io.dac.writes.is_empty());
}

#[test]
fn lock_suppresses_writes_and_release_reapplies() {
    let (mut supervisor, mut io) = test_rig();

    io.panel.voltage_position = 3;
    supervisor.poll(&mut io, cool());
    io.dac.writes.clear();

    // Engage the lock: the indicator lights and knob turns still adjust
    // the stored setpoint, but nothing reaches the DAC.
    io.panel.lock = true;
    io.panel.voltage_position = 8;
    supervisor.poll(&mut io, cool());
    assert!(supervisor.is_locked());
    assert!(io.display.locked);
    assert_eq!(supervisor.setpoint_milli(Axis::Voltage), 80);
    assert!(io.dac.writes.is_empty());

    // Release: the value adjusted while locked takes effect immediately,
    // even though it did not change this iteration.
    io.panel.lock = false;
    supervisor.poll(&mut io, cool());
    assert!(!supervisor.is_locked());
    assert!(!io.display.locked);
    assert_eq!(io.dac.writes.len(), 2);
}

#[test]
fn coarse_mode_is_exclusive_across_the_pair() {
    let (mut supervisor, mut io) = test_rig();

    io.panel.voltage_pressed = true;
    supervisor.poll(&mut io, cool());
    assert_eq!(supervisor.mode(Axis::Voltage), KnobMode::Fast);
    assert_eq!(io.display.coarse, vec![(Axis::Voltage, true)]);

    // Pressing the current knob hands coarse mode over and clears the
    // voltage indicator in the same iteration.
    io.panel.voltage_pressed = false;
    io.panel.current_pressed = true;
    io.display.coarse.clear();
    supervisor.poll(&mut io, cool());
    assert_eq!(supervisor.mode(Axis::Voltage), KnobMode::Slow);
    assert_eq!(supervisor.mode(Axis::Current), KnobMode::Fast);
    assert!(io.display.coarse.contains(&(Axis::Voltage, false)));
    assert!(io.display.coarse.contains(&(Axis::Current, true)));
}

#[test]
fn fan_duty_follows_temperature_each_iteration() {
    let (mut supervisor, mut io) = test_rig();

    supervisor.poll(&mut io, at_temp(25.0));
    assert_eq!(io.fan_pwm.duty, 0);

    supervisor.poll(&mut io, at_temp(55.0));
    assert_eq!(io.fan_pwm.duty, 127);

    // An implausible reading latches full cooling for good.
    supervisor.poll(&mut io, at_temp(0.5));
    assert_eq!(io.fan_pwm.duty, 255);
    supervisor.poll(&mut io, at_temp(25.0));
    assert_eq!(io.fan_pwm.duty, 255);
}

#[test]
fn dead_tach_line_reports_zero_rpm() {
    let (mut supervisor, mut io) = test_rig();
    supervisor.poll(&mut io, cool());
    assert_eq!(io.fan.cached_rpm(), 0);
}
