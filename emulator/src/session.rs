use std::cell::Cell;
use std::rc::Rc;

use psu_core::knob::{Axis, KnobMode};
use psu_core::supervisor::{
    ControlPanel, DAC_FULL_SCALE, DacChannel, DisplaySink, FanPwm, PsuPeripherals, Readings,
    SetpointDac, Supervisor,
};
use psu_core::thermal::{Clock, EdgeProbe, FanController, FanPolicy};

/// Fan thresholds mirroring the firmware wiring.
const FAN_ON_CELSIUS: f32 = 40.0;
const FAN_MAX_CELSIUS: f32 = 60.0;

/// Simulated time advanced per clock read during tach measurement.
const CLOCK_TICK_US: u64 = 10;

pub const HELP_TOPICS: &[(&str, &str)] = &[
    ("v", "v <+n|-n>      - turn the voltage knob n detents"),
    ("i", "i <+n|-n>      - turn the current knob n detents"),
    ("press", "press <v|i>    - push a knob to toggle coarse tuning"),
    ("lock", "lock <on|off>  - engage or release the front-panel lock"),
    ("temp", "temp <celsius> - set the simulated heatsink temperature"),
    ("fan", "fan <rpm>      - set the simulated fan speed (0 stalls it)"),
    ("run", "run [n]        - run n supervisor iterations (default 1)"),
    ("status", "status         - show supply state and panel contents"),
    ("help", "help [topic]   - show help for a command"),
];

/// Simulated front panel: positions and levels poked by commands.
#[derive(Default)]
struct SimPanel {
    voltage_position: i32,
    current_position: i32,
    voltage_pressed: bool,
    current_pressed: bool,
    locked: bool,
}

impl ControlPanel for SimPanel {
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
        self.locked
    }
}

/// Records the last code written to each channel.
#[derive(Default)]
struct SimDac {
    voltage_code: u16,
    current_code: u16,
}

impl SetpointDac for SimDac {
    fn write(&mut self, channel: DacChannel, code: u16) {
        match channel {
            DacChannel::Voltage => self.voltage_code = code,
            DacChannel::Current => self.current_code = code,
        }
    }
}

/// Retained panel contents, rendered on demand by `status`.
#[derive(Default)]
struct SimDisplay {
    overtemp_screen: bool,
    lock_shown: bool,
    voltage_coarse: bool,
    current_coarse: bool,
    v_set: i32,
    i_set: i32,
    v_act: i32,
    i_act: i32,
    power_set: i32,
    power_act: i32,
    temp: f32,
    rpm: u16,
}

impl DisplaySink for SimDisplay {
    fn show_normal(&mut self) {
        self.overtemp_screen = false;
    }

    fn show_overtemp(&mut self) {
        self.overtemp_screen = true;
    }

    fn set_lock_indicator(&mut self, locked: bool) {
        self.lock_shown = locked;
    }

    fn set_coarse_indicator(&mut self, axis: Axis, coarse: bool) {
        match axis {
            Axis::Voltage => self.voltage_coarse = coarse,
            Axis::Current => self.current_coarse = coarse,
        }
    }

    fn set_setpoint_milli(&mut self, axis: Axis, value: i32) {
        match axis {
            Axis::Voltage => self.v_set = value,
            Axis::Current => self.i_set = value,
        }
    }

    fn set_actual_milli(&mut self, axis: Axis, value: i32) {
        match axis {
            Axis::Voltage => self.v_act = value,
            Axis::Current => self.i_act = value,
        }
    }

    fn set_power_centiwatts(&mut self, set: i32, actual: i32) {
        self.power_set = set;
        self.power_act = actual;
    }

    fn set_temperature(&mut self, celsius: f32) {
        self.temp = celsius;
    }

    fn set_fan_rpm(&mut self, rpm: u16) {
        self.rpm = rpm;
    }

    fn refresh(&mut self) {}
}

/// Captures the fan duty commanded by the supervisor.
#[derive(Default)]
struct SimFanPwm {
    duty: u8,
}

impl FanPwm for SimFanPwm {
    fn set_duty(&mut self, duty: u8) {
        self.duty = duty;
    }
}

/// Square tachometer wave derived from shared simulated time.
struct SimTach {
    now: Rc<Cell<u64>>,
    half_period_us: Rc<Cell<u64>>,
}

impl EdgeProbe for SimTach {
    fn level(&mut self) -> bool {
        let half = self.half_period_us.get();
        if half == 0 {
            // Stalled fan holds the line steady.
            return true;
        }
        (self.now.get() / half) % 2 == 0
    }
}

/// Clock that moves simulated time forward on every read.
struct SimClock {
    now: Rc<Cell<u64>>,
}

impl Clock for SimClock {
    fn now_micros(&mut self) -> u64 {
        let t = self.now.get();
        self.now.set(t + CLOCK_TICK_US);
        t
    }
}

type SimIo = PsuPeripherals<SimPanel, SimDac, SimDisplay, SimFanPwm, SimTach, SimClock>;

pub struct Session {
    supervisor: Supervisor,
    io: SimIo,
    temp_celsius: f32,
    fan_half_period_us: Rc<Cell<u64>>,
    iterations: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let now = Rc::new(Cell::new(0));
        let fan_half_period_us = Rc::new(Cell::new(rpm_to_half_period(3_000)));
        let fan = FanController::new(
            SimTach {
                now: Rc::clone(&now),
                half_period_us: Rc::clone(&fan_half_period_us),
            },
            SimClock { now },
            FanPolicy::new(FAN_ON_CELSIUS, FAN_MAX_CELSIUS),
        );

        Self {
            supervisor: Supervisor::new(),
            io: PsuPeripherals {
                panel: SimPanel::default(),
                dac: SimDac::default(),
                display: SimDisplay::default(),
                fan_pwm: SimFanPwm::default(),
                fan,
            },
            temp_celsius: 25.0,
            fan_half_period_us,
            iterations: 0,
        }
    }

    pub fn handle_command(&mut self, line: &str) -> Vec<String> {
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            return Vec::new();
        };
        let arg = parts.next();
        if parts.next().is_some() {
            return vec!["Too many arguments. Try `help`.".to_string()];
        }

        match command.to_ascii_lowercase().as_str() {
            "v" => self.turn(Axis::Voltage, arg),
            "i" => self.turn(Axis::Current, arg),
            "press" => self.press(arg),
            "lock" => self.lock(arg),
            "temp" => self.set_temp(arg),
            "fan" => self.set_fan(arg),
            "run" => self.run(arg),
            "status" => self.status(),
            "help" => Ok(help_lines(arg)),
            other => Err(format!("Unknown command `{other}`. Try `help`.")),
        }
        .unwrap_or_else(|err| vec![err])
    }

    fn turn(&mut self, axis: Axis, arg: Option<&str>) -> Result<Vec<String>, String> {
        let detents: i32 = arg
            .ok_or("Expected a detent count, e.g. `v +3`")?
            .parse()
            .map_err(|_| "Detent count must be a signed integer".to_string())?;
        match axis {
            Axis::Voltage => self.io.panel.voltage_position += detents,
            Axis::Current => self.io.panel.current_position += detents,
        }
        self.step();
        Ok(vec![self.setpoint_line(axis)])
    }

    fn press(&mut self, arg: Option<&str>) -> Result<Vec<String>, String> {
        let axis = parse_axis(arg.ok_or("Expected a knob, e.g. `press v`")?)?;
        match axis {
            Axis::Voltage => self.io.panel.voltage_pressed = true,
            Axis::Current => self.io.panel.current_pressed = true,
        }
        self.step();
        self.io.panel.voltage_pressed = false;
        self.io.panel.current_pressed = false;
        // Run the release so the next press is an edge again.
        self.step();
        Ok(vec![format!(
            "{} knob: {} tuning",
            axis_name(axis),
            mode_name(self.supervisor.mode(axis)),
        )])
    }

    fn lock(&mut self, arg: Option<&str>) -> Result<Vec<String>, String> {
        let engaged = match arg {
            Some("on") => true,
            Some("off") => false,
            _ => return Err("Expected `lock on` or `lock off`".to_string()),
        };
        self.io.panel.locked = engaged;
        self.step();
        Ok(vec![format!(
            "Lock {}",
            if engaged { "engaged" } else { "released" }
        )])
    }

    fn set_temp(&mut self, arg: Option<&str>) -> Result<Vec<String>, String> {
        let celsius: f32 = arg
            .ok_or("Expected a temperature, e.g. `temp 55`")?
            .parse()
            .map_err(|_| "Temperature must be a number".to_string())?;
        self.temp_celsius = celsius;
        self.step();
        Ok(vec![format!(
            "Heatsink at {celsius:.1} C, fan duty {}/255{}",
            self.io.fan_pwm.duty,
            if self.supervisor.is_overtemp() {
                ", OVERTEMPERATURE"
            } else {
                ""
            }
        )])
    }

    fn set_fan(&mut self, arg: Option<&str>) -> Result<Vec<String>, String> {
        let rpm: u32 = arg
            .ok_or("Expected a speed, e.g. `fan 3000`")?
            .parse()
            .map_err(|_| "Fan speed must be a non-negative integer".to_string())?;
        self.fan_half_period_us.set(rpm_to_half_period(rpm));
        Ok(vec![format!("Simulated fan speed set to {rpm} RPM")])
    }

    fn run(&mut self, arg: Option<&str>) -> Result<Vec<String>, String> {
        let count: u32 = match arg {
            Some(text) => text
                .parse()
                .map_err(|_| "Iteration count must be a positive integer".to_string())?,
            None => 1,
        };
        for _ in 0..count {
            self.step();
        }
        Ok(vec![format!(
            "Ran {count} iteration{} ({} total)",
            if count == 1 { "" } else { "s" },
            self.iterations
        )])
    }

    fn status(&mut self) -> Result<Vec<String>, String> {
        let display = &self.io.display;
        let mut lines = vec![
            format!(
                "screen: {}",
                if display.overtemp_screen {
                    "OVERTEMPERATURE"
                } else {
                    "normal"
                }
            ),
            format!(
                "set:    {} / {}{}{}",
                milli_volts(display.v_set),
                milli_amps(display.i_set),
                if display.voltage_coarse { "  [V coarse]" } else { "" },
                if display.current_coarse { "  [I coarse]" } else { "" },
            ),
            format!(
                "actual: {} / {}",
                milli_volts(display.v_act),
                milli_amps(display.i_act)
            ),
            format!(
                "power:  {:.2} W set, {:.2} W actual",
                display.power_set as f32 / 100.0,
                display.power_act as f32 / 100.0
            ),
            format!(
                "heat:   {:.1} C, fan {}/255, {} RPM{}",
                display.temp,
                self.io.fan_pwm.duty,
                display.rpm,
                if self.io.fan.failsafe() { ", FAILSAFE" } else { "" },
            ),
            format!(
                "dac:    V={} I={}",
                self.io.dac.voltage_code, self.io.dac.current_code
            ),
        ];
        if display.lock_shown {
            lines.push("lock:   engaged".to_string());
        }
        Ok(lines)
    }

    /// Runs one supervisor iteration against the simulated peripherals.
    ///
    /// Actual readings feed back from the DAC codes, so a setpoint shows up
    /// as its own measurement the way a healthy supply would track it.
    fn step(&mut self) {
        let readings = Readings {
            voltage_mv: f32::from(self.io.dac.voltage_code) / DAC_FULL_SCALE * 30_000.0,
            current_ma: f32::from(self.io.dac.current_code) / DAC_FULL_SCALE * 2_000.0,
            temp_celsius: self.temp_celsius,
        };
        self.supervisor.poll(&mut self.io, readings);
        self.iterations += 1;
    }

    fn setpoint_line(&self, axis: Axis) -> String {
        let value = self.supervisor.setpoint_milli(axis);
        let rendered = match axis {
            Axis::Voltage => milli_volts(value),
            Axis::Current => milli_amps(value),
        };
        format!(
            "{} setpoint: {} ({} tuning)",
            axis_name(axis),
            rendered,
            mode_name(self.supervisor.mode(axis)),
        )
    }
}

fn help_lines(topic: Option<&str>) -> Vec<String> {
    match topic {
        Some(topic) => {
            let topic = topic.to_ascii_lowercase();
            let lines: Vec<String> = HELP_TOPICS
                .iter()
                .filter(|(name, _)| *name == topic)
                .map(|(_, text)| (*text).to_string())
                .collect();
            if lines.is_empty() {
                vec![format!("No help for `{topic}`. Try `help`.")]
            } else {
                lines
            }
        }
        None => HELP_TOPICS
            .iter()
            .map(|(_, text)| (*text).to_string())
            .collect(),
    }
}

fn parse_axis(text: &str) -> Result<Axis, String> {
    match text.to_ascii_lowercase().as_str() {
        "v" => Ok(Axis::Voltage),
        "i" => Ok(Axis::Current),
        _ => Err("Expected `v` or `i`".to_string()),
    }
}

const fn axis_name(axis: Axis) -> &'static str {
    match axis {
        Axis::Voltage => "Voltage",
        Axis::Current => "Current",
    }
}

const fn mode_name(mode: KnobMode) -> &'static str {
    match mode {
        KnobMode::Slow => "fine",
        KnobMode::Fast => "coarse",
    }
}

fn milli_volts(value: i32) -> String {
    format!("{:.3} V", value as f32 / 1000.0)
}

fn milli_amps(value: i32) -> String {
    format!("{:.3} A", value as f32 / 1000.0)
}

fn rpm_to_half_period(rpm: u32) -> u64 {
    if rpm == 0 {
        0
    } else {
        60_000_000 / u64::from(rpm) / 2
    }
}
