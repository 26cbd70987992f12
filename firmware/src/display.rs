//! Change-tracked display fields for the front panel.
//!
//! [`PanelDisplay`] implements the core's `DisplaySink` on top of a small
//! bitmask diff: field setters only mark a field dirty when its value
//! actually changed, and `refresh` pushes just the dirty fields to a
//! [`FieldWriter`]. The writer is the seam to the actual character
//! rendering, which lives outside this crate's scope; the firmware wires
//! in a defmt-backed writer, tests a recording one.

use psu_core::knob::Axis;
use psu_core::supervisor::DisplaySink;

const VSET_CHANGED: u16 = 1 << 0;
const ISET_CHANGED: u16 = 1 << 1;
const VACT_CHANGED: u16 = 1 << 2;
const IACT_CHANGED: u16 = 1 << 3;
const POWER_CHANGED: u16 = 1 << 4;
const TEMP_CHANGED: u16 = 1 << 5;
const RPM_CHANGED: u16 = 1 << 6;

/// Screen currently shown on the panel.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Screen {
    Normal,
    Overtemp,
}

/// A single dirty field pushed out during a refresh.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Field {
    SetpointMilli(Axis, i32),
    ActualMilli(Axis, i32),
    PowerCentiwatts(i32, i32),
    TemperatureCelsius(f32),
    FanRpm(u16),
}

/// Receiver for screen switches, indicator toggles, and dirty fields.
pub trait FieldWriter {
    fn screen(&mut self, screen: Screen);
    fn lock_indicator(&mut self, locked: bool);
    fn coarse_indicator(&mut self, axis: Axis, coarse: bool);
    fn field(&mut self, field: Field);
}

/// Diffing display sink; redraws only what changed.
pub struct PanelDisplay<W> {
    writer: W,
    changed: u16,
    v_set: i32,
    i_set: i32,
    v_act: i32,
    i_act: i32,
    power: (i32, i32),
    temp: f32,
    rpm: u16,
}

impl<W: FieldWriter> PanelDisplay<W> {
    /// Creates the sink showing the normal screen with everything dirty,
    /// so the first refresh paints every field.
    pub fn new(mut writer: W) -> Self {
        writer.screen(Screen::Normal);
        Self {
            writer,
            changed: u16::MAX,
            v_set: 0,
            i_set: 0,
            v_act: 0,
            i_act: 0,
            power: (0, 0),
            temp: 0.0,
            rpm: 0,
        }
    }

    fn update_i32(slot: &mut i32, value: i32, changed: &mut u16, bit: u16) {
        if *slot != value {
            *slot = value;
            *changed |= bit;
        }
    }
}

impl<W: FieldWriter> DisplaySink for PanelDisplay<W> {
    fn show_normal(&mut self) {
        self.writer.screen(Screen::Normal);
        // Screen switch clears the panel; repaint everything.
        self.changed = u16::MAX;
    }

    fn show_overtemp(&mut self) {
        self.writer.screen(Screen::Overtemp);
        self.changed = u16::MAX;
    }

    fn set_lock_indicator(&mut self, locked: bool) {
        self.writer.lock_indicator(locked);
    }

    fn set_coarse_indicator(&mut self, axis: Axis, coarse: bool) {
        self.writer.coarse_indicator(axis, coarse);
    }

    fn set_setpoint_milli(&mut self, axis: Axis, value: i32) {
        match axis {
            Axis::Voltage => {
                Self::update_i32(&mut self.v_set, value, &mut self.changed, VSET_CHANGED);
            }
            Axis::Current => {
                Self::update_i32(&mut self.i_set, value, &mut self.changed, ISET_CHANGED);
            }
        }
    }

    fn set_actual_milli(&mut self, axis: Axis, value: i32) {
        match axis {
            Axis::Voltage => {
                Self::update_i32(&mut self.v_act, value, &mut self.changed, VACT_CHANGED);
            }
            Axis::Current => {
                Self::update_i32(&mut self.i_act, value, &mut self.changed, IACT_CHANGED);
            }
        }
    }

    fn set_power_centiwatts(&mut self, set: i32, actual: i32) {
        if self.power != (set, actual) {
            self.power = (set, actual);
            self.changed |= POWER_CHANGED;
        }
    }

    fn set_temperature(&mut self, celsius: f32) {
        if self.temp != celsius {
            self.temp = celsius;
            self.changed |= TEMP_CHANGED;
        }
    }

    fn set_fan_rpm(&mut self, rpm: u16) {
        if self.rpm != rpm {
            self.rpm = rpm;
            self.changed |= RPM_CHANGED;
        }
    }

    fn refresh(&mut self) {
        if self.changed & VSET_CHANGED != 0 {
            self.writer.field(Field::SetpointMilli(Axis::Voltage, self.v_set));
        }
        if self.changed & ISET_CHANGED != 0 {
            self.writer.field(Field::SetpointMilli(Axis::Current, self.i_set));
        }
        if self.changed & VACT_CHANGED != 0 {
            self.writer.field(Field::ActualMilli(Axis::Voltage, self.v_act));
        }
        if self.changed & IACT_CHANGED != 0 {
            self.writer.field(Field::ActualMilli(Axis::Current, self.i_act));
        }
        if self.changed & POWER_CHANGED != 0 {
            self.writer
                .field(Field::PowerCentiwatts(self.power.0, self.power.1));
        }
        if self.changed & TEMP_CHANGED != 0 {
            self.writer.field(Field::TemperatureCelsius(self.temp));
        }
        if self.changed & RPM_CHANGED != 0 {
            self.writer.field(Field::FanRpm(self.rpm));
        }
        self.changed = 0;
    }
}

#[cfg(target_os = "none")]
pub use rtt_writer::RttFieldWriter;

#[cfg(target_os = "none")]
mod rtt_writer {
    use psu_core::knob::Axis;

    use super::{Field, FieldWriter, Screen};

    const fn axis_label(axis: Axis) -> &'static str {
        match axis {
            Axis::Voltage => "V",
            Axis::Current => "I",
        }
    }

    /// Panel writer that mirrors field updates over RTT.
    #[derive(Copy, Clone, Debug, Default)]
    pub struct RttFieldWriter;

    impl FieldWriter for RttFieldWriter {
        fn screen(&mut self, screen: Screen) {
            match screen {
                Screen::Normal => defmt::info!("panel: normal screen"),
                Screen::Overtemp => defmt::warn!("panel: overtemperature screen"),
            }
        }

        fn lock_indicator(&mut self, locked: bool) {
            defmt::info!("panel: lock {=bool}", locked);
        }

        fn coarse_indicator(&mut self, axis: Axis, coarse: bool) {
            defmt::info!("panel: {=str} coarse {=bool}", axis_label(axis), coarse);
        }

        fn field(&mut self, field: Field) {
            match field {
                Field::SetpointMilli(axis, value) => {
                    defmt::debug!("panel: {=str}set {=i32}", axis_label(axis), value);
                }
                Field::ActualMilli(axis, value) => {
                    defmt::debug!("panel: {=str}act {=i32}", axis_label(axis), value);
                }
                Field::PowerCentiwatts(set, actual) => {
                    defmt::debug!("panel: power {=i32}/{=i32} cW", set, actual);
                }
                Field::TemperatureCelsius(celsius) => {
                    defmt::debug!("panel: temp {=f32} C", celsius);
                }
                Field::FanRpm(rpm) => {
                    defmt::debug!("panel: fan {=u16} rpm", rpm);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingWriter {
        fields: Vec<Field>,
        screens: Vec<Screen>,
    }

    impl FieldWriter for RecordingWriter {
        fn screen(&mut self, screen: Screen) {
            self.screens.push(screen);
        }

        fn lock_indicator(&mut self, _locked: bool) {}

        fn coarse_indicator(&mut self, _axis: Axis, _coarse: bool) {}

        fn field(&mut self, field: Field) {
            self.fields.push(field);
        }
    }

    #[test]
    fn first_refresh_paints_every_field() {
        let mut display = PanelDisplay::new(RecordingWriter::default());
        display.refresh();
        assert_eq!(display.writer.fields.len(), 7);
    }

    #[test]
    fn unchanged_fields_are_not_redrawn() {
        let mut display = PanelDisplay::new(RecordingWriter::default());
        display.refresh();
        display.writer.fields.clear();

        display.set_setpoint_milli(Axis::Voltage, 0);
        display.set_fan_rpm(0);
        display.refresh();
        assert!(display.writer.fields.is_empty());

        display.set_setpoint_milli(Axis::Voltage, 1_500);
        display.refresh();
        assert_eq!(
            display.writer.fields,
            vec![Field::SetpointMilli(Axis::Voltage, 1_500)]
        );
    }

    #[test]
    fn screen_switch_forces_full_repaint() {
        let mut display = PanelDisplay::new(RecordingWriter::default());
        display.refresh();
        display.writer.fields.clear();

        display.show_overtemp();
        display.refresh();
        assert_eq!(display.writer.screens, vec![Screen::Normal, Screen::Overtemp]);
        assert_eq!(display.writer.fields.len(), 7);
    }
}
