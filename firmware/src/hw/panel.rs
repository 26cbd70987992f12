//! Front-panel input bindings: knob buttons, lock switch, step counters.

use embassy_stm32::gpio::Input;

use psu_core::knob::Axis;
use psu_core::sampling::DeltaAccumulator;
use psu_core::supervisor::ControlPanel;

/// All operator inputs the supervisor reads each iteration.
///
/// Buttons and the lock switch are active low on pulled-up inputs. Knob
/// positions are monotonic counters built by draining the encoder task's
/// accumulators, so a turn is never lost between iterations.
pub struct FrontPanel<'d> {
    voltage_button: Input<'d>,
    current_button: Input<'d>,
    lock_switch: Input<'d>,
    voltage_steps: &'static DeltaAccumulator,
    current_steps: &'static DeltaAccumulator,
    voltage_position: i32,
    current_position: i32,
}

impl<'d> FrontPanel<'d> {
    pub fn new(
        voltage_button: Input<'d>,
        current_button: Input<'d>,
        lock_switch: Input<'d>,
        voltage_steps: &'static DeltaAccumulator,
        current_steps: &'static DeltaAccumulator,
    ) -> Self {
        Self {
            voltage_button,
            current_button,
            lock_switch,
            voltage_steps,
            current_steps,
            voltage_position: 0,
            current_position: 0,
        }
    }
}

impl ControlPanel for FrontPanel<'_> {
    fn knob_position(&mut self, axis: Axis) -> i32 {
        match axis {
            Axis::Voltage => {
                self.voltage_position = self
                    .voltage_position
                    .wrapping_add(self.voltage_steps.take());
                self.voltage_position
            }
            Axis::Current => {
                self.current_position = self
                    .current_position
                    .wrapping_add(self.current_steps.take());
                self.current_position
            }
        }
    }

    fn knob_pressed(&mut self, axis: Axis) -> bool {
        match axis {
            Axis::Voltage => self.voltage_button.is_low(),
            Axis::Current => self.current_button.is_low(),
        }
    }

    fn lock_engaged(&mut self) -> bool {
        self.lock_switch.is_low()
    }
}
