//! Dual-knob setpoint input state machines.
//!
//! Each knob turns quadrature detents into a bounded engineering value with
//! a fine and a coarse increment. The pair is owned jointly by the
//! supervisor, which mediates the one-coarse-knob-at-a-time rule centrally
//! instead of letting knobs reach into each other.

/// Logical setpoint axis a knob controls.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Axis {
    Voltage,
    Current,
}

/// Tuning speed of a knob.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum KnobMode {
    /// Fine increments per detent.
    Slow,
    /// Coarse increments per detent.
    Fast,
}

/// How a knob's value is treated when it enters coarse mode.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum RequantizePolicy {
    /// The value is left exactly where fine tuning put it.
    #[default]
    Keep,
    /// The value snaps to the nearest multiple of the coarse increment.
    RoundToCoarse,
}

/// Static configuration for one knob.
#[derive(Copy, Clone, Debug)]
pub struct KnobConfig {
    pub min: i32,
    pub max: i32,
    pub slow_increment: i32,
    pub fast_increment: i32,
    pub requantize: RequantizePolicy,
}

impl KnobConfig {
    /// Creates a configuration with the default requantize policy.
    pub const fn new(min: i32, max: i32, slow_increment: i32, fast_increment: i32) -> Self {
        Self {
            min,
            max,
            slow_increment,
            fast_increment,
            requantize: RequantizePolicy::Keep,
        }
    }
}

/// What happened during a single knob service tick.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct KnobEvents {
    /// The knob's engineering value changed.
    pub value_changed: bool,
    /// The knob toggled into or out of coarse mode this tick.
    pub mode_toggled: bool,
}

/// One rotary setpoint knob.
#[derive(Clone, Debug)]
pub struct Knob {
    config: KnobConfig,
    position: i32,
    value: i32,
    mode: KnobMode,
    pressed: bool,
}

impl Knob {
    /// Creates a knob at value zero in slow mode.
    pub const fn new(config: KnobConfig) -> Self {
        Self {
            config,
            position: 0,
            value: 0,
            mode: KnobMode::Slow,
            pressed: false,
        }
    }

    /// Current engineering value.
    pub const fn value(&self) -> i32 {
        self.value
    }

    /// Current tuning mode.
    pub const fn mode(&self) -> KnobMode {
        self.mode
    }

    /// Forces the value, clamped into the configured bounds.
    pub fn set_value(&mut self, value: i32) {
        self.value = value.clamp(self.config.min, self.config.max);
    }

    /// Drops the knob back to slow mode, reporting whether it changed.
    pub fn force_slow(&mut self) -> bool {
        if self.mode == KnobMode::Fast {
            self.mode = KnobMode::Slow;
            true
        } else {
            false
        }
    }

    /// Services one poll tick from the raw decoder position and button level.
    ///
    /// A debounced press edge toggles the mode; sustained hold does nothing.
    /// A position delta moves the value by the mode's increment, and the
    /// move is dropped outright if it would leave `[min, max]`.
    pub fn service(&mut self, position: i32, pressed: bool) -> KnobEvents {
        let mut events = KnobEvents::default();

        if pressed {
            if !self.pressed {
                self.pressed = true;
                self.toggle_mode();
                events.mode_toggled = true;
            }
        } else {
            self.pressed = false;
        }

        if position != self.position {
            let delta = position - self.position;
            self.position = position;
            let increment = match self.mode {
                KnobMode::Slow => self.config.slow_increment,
                KnobMode::Fast => self.config.fast_increment,
            };
            let candidate = self.value + delta * increment;
            if (self.config.min..=self.config.max).contains(&candidate) {
                self.value = candidate;
                events.value_changed = true;
            }
        }

        events
    }

    fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            KnobMode::Slow => KnobMode::Fast,
            KnobMode::Fast => KnobMode::Slow,
        };
        if self.mode == KnobMode::Fast && self.config.requantize == RequantizePolicy::RoundToCoarse
        {
            let coarse = self.config.fast_increment;
            if coarse > 1 {
                let snapped = ((self.value + coarse / 2) / coarse) * coarse;
                self.set_value(snapped);
            }
        }
    }
}

/// Raw decoder state for one knob on a service tick.
#[derive(Copy, Clone, Debug)]
pub struct KnobInput {
    pub position: i32,
    pub pressed: bool,
}

/// Per-axis outcome of servicing the pair.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PairEvents {
    pub value_changed: bool,
    /// Coarse indicator state to push to the display, if it changed.
    pub coarse_changed: Option<bool>,
}

/// Both setpoint knobs plus the mutual-exclusion rule between them.
#[derive(Clone, Debug)]
pub struct KnobPair {
    voltage: Knob,
    current: Knob,
}

impl KnobPair {
    /// Creates the pair from per-axis configurations.
    pub const fn new(voltage: KnobConfig, current: KnobConfig) -> Self {
        Self {
            voltage: Knob::new(voltage),
            current: Knob::new(current),
        }
    }

    /// Borrows the knob for an axis.
    pub const fn knob(&self, axis: Axis) -> &Knob {
        match axis {
            Axis::Voltage => &self.voltage,
            Axis::Current => &self.current,
        }
    }

    /// Forces both setpoints to zero (overtemperature entry).
    pub fn zero_values(&mut self) {
        self.voltage.set_value(0);
        self.current.set_value(0);
    }

    /// Services both knobs for one tick and applies the coarse-mode
    /// exclusivity rule: a knob entering fast mode forces its peer slow.
    pub fn service(
        &mut self,
        voltage: KnobInput,
        current: KnobInput,
    ) -> (PairEvents, PairEvents) {
        let v = self.voltage.service(voltage.position, voltage.pressed);
        let i = self.current.service(current.position, current.pressed);

        let mut v_out = PairEvents {
            value_changed: v.value_changed,
            coarse_changed: None,
        };
        let mut i_out = PairEvents {
            value_changed: i.value_changed,
            coarse_changed: None,
        };

        if v.mode_toggled {
            let fast = self.voltage.mode() == KnobMode::Fast;
            v_out.coarse_changed = Some(fast);
            if fast && self.current.force_slow() {
                i_out.coarse_changed = Some(false);
            }
        }
        if i.mode_toggled {
            let fast = self.current.mode() == KnobMode::Fast;
            i_out.coarse_changed = Some(fast);
            if fast && self.voltage.force_slow() {
                v_out.coarse_changed = Some(false);
            }
        }

        (v_out, i_out)
    }
}

/// Two-bit Gray-code quadrature decoder.
///
/// Fed the active-low phase levels on every poll tick, it converts the
/// Gray sequence to binary and emits a signed step whenever the position
/// advanced. Invalid double transitions (both phases flipping between
/// polls) decode as no movement rather than a wrong direction.
#[derive(Copy, Clone, Debug)]
pub struct QuadratureDecoder {
    previous: i8,
    reversed: bool,
}

impl QuadratureDecoder {
    /// Creates a decoder primed with the current phase levels.
    pub const fn new(phase1_low: bool, phase2_low: bool, reversed: bool) -> Self {
        Self {
            previous: Self::decode(phase1_low, phase2_low),
            reversed,
        }
    }

    const fn decode(phase1_low: bool, phase2_low: bool) -> i8 {
        let gray = ((phase1_low as i8) << 1) | (phase2_low as i8);
        gray ^ (gray >> 1)
    }

    /// Folds one phase sample in, returning -1, 0, or +1 steps.
    pub fn step(&mut self, phase1_low: bool, phase2_low: bool) -> i32 {
        let state = Self::decode(phase1_low, phase2_low);
        let difference = self.previous - state;
        if difference & 1 == 0 {
            return 0;
        }
        self.previous = state;
        let delta = i32::from(difference & 2) - 1;
        if self.reversed { -delta } else { delta }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slow_knob(min: i32, max: i32) -> Knob {
        Knob::new(KnobConfig::new(min, max, 1, 10))
    }

    #[test]
    fn delta_applies_in_slow_mode() {
        let mut knob = slow_knob(0, 200);
        let events = knob.service(5, false);
        assert!(events.value_changed);
        assert_eq!(knob.value(), 5);
    }

    #[test]
    fn out_of_bounds_delta_is_dropped_not_clamped() {
        let mut knob = slow_knob(0, 4);
        let events = knob.service(5, false);
        assert!(!events.value_changed);
        assert_eq!(knob.value(), 0);
    }

    #[test]
    fn unchanged_position_is_a_no_op() {
        let mut knob = slow_knob(0, 200);
        knob.service(3, false);
        let events = knob.service(3, false);
        assert_eq!(events, KnobEvents::default());
        assert_eq!(knob.value(), 3);
    }

    #[test]
    fn press_edge_toggles_mode_hold_does_not() {
        let mut knob = slow_knob(0, 200);
        assert!(knob.service(0, true).mode_toggled);
        assert_eq!(knob.mode(), KnobMode::Fast);
        // Sustained hold stays in fast mode.
        assert!(!knob.service(0, true).mode_toggled);
        assert_eq!(knob.mode(), KnobMode::Fast);
        knob.service(0, false);
        assert!(knob.service(0, true).mode_toggled);
        assert_eq!(knob.mode(), KnobMode::Slow);
    }

    #[test]
    fn fast_mode_uses_coarse_increment() {
        let mut knob = slow_knob(0, 200);
        knob.service(0, true);
        knob.service(2, true);
        assert_eq!(knob.value(), 20);
    }

    #[test]
    fn round_to_coarse_policy_snaps_on_entry() {
        let mut config = KnobConfig::new(0, 200, 1, 10);
        config.requantize = RequantizePolicy::RoundToCoarse;
        let mut knob = Knob::new(config);
        knob.service(7, false);
        assert_eq!(knob.value(), 7);
        knob.service(7, true);
        assert_eq!(knob.value(), 10);
    }

    #[test]
    fn keep_policy_leaves_value_untouched() {
        let mut knob = slow_knob(0, 200);
        knob.service(7, false);
        knob.service(7, true);
        assert_eq!(knob.value(), 7);
    }

    #[test]
    fn pair_allows_at_most_one_fast_knob() {
        let mut pair = KnobPair::new(KnobConfig::new(0, 3000, 1, 50), KnobConfig::new(0, 200, 1, 10));
        let idle = KnobInput {
            position: 0,
            pressed: false,
        };
        let pressed = KnobInput {
            position: 0,
            pressed: true,
        };

        let (v, _) = pair.service(pressed, idle);
        assert_eq!(v.coarse_changed, Some(true));
        assert_eq!(pair.knob(Axis::Voltage).mode(), KnobMode::Fast);

        // Pressing the current knob takes over coarse mode and demotes the
        // voltage knob in the same tick.
        let (v, i) = pair.service(idle, pressed);
        assert_eq!(i.coarse_changed, Some(true));
        assert_eq!(v.coarse_changed, Some(false));
        assert_eq!(pair.knob(Axis::Voltage).mode(), KnobMode::Slow);
        assert_eq!(pair.knob(Axis::Current).mode(), KnobMode::Fast);
    }

    #[test]
    fn leaving_fast_clears_only_that_indicator() {
        let mut pair = KnobPair::new(KnobConfig::new(0, 3000, 1, 50), KnobConfig::new(0, 200, 1, 10));
        let idle = KnobInput {
            position: 0,
            pressed: false,
        };
        let pressed = KnobInput {
            position: 0,
            pressed: true,
        };

        pair.service(pressed, idle);
        pair.service(idle, idle);
        let (v, i) = pair.service(pressed, idle);
        assert_eq!(v.coarse_changed, Some(false));
        assert_eq!(i.coarse_changed, None);
        assert_eq!(pair.knob(Axis::Voltage).mode(), KnobMode::Slow);
    }

    #[test]
    fn decoder_counts_a_full_gray_cycle() {
        let mut decoder = QuadratureDecoder::new(false, false, false);
        // Clockwise Gray sequence 00 -> 01 -> 11 -> 10 -> 00.
        assert_eq!(decoder.step(false, true), 1);
        assert_eq!(decoder.step(true, true), 1);
        assert_eq!(decoder.step(true, false), 1);
        assert_eq!(decoder.step(false, false), 1);
    }

    #[test]
    fn decoder_tracks_direction_reversal() {
        let mut decoder = QuadratureDecoder::new(false, false, false);
        assert_eq!(decoder.step(false, true), 1);
        assert_eq!(decoder.step(false, false), -1);
    }

    #[test]
    fn decoder_ignores_double_transitions() {
        let mut decoder = QuadratureDecoder::new(false, false, false);
        // Both phases flipping in one poll is non-adjacent in the Gray
        // sequence; no direction can be inferred.
        assert_eq!(decoder.step(true, true), 0);
        // The next single step still decodes from the old reference.
        assert_eq!(decoder.step(false, true), 1);
    }

    #[test]
    fn reversed_decoder_flips_sign() {
        let mut decoder = QuadratureDecoder::new(false, false, true);
        assert_eq!(decoder.step(false, true), -1);
    }
}
