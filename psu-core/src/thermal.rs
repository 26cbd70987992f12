//! Thermal sensing, fan control, and overtemperature protection.
//!
//! The thermistor conversion and duty policy are pure; the tachometer is
//! the one blocking piece of the system, so it sits behind [`EdgeProbe`]
//! and [`Clock`] traits that tests and the emulator replace with simulated
//! timing. Failsafe is deliberately one-way: once latched, only a restart
//! clears it.

use libm::logf;

/// Steinhart-Hart coefficients for the installed 10 k NTC.
const SH_A: f32 = 1.009_249_5e-3;
const SH_B: f32 = 2.378_405_3e-4;
const SH_C: f32 = 2.019_202_7e-7;

/// Series resistor of the thermistor divider, in ohms.
pub const DIVIDER_SERIES_OHMS: f32 = 10_000.0;

/// Readings below this are treated as a sensor fault, not weather.
pub const MIN_PLAUSIBLE_CELSIUS: f32 = 5.0;

/// Microseconds before a tachometer wait phase gives up.
pub const TACH_ABORT_TIMEOUT_US: u64 = 100_000;

/// Microseconds between tachometer refreshes; the cache is returned
/// unconditionally in between.
pub const TACH_REFRESH_INTERVAL_US: u64 = 500_000;

/// Converts a raw thermistor divider code to the divider's NTC resistance.
///
/// The thermistor sits on the low side of the divider, so the code is the
/// fraction of full scale dropped across it. Codes at the rails are pulled
/// one count in to keep the math finite; the resulting nonsense
/// temperature is caught downstream by the plausibility check.
pub fn divider_resistance(code: u16, full_scale: u16) -> f32 {
    let code = code.clamp(1, full_scale - 1);
    DIVIDER_SERIES_OHMS * code as f32 / (full_scale - code) as f32
}

/// Converts an NTC resistance to degrees Celsius via Steinhart-Hart.
pub fn steinhart_celsius(resistance: f32) -> f32 {
    let ln_r = logf(resistance);
    1.0 / (SH_A + SH_B * ln_r + SH_C * ln_r * ln_r * ln_r) - 273.15
}

/// Converts a raw thermistor ADC code straight to degrees Celsius.
pub fn thermistor_celsius(code: u16, full_scale: u16) -> f32 {
    steinhart_celsius(divider_resistance(code, full_scale))
}

/// Fan duty policy with a sticky failsafe latch.
///
/// Duty is zero below the on-threshold and ramps linearly to full scale at
/// the max-threshold. Implausibly low or over-max readings force full
/// cooling and latch the failsafe permanently.
#[derive(Clone, Debug)]
pub struct FanPolicy {
    on_temp: f32,
    max_temp: f32,
    slope: f32,
    failsafe: bool,
}

impl FanPolicy {
    /// Creates a policy ramping between `on_temp` and `max_temp`.
    pub const fn new(on_temp: f32, max_temp: f32) -> Self {
        Self {
            on_temp,
            max_temp,
            slope: 255.0 / (max_temp - on_temp),
            failsafe: false,
        }
    }

    /// Returns the PWM duty (0..=255) for the given temperature.
    pub fn duty(&mut self, temp: f32) -> u8 {
        if !(MIN_PLAUSIBLE_CELSIUS..=self.max_temp).contains(&temp) {
            self.failsafe = true;
        }
        if self.failsafe {
            return 255;
        }
        if temp <= self.on_temp {
            0
        } else {
            let duty = (temp - self.on_temp) * self.slope;
            if duty >= 255.0 { 255 } else { duty as u8 }
        }
    }

    /// Whether the failsafe latch has tripped.
    pub const fn failsafe(&self) -> bool {
        self.failsafe
    }
}

/// Digital level source for the tachometer line.
pub trait EdgeProbe {
    /// Samples the line; `true` is high.
    fn level(&mut self) -> bool;
}

/// Monotonic microsecond clock.
pub trait Clock {
    fn now_micros(&mut self) -> u64;
}

/// Bounded busy-wait fan speed measurement.
///
/// Watches the tachometer line for one full electrical period: any edge
/// away from the resting level, the return edge, and the next departure.
/// The period runs from the first edge to the third.
#[derive(Copy, Clone, Debug)]
pub struct Tachometer {
    abort_timeout_us: u64,
}

impl Tachometer {
    pub const fn new(abort_timeout_us: u64) -> Self {
        Self { abort_timeout_us }
    }

    /// Measures fan speed in RPM, returning 0 if any wait phase times out.
    ///
    /// Worst case this blocks for three abort timeouts; this is the only
    /// suspension point in the mainline.
    pub fn measure_rpm<P, C>(&self, probe: &mut P, clock: &mut C) -> u16
    where
        P: EdgeProbe,
        C: Clock,
    {
        // Wait for any transition away from the resting level.
        let resting = probe.level();
        let mut start = clock.now_micros();
        while probe.level() == resting {
            if clock.now_micros() - start > self.abort_timeout_us {
                return 0;
            }
        }

        // The period starts here: wait for the return to the resting level,
        // then for the next departure.
        start = clock.now_micros();
        while probe.level() != resting {
            if clock.now_micros() - start > self.abort_timeout_us {
                return 0;
            }
        }
        while probe.level() == resting {
            if clock.now_micros() - start > self.abort_timeout_us {
                return 0;
            }
        }

        let period = clock.now_micros() - start;
        if period == 0 {
            return 0;
        }
        let rpm = 60_000_000 / period;
        rpm.min(u16::MAX as u64) as u16
    }
}

/// Cached fan speed reading.
#[derive(Copy, Clone, Debug)]
pub struct FanCache {
    rpm: u16,
    refreshed_at: Option<u64>,
    interval_us: u64,
}

impl FanCache {
    pub const fn new(interval_us: u64) -> Self {
        Self {
            rpm: 0,
            refreshed_at: None,
            interval_us,
        }
    }

    /// Whether the cache is stale at `now`.
    pub fn refresh_due(&self, now: u64) -> bool {
        match self.refreshed_at {
            Some(at) => now - at > self.interval_us,
            None => true,
        }
    }

    /// Stores a fresh measurement.
    pub fn store(&mut self, rpm: u16, now: u64) {
        self.rpm = rpm;
        self.refreshed_at = Some(now);
    }

    /// Last stored reading.
    pub const fn rpm(&self) -> u16 {
        self.rpm
    }
}

/// Fan hardware bundle: duty policy, tachometer, and the speed cache.
#[derive(Debug)]
pub struct FanController<P, C> {
    probe: P,
    clock: C,
    policy: FanPolicy,
    tach: Tachometer,
    cache: FanCache,
}

impl<P, C> FanController<P, C>
where
    P: EdgeProbe,
    C: Clock,
{
    /// Creates a controller with the standard timing constants.
    pub fn new(probe: P, clock: C, policy: FanPolicy) -> Self {
        Self {
            probe,
            clock,
            policy,
            tach: Tachometer::new(TACH_ABORT_TIMEOUT_US),
            cache: FanCache::new(TACH_REFRESH_INTERVAL_US),
        }
    }

    /// Evaluates the duty policy for the given temperature.
    pub fn duty(&mut self, temp: f32) -> u8 {
        self.policy.duty(temp)
    }

    /// Whether the cooling failsafe has latched.
    pub const fn failsafe(&self) -> bool {
        self.policy.failsafe()
    }

    /// Returns the cached fan speed, measuring only when the cache is
    /// older than the refresh interval.
    pub fn cached_rpm(&mut self) -> u16 {
        let now = self.clock.now_micros();
        if self.cache.refresh_due(now) {
            let rpm = self.tach.measure_rpm(&mut self.probe, &mut self.clock);
            self.cache.store(rpm, now);
        }
        self.cache.rpm()
    }
}

/// Overtemperature supervisory state.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ThermalState {
    Normal,
    Overtemp,
}

/// Transition reported by one hysteresis evaluation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OvertempTransition {
    Entered,
    Exited,
    Unchanged,
}

/// Hysteretic overtemperature monitor.
///
/// Enters `Overtemp` only above the on-threshold and leaves only below the
/// strictly lower off-threshold, so a temperature oscillating between the
/// two never toggles the state.
#[derive(Clone, Debug)]
pub struct OvertempMonitor {
    on_temp: f32,
    off_temp: f32,
    state: ThermalState,
}

impl OvertempMonitor {
    /// Creates a monitor; `off_temp` must be strictly below `on_temp`.
    pub fn new(on_temp: f32, off_temp: f32) -> Self {
        debug_assert!(off_temp < on_temp);
        Self {
            on_temp,
            off_temp,
            state: ThermalState::Normal,
        }
    }

    /// Current state.
    pub const fn state(&self) -> ThermalState {
        self.state
    }

    /// Returns `true` while the supply is in overtemperature protection.
    pub const fn is_overtemp(&self) -> bool {
        matches!(self.state, ThermalState::Overtemp)
    }

    /// Evaluates one averaged temperature reading.
    pub fn evaluate(&mut self, avg_temp: f32) -> OvertempTransition {
        match self.state {
            ThermalState::Normal if avg_temp > self.on_temp => {
                self.state = ThermalState::Overtemp;
                OvertempTransition::Entered
            }
            ThermalState::Overtemp if avg_temp < self.off_temp => {
                self.state = ThermalState::Normal;
                OvertempTransition::Exited
            }
            _ => OvertempTransition::Unchanged,
        }
    }
}
