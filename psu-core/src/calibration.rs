//! Lookup-table calibration shared by the output and readback paths.
//!
//! Each curve holds empirically measured values at evenly spaced grid
//! points across its domain. The deviation of a grid point from its nominal
//! value is the correction to apply; between grid points the correction is
//! linearly interpolated. Everything in this module is pure so the same
//! curves serve the firmware, the emulator, and host tests.

use libm::{floorf, fmaxf, roundf};

/// Direction a curve's correction is applied in.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Correction {
    /// Corrects a measured value upward toward the true value.
    Reading,
    /// Pre-distorts a commanded value so the real-world output lands on
    /// target.
    Output,
}

impl Correction {
    const fn sign(self) -> f32 {
        match self {
            Correction::Reading => 1.0,
            Correction::Output => -1.0,
        }
    }
}

/// A measured calibration curve over `[0, domain_max]`.
///
/// The table stores the value actually observed at each nominal grid point
/// `idx * domain_max / (N - 1)`.
#[derive(Copy, Clone, Debug)]
pub struct CalibrationCurve {
    table: &'static [f32],
    domain_max: f32,
    correction: Correction,
}

impl CalibrationCurve {
    /// Creates a curve from a measured table.
    pub const fn new(table: &'static [f32], domain_max: f32, correction: Correction) -> Self {
        Self {
            table,
            domain_max,
            correction,
        }
    }

    /// Returns the grid spacing between adjacent table entries.
    fn scale(&self) -> f32 {
        self.domain_max / (self.table.len() as f32 - 1.0)
    }

    /// Applies the curve's correction to a raw value.
    ///
    /// Total and side-effect free. Values outside `[0, domain_max]` pass
    /// through unchanged; the last grid point applies its correction flat.
    /// The result never goes below zero.
    pub fn correct(&self, raw: f32) -> f32 {
        let n = self.table.len();
        if !(0.0..=self.domain_max).contains(&raw) {
            return raw;
        }
        let scale = self.scale();
        let idx = floorf(raw / scale) as usize;
        if idx >= n {
            return raw;
        }
        let nearest = idx as f32 * scale;
        let mut error = self.table[idx] - nearest;

        // Interpolate against the next grid point unless we are at the end
        // of the table.
        if idx < n - 1 {
            let next = (idx + 1) as f32 * scale;
            let next_error = self.table[idx + 1] - next;
            error += lerp(error, next_error, scale, raw - nearest);
        }
        fmaxf(0.0, raw + self.correction.sign() * error)
    }

    /// Corrects a value expressed in thousandths of the curve's unit
    /// (millivolts or milliamps).
    pub fn correct_milli(&self, raw: i32) -> i32 {
        roundf(self.correct(raw as f32 / 1000.0) * 1000.0) as i32
    }
}

fn lerp(y1: f32, y2: f32, dx: f32, x: f32) -> f32 {
    x * ((y2 - y1) / dx)
}

/// Measured voltage output curve, 0..30 V in 1 V steps.
const VOLTAGE_OUTPUT_TABLE: [f32; 31] = [
    0.014, 0.998, 1.987, 2.971, 3.93, 4.951, 5.929, 6.907, 7.899, 8.873, 9.852, 10.836, 11.810,
    12.785, 13.768, 14.747, 15.732, 16.704, 17.694, 18.683, 19.667, 20.638, 21.621, 22.604,
    23.584, 24.551, 25.529, 26.511, 27.500, 28.471, 29.447,
];

/// Measured current output curve, 0..2 A in 0.1 A steps.
const CURRENT_OUTPUT_TABLE: [f32; 21] = [
    0.001, 0.108, 0.235, 0.361, 0.454, 0.529, 0.613, 0.712, 0.812, 0.908, 1.04, 1.130, 1.250, 1.3,
    1.4, 1.5, 1.6, 1.7, 1.8, 1.9, 2.0,
];

/// Measured current readback curve, 0..2 A in 0.1 A steps.
const CURRENT_READING_TABLE: [f32; 21] = [
    0.0, 0.41, 0.58, 0.62, 0.72, 0.84, 0.82, 1.00, 1.07, 1.15, 1.23, 1.31, 1.37, 1.43, 1.51,
    1.57, 1.64, 1.7, 1.8, 1.9, 2.0,
];

/// Measured voltage readback curve, 0..30 V in 1 V steps.
const VOLTAGE_READING_TABLE: [f32; 31] = [
    -0.13, 0.92, 1.94, 2.97, 3.98, 5.01, 6.05, 7.05, 8.07, 9.09, 10.11, 11.12, 12.15, 13.17,
    14.19, 15.21, 16.22, 17.23, 18.25, 19.28, 20.30, 21.32, 22.34, 23.37, 24.39, 25.40, 26.42,
    27.44, 28.46, 29.48, 30.50,
];

/// Full-scale output voltage in volts.
pub const MAX_VOLTS: f32 = 30.0;

/// Full-scale output current in amps.
pub const MAX_AMPS: f32 = 2.0;

/// Curve applied to the commanded voltage before it reaches the DAC.
pub const VOLTAGE_OUTPUT: CalibrationCurve =
    CalibrationCurve::new(&VOLTAGE_OUTPUT_TABLE, MAX_VOLTS, Correction::Output);

/// Curve applied to the commanded current limit before it reaches the DAC.
pub const CURRENT_OUTPUT: CalibrationCurve =
    CalibrationCurve::new(&CURRENT_OUTPUT_TABLE, MAX_AMPS, Correction::Output);

/// Curve applied to averaged current readings before display.
pub const CURRENT_READING: CalibrationCurve =
    CalibrationCurve::new(&CURRENT_READING_TABLE, MAX_AMPS, Correction::Reading);

/// Curve applied to averaged voltage readings before display.
pub const VOLTAGE_READING: CalibrationCurve =
    CalibrationCurve::new(&VOLTAGE_READING_TABLE, MAX_VOLTS, Correction::Reading);
