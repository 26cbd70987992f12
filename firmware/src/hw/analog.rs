//! Blocking ADC sampler for the sense and thermistor channels.
//!
//! Runs entirely inside the periodic sampler task; each tick takes one
//! reading per channel and hands the raw codes back for averaging.

use embassy_stm32::Peri;
use embassy_stm32::adc::{Adc, SampleTime};
use embassy_stm32::peripherals::{ADC1, PA0, PA1, PA4};

/// ADC resolution used for every channel.
pub const ADC_FULL_SCALE: u16 = 4096;

/// Full-scale sense readings in milli-units.
pub const SENSE_FULL_SCALE_MV: f32 = 30_000.0;
pub const SENSE_FULL_SCALE_MA: f32 = 2_000.0;

/// One raw conversion per channel.
#[derive(Copy, Clone, Debug, Default)]
pub struct RawSample {
    pub voltage_code: u16,
    pub current_code: u16,
    pub thermistor_code: u16,
}

/// Owns the ADC and the three analog inputs.
pub struct AnalogSampler<'d> {
    adc: Adc<'d, ADC1>,
    voltage_sense: Peri<'d, PA0>,
    current_sense: Peri<'d, PA1>,
    thermistor: Peri<'d, PA4>,
}

impl<'d> AnalogSampler<'d> {
    /// Wraps a configured ADC and its input pins.
    pub fn new(
        mut adc: Adc<'d, ADC1>,
        voltage_sense: Peri<'d, PA0>,
        current_sense: Peri<'d, PA1>,
        thermistor: Peri<'d, PA4>,
    ) -> Self {
        adc.set_sample_time(SampleTime::CYCLES160_5);
        Self {
            adc,
            voltage_sense,
            current_sense,
            thermistor,
        }
    }

    /// Takes one reading of every channel.
    pub fn sample(&mut self) -> RawSample {
        RawSample {
            voltage_code: self.adc.blocking_read(&mut self.voltage_sense),
            current_code: self.adc.blocking_read(&mut self.current_sense),
            thermistor_code: self.adc.blocking_read(&mut self.thermistor),
        }
    }
}

/// Converts a sense code to millivolts across the output range.
pub fn code_to_millivolts(code: u16) -> f32 {
    code as f32 / ADC_FULL_SCALE as f32 * SENSE_FULL_SCALE_MV
}

/// Converts a sense code to milliamps across the output range.
pub fn code_to_milliamps(code: u16) -> f32 {
    code as f32 / ADC_FULL_SCALE as f32 * SENSE_FULL_SCALE_MA
}
