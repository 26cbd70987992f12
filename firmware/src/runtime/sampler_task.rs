use embassy_time::{Duration, Ticker};

use psu_core::sampling::{AveragingWindow, SampleCell};
use psu_core::thermal;

use crate::hw::analog::{self, AnalogSampler};

/// One conversion per channel every tick; a batch average every second.
const SAMPLE_INTERVAL: Duration = Duration::from_millis(100);
const BATCH_SIZE: u32 = 10;

#[embassy_executor::task]
pub async fn run(
    mut sampler: AnalogSampler<'static>,
    voltage_mv: &'static SampleCell,
    current_ma: &'static SampleCell,
    temp_celsius: &'static SampleCell,
) -> ! {
    let mut voltage = AveragingWindow::new(BATCH_SIZE);
    let mut current = AveragingWindow::new(BATCH_SIZE);
    let mut temperature = AveragingWindow::new(BATCH_SIZE);

    let mut ticker = Ticker::every(SAMPLE_INTERVAL);
    loop {
        ticker.next().await;
        let raw = sampler.sample();

        if let Some(avg) = voltage.update(analog::code_to_millivolts(raw.voltage_code)) {
            voltage_mv.publish(avg);
        }
        if let Some(avg) = current.update(analog::code_to_milliamps(raw.current_code)) {
            current_ma.publish(avg);
        }
        let celsius = thermal::thermistor_celsius(raw.thermistor_code, analog::ADC_FULL_SCALE);
        if let Some(avg) = temperature.update(celsius) {
            temp_celsius.publish(avg);
        }
    }
}
