//! Embassy runtime wiring: board bring-up, shared cells, task spawn.

use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::adc::Adc;
use embassy_stm32::gpio::{Input, Level, Output, OutputType, Pull, Speed};
use embassy_stm32::peripherals::TIM3;
use embassy_stm32::spi::{self, Spi};
use embassy_stm32::time::khz;
use embassy_stm32::timer::Ch1;
use embassy_stm32::timer::simple_pwm::{PwmPin, SimplePwm};

use psu_core::sampling::{DeltaAccumulator, SampleCell};
use psu_core::supervisor::PsuPeripherals;
use psu_core::thermal::{FanController, FanPolicy};

use crate::display::{PanelDisplay, RttFieldWriter};
use crate::hw::analog::AnalogSampler;
use crate::hw::dac::Mcp4822;
use crate::hw::fan::{FanDrive, TachLine, WallClock};
use crate::hw::panel::FrontPanel;
use crate::hw::rotary::EncoderLines;

mod encoder_task;
mod sampler_task;
mod supervisor_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

/// Heatsink temperature at which the fan starts turning.
const FAN_ON_CELSIUS: f32 = 40.0;

/// Heatsink temperature at which the fan runs flat out.
const FAN_MAX_CELSIUS: f32 = 60.0;

static VOLTAGE_MV: SampleCell = SampleCell::new(0.0);
static CURRENT_MA: SampleCell = SampleCell::new(0.0);
// Room temperature until the first batch lands, so the implausible-reading
// failsafe does not latch on a startup zero.
static TEMP_CELSIUS: SampleCell = SampleCell::new(25.0);

static VOLTAGE_STEPS: DeltaAccumulator = DeltaAccumulator::new();
static CURRENT_STEPS: DeltaAccumulator = DeltaAccumulator::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        ADC1,
        SPI1,
        TIM3,
        PA0,
        PA1,
        PA4,
        PA5,
        PA6,
        PA7,
        PA8,
        PA9,
        PA11,
        PA12,
        PB0,
        PB1,
        PB4,
        PB5,
        PB6,
        ..
    } = hal::init(config);

    defmt::info!("bench supply control core starting");

    let sampler = AnalogSampler::new(Adc::new(ADC1), PA0, PA1, PA4);

    let mut spi_config = spi::Config::default();
    spi_config.frequency = khz(1_000);
    let dac = Mcp4822::new(
        Spi::new_blocking_txonly(SPI1, PA5, PA7, spi_config),
        Output::new(PB6, Level::High, Speed::Low),
    );

    let fan_pin: PwmPin<'static, TIM3, Ch1> = PwmPin::new(PA6, OutputType::PushPull);
    let fan_pwm = FanDrive::new(SimplePwm::new(
        TIM3,
        Some(fan_pin),
        None,
        None,
        None,
        khz(25),
        Default::default(),
    ));
    let fan = FanController::new(
        TachLine::new(Input::new(PB5, Pull::Up)),
        WallClock,
        FanPolicy::new(FAN_ON_CELSIUS, FAN_MAX_CELSIUS),
    );

    let voltage_encoder = EncoderLines::new(
        Input::new(PA8, Pull::Up),
        Input::new(PA9, Pull::Up),
        false,
        &VOLTAGE_STEPS,
    );
    let current_encoder = EncoderLines::new(
        Input::new(PB0, Pull::Up),
        Input::new(PB1, Pull::Up),
        false,
        &CURRENT_STEPS,
    );

    let panel = FrontPanel::new(
        Input::new(PA11, Pull::Up),
        Input::new(PA12, Pull::Up),
        Input::new(PB4, Pull::Up),
        &VOLTAGE_STEPS,
        &CURRENT_STEPS,
    );

    let io = PsuPeripherals {
        panel,
        dac,
        display: PanelDisplay::new(RttFieldWriter),
        fan_pwm,
        fan,
    };

    spawner
        .spawn(sampler_task::run(
            sampler,
            &VOLTAGE_MV,
            &CURRENT_MA,
            &TEMP_CELSIUS,
        ))
        .expect("failed to spawn sampler task");

    spawner
        .spawn(encoder_task::run(voltage_encoder, current_encoder))
        .expect("failed to spawn encoder task");

    spawner
        .spawn(supervisor_task::run(
            io,
            &VOLTAGE_MV,
            &CURRENT_MA,
            &TEMP_CELSIUS,
        ))
        .expect("failed to spawn supervisor task");

    core::future::pending::<()>().await;
}
