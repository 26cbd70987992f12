use embassy_time::{Duration, Ticker};

use psu_core::sampling::SampleCell;
use psu_core::supervisor::{PsuPeripherals, Readings, Supervisor};

use crate::display::{PanelDisplay, RttFieldWriter};
use crate::hw::dac::Mcp4822;
use crate::hw::fan::{FanDrive, TachLine, WallClock};
use crate::hw::panel::FrontPanel;

const LOOP_INTERVAL: Duration = Duration::from_millis(10);

/// The full hardware peripheral set behind the supervisor's seams.
pub type HardwareIo = PsuPeripherals<
    FrontPanel<'static>,
    Mcp4822<'static>,
    PanelDisplay<RttFieldWriter>,
    FanDrive<'static>,
    TachLine<'static>,
    WallClock,
>;

#[embassy_executor::task]
pub async fn run(
    mut io: HardwareIo,
    voltage_mv: &'static SampleCell,
    current_ma: &'static SampleCell,
    temp_celsius: &'static SampleCell,
) -> ! {
    let mut supervisor = Supervisor::new();

    let mut ticker = Ticker::every(LOOP_INTERVAL);
    loop {
        ticker.next().await;
        let readings = Readings {
            voltage_mv: voltage_mv.load(),
            current_ma: current_ma.load(),
            temp_celsius: temp_celsius.load(),
        };
        supervisor.poll(&mut io, readings);
    }
}
