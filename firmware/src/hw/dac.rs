//! MCP4822 dual-channel SPI DAC.
//!
//! Each write is one 16-bit command word: channel select in bit 15, the
//! control nibble (buffered, 1x gain, active) in bits 12..14, and the
//! 12-bit code below. Chip select frames every word.

use embassy_stm32::gpio::Output;
use embassy_stm32::mode::Blocking;
use embassy_stm32::spi::Spi;

use psu_core::supervisor::{DacChannel, SetpointDac};

/// Control nibble: buffered output, unity gain, channel active.
const DAC_CONTROL_BITS: u16 = 0x7000;
const DAC_CODE_MASK: u16 = 0x0FFF;

/// SPI DAC holding both setpoint channels.
pub struct Mcp4822<'d> {
    spi: Spi<'d, Blocking>,
    chip_select: Output<'d>,
}

impl<'d> Mcp4822<'d> {
    pub fn new(spi: Spi<'d, Blocking>, chip_select: Output<'d>) -> Self {
        Self { spi, chip_select }
    }

    fn transfer(&mut self, word: u16) {
        self.chip_select.set_low();
        // A failed transfer leaves the previous code on the output; the
        // next loop iteration rewrites it.
        let _ = self.spi.blocking_write(&[(word >> 8) as u8, (word & 0xFF) as u8]);
        self.chip_select.set_high();
    }
}

impl SetpointDac for Mcp4822<'_> {
    fn write(&mut self, channel: DacChannel, code: u16) {
        let channel_bit = match channel {
            DacChannel::Voltage => 0,
            DacChannel::Current => 1 << 15,
        };
        self.transfer(channel_bit | DAC_CONTROL_BITS | (code & DAC_CODE_MASK));
    }
}
