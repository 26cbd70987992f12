//! Quadrature phase-line bindings for one rotary encoder.

use embassy_stm32::gpio::Input;

use psu_core::knob::QuadratureDecoder;
use psu_core::sampling::DeltaAccumulator;

/// Both phase inputs of one encoder plus its shared step counter.
///
/// Polled at a fixed rate from the encoder task; movement lands in the
/// accumulator the mainline drains.
pub struct EncoderLines<'d> {
    phase1: Input<'d>,
    phase2: Input<'d>,
    decoder: QuadratureDecoder,
    steps: &'static DeltaAccumulator,
}

impl<'d> EncoderLines<'d> {
    /// Binds the phase lines, priming the decoder with their current levels.
    pub fn new(
        phase1: Input<'d>,
        phase2: Input<'d>,
        reversed: bool,
        steps: &'static DeltaAccumulator,
    ) -> Self {
        let decoder = QuadratureDecoder::new(phase1.is_low(), phase2.is_low(), reversed);
        Self {
            phase1,
            phase2,
            decoder,
            steps,
        }
    }

    /// Samples both phases once and accumulates any decoded movement.
    pub fn poll(&mut self) {
        let delta = self.decoder.step(self.phase1.is_low(), self.phase2.is_low());
        if delta != 0 {
            self.steps.add(delta);
        }
    }
}
