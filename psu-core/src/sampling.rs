//! Batch averaging and the interrupt/mainline hand-off cells.
//!
//! The periodic sampling interrupt owns an [`AveragingWindow`] per channel
//! and publishes each completed batch average through a [`SampleCell`]. The
//! mainline only ever reads the cells, so no lock is required and the
//! consumer always observes a fully formed value. Quadrature deltas shared
//! between the decode path and the mainline go through a
//! [`DeltaAccumulator`], which snapshots and clears in one atomic exchange.

use portable_atomic::{AtomicI32, AtomicU32, Ordering};

/// Accumulates raw samples and exposes the average of the last full batch.
///
/// Batch averaging, not sliding: the published average reflects exactly
/// `window` samples and is stale by at most one batch.
#[derive(Clone, Debug)]
pub struct AveragingWindow {
    sum: f32,
    count: u32,
    window: u32,
    average: f32,
}

impl AveragingWindow {
    /// Creates a window that completes a batch every `window` samples.
    pub const fn new(window: u32) -> Self {
        Self {
            sum: 0.0,
            count: 0,
            window,
            average: 0.0,
        }
    }

    /// Folds one sample into the running batch.
    ///
    /// Returns the new average when this sample completed a batch.
    pub fn update(&mut self, sample: f32) -> Option<f32> {
        self.sum += sample;
        self.count += 1;
        if self.count >= self.window {
            self.average = self.sum / self.count as f32;
            self.sum = 0.0;
            self.count = 0;
            Some(self.average)
        } else {
            None
        }
    }

    /// Average of the last completed batch; 0.0 before the first batch.
    ///
    /// Pure read, no computation happens here.
    pub const fn average(&self) -> f32 {
        self.average
    }
}

/// Single-producer/single-consumer snapshot cell for an `f32` reading.
///
/// The value is stored as raw bits in one machine word, so the consumer can
/// never observe a partial update.
#[derive(Debug)]
pub struct SampleCell {
    bits: AtomicU32,
}

impl SampleCell {
    /// Creates a cell holding the given initial value.
    pub const fn new(initial: f32) -> Self {
        Self {
            bits: AtomicU32::new(initial.to_bits()),
        }
    }

    /// Publishes a new value (producer side).
    pub fn publish(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }

    /// Reads the most recently published value (consumer side).
    pub fn load(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }
}

/// Shared signed counter for accumulated quadrature movement.
///
/// The decode path adds detents as they arrive; the mainline drains the
/// accumulated total with [`take`](Self::take), which snapshots and clears
/// in a single atomic exchange.
#[derive(Debug)]
pub struct DeltaAccumulator {
    delta: AtomicI32,
}

impl DeltaAccumulator {
    /// Creates an empty accumulator.
    pub const fn new() -> Self {
        Self {
            delta: AtomicI32::new(0),
        }
    }

    /// Adds movement from the decode path.
    pub fn add(&self, delta: i32) {
        self.delta.fetch_add(delta, Ordering::AcqRel);
    }

    /// Drains the accumulated movement, leaving the counter at zero.
    pub fn take(&self) -> i32 {
        self.delta.swap(0, Ordering::AcqRel)
    }
}

impl Default for DeltaAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_updates_only_on_full_batches() {
        let mut window = AveragingWindow::new(4);
        assert_eq!(window.update(1.0), None);
        assert_eq!(window.update(2.0), None);
        assert_eq!(window.update(3.0), None);
        assert_eq!(window.average(), 0.0);
        assert_eq!(window.update(6.0), Some(3.0));
        assert_eq!(window.average(), 3.0);
    }

    #[test]
    fn batches_do_not_overlap() {
        let mut window = AveragingWindow::new(2);
        window.update(10.0);
        window.update(20.0);
        assert_eq!(window.average(), 15.0);
        // Next batch starts from scratch.
        window.update(0.0);
        assert_eq!(window.average(), 15.0);
        window.update(2.0);
        assert_eq!(window.average(), 1.0);
    }

    #[test]
    fn default_average_before_first_batch_is_zero() {
        let mut window = AveragingWindow::new(10);
        for _ in 0..9 {
            window.update(5.0);
        }
        assert_eq!(window.average(), 0.0);
    }

    #[test]
    fn sample_cell_round_trips_values() {
        let cell = SampleCell::new(0.0);
        assert_eq!(cell.load(), 0.0);
        cell.publish(21.5);
        assert_eq!(cell.load(), 21.5);
        cell.publish(-3.25);
        assert_eq!(cell.load(), -3.25);
    }

    #[test]
    fn delta_accumulator_drains_atomically() {
        let acc = DeltaAccumulator::new();
        acc.add(3);
        acc.add(-1);
        assert_eq!(acc.take(), 2);
        assert_eq!(acc.take(), 0);
    }
}
