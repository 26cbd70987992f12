#![no_std]

// Shared control logic for the bench supply.
//
// This crate stays portable across MCU firmware and host tooling by avoiding
// the Rust standard library and keeping every peripheral behind a narrow
// trait the other crates can implement.

pub mod calibration;
pub mod knob;
pub mod sampling;
pub mod supervisor;
pub mod thermal;
