//! Concrete peripheral adapters behind the core's trait seams.

pub mod analog;
pub mod dac;
pub mod fan;
pub mod panel;
pub mod rotary;
