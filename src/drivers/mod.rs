//! Peripheral drivers feeding the interrupt inbox.

pub mod digital_input;

pub use digital_input::{DigitalInput, Edge};
