//! Bundled tasks.

pub mod blink;
