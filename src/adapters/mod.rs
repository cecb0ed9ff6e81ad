//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements | Connects to                         |
//! |------------|------------|-------------------------------------|
//! | `time`     | Clock      | ESP32 system timer / host `Instant` |
//! |            | Clock      | Simulated virtual time (`SimClock`) |
//! | `log_sink` | HostPort   | Serial log output                   |
//! | `data_file`| HostPort   | Per-subject telemetry file (host)   |
//!
//! The framed binary host link lives in [`crate::link`].

#[cfg(not(target_os = "espidf"))]
pub mod data_file;
pub mod log_sink;
pub mod time;

#[cfg(not(target_os = "espidf"))]
pub use data_file::DataFile;
pub use log_sink::LogHost;
pub use time::{SimClock, SystemClock};
