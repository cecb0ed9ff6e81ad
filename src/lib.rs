//! TaskRig: event-driven state-machine framework for behavioural
//! experiment rigs.
//!
//! Tasks are written as finite state machines ([`fsm::TaskDefinition`]) and
//! registered with a [`scheduler::Framework`], which owns virtual time,
//! timers, the ordered event queue and the output channel to the host.
//! Everything here is plain logic behind the [`app::ports`] traits so it
//! runs under `cargo test`.  ESP-IDF specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod error;
pub mod events;
pub mod fsm;
pub mod link;
pub mod output;
pub mod persist;
pub mod scheduler;
pub mod setup;
pub mod tasks;
pub mod timer;
pub mod variables;

pub use error::{Error, Result};

/// One second of virtual time.
pub const SECOND: events::Millis = 1_000;

/// One minute of virtual time.
pub const MINUTE: events::Millis = 60 * SECOND;
