//! Framework configuration parameters
//!
//! Tunable run-time behaviour of the dispatch loop.  Fixed capacities
//! (queue depths, timer slots) are compile-time constants in their own
//! modules; everything here can be changed per run by the host.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Core framework configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkConfig {
    /// Emit state/event/print/data records to the host.
    pub data_output: bool,
    /// Maximum transitions an `entry` handler chain may request while
    /// processing a single event before the run is faulted.
    pub max_chained_transitions: u8,
    /// Output records handed to the host port after each dispatched event
    /// (the rest are drained when the loop goes idle).
    pub output_drain_per_event: u8,
    /// Longest single idle wait on the wall clock (milliseconds).
    pub idle_poll_ms: u32,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            data_output: true,
            max_chained_transitions: 16,
            output_drain_per_event: 1,
            idle_poll_ms: 1,
        }
    }
}

impl FrameworkConfig {
    /// Reject values the dispatch loop cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.max_chained_transitions == 0 {
            return Err(Error::Config("max_chained_transitions must be >= 1"));
        }
        if !(1..=100).contains(&self.idle_poll_ms) {
            return Err(Error::Config("idle_poll_ms must be 1–100"));
        }
        Ok(())
    }
}
