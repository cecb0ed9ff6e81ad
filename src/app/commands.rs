//! Host → device control messages and their replies.
//!
//! Carried over the host link as postcard frames (see [`crate::link`]) and
//! interpreted by [`Framework::handle_command`](crate::scheduler::Framework::handle_command).

use serde::{Deserialize, Serialize};

use crate::events::Millis;
use crate::scheduler::IdTable;
use crate::variables::Value;

/// Commands the host may send, idle or mid-run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HostCommand {
    /// Overwrite a task variable.
    SetVariable { name: String, value: Value },
    /// Read a task variable back.
    GetVariable { name: String },
    /// Inject a named event at the current virtual time.
    TriggerEvent { name: String },
    /// Ask for the state/event name ↔ id tables.
    GetIds,
    /// Start a run.  `None` runs until stopped.
    Start { duration: Option<Millis> },
    /// End the current run after the event being processed.
    Stop,
}

/// Device answer to a [`HostCommand`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HostReply {
    Ack,
    Variable { name: String, value: Value },
    Ids(IdTable),
    Error { message: String },
}

impl HostReply {
    pub fn error(err: &impl core::fmt::Display) -> Self {
        Self::Error {
            message: err.to_string(),
        }
    }
}
