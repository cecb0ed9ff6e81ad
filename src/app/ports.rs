//! Port traits: the hexagonal boundary between the dispatch loop and the
//! outside world.
//!
//! ```text
//!   SystemClock / SimClock ──▶ Clock    ──┐
//!                                         ├──▶ Framework::run (domain)
//!   LogHost / HostLink     ──▶ HostPort ──┘
//! ```
//!
//! Adapters are passed into [`Framework::run`](crate::scheduler::Framework::run)
//! by the caller, so the framework never owns hardware or I/O directly.

use crate::app::commands::{HostCommand, HostReply};
use crate::events::{EventInbox, Millis};
use crate::output::OutputRecord;

// ───────────────────────────────────────────────────────────────
// Clock port (time source + idle wait)
// ───────────────────────────────────────────────────────────────

/// Source of run time and the only place the dispatch loop may wait.
pub trait Clock {
    /// Restart the clock at zero; called when a run starts.
    fn reset(&mut self);

    /// Milliseconds since the last [`reset`](Self::reset).
    fn now_ms(&self) -> Millis;

    /// Wait until `deadline`, an inbox push, or an implementation-defined
    /// poll interval, whichever comes first.  `None` means nothing is
    /// scheduled.
    ///
    /// Returns `false` when no further event can ever arrive (a simulated
    /// clock with nothing left to deliver); the run then ends.
    fn idle(&mut self, deadline: Option<Millis>, inbox: &EventInbox) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Host port (telemetry out, commands in)
// ───────────────────────────────────────────────────────────────

/// Link to the host computer.
pub trait HostPort {
    /// Transmit one record.  Return `false` if the link cannot take it
    /// right now; the record stays buffered and is offered again later.
    fn send(&mut self, record: &OutputRecord) -> bool;

    /// Next pending command, if any.  Never blocks.
    fn poll_command(&mut self) -> Option<HostCommand> {
        None
    }

    /// Answer a command.
    fn reply(&mut self, _reply: &HostReply) {}
}
