//! Boundary of the framework core.
//!
//! The dispatch loop in [`crate::scheduler`] touches the outside world only
//! through the **port traits** in [`ports`] (a time source and a host
//! link), and is driven by the host through the messages in [`commands`].
//! Everything behind these seams is testable with a simulated clock and a
//! recording host.

pub mod commands;
pub mod ports;
