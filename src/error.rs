//! Unified error types for the task framework.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! dispatch loop's fault handling uniform.  Names carried in variants are
//! fixed-capacity strings so no variant allocates.

use core::fmt;

/// Maximum length of a state, event or variable name carried in an error.
pub const NAME_CAP: usize = 32;

/// Maximum length of a free-form fault message.
pub const MESSAGE_CAP: usize = 96;

/// Fixed-capacity name (truncated on overflow).
pub type Name = heapless::String<NAME_CAP>;

/// Fixed-capacity fault message (truncated on overflow).
pub type Message = heapless::String<MESSAGE_CAP>;

/// Copy `text` into a fixed-capacity string, truncating on a char boundary.
pub fn truncated<const N: usize>(text: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for ch in text.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Top-level framework error
// ---------------------------------------------------------------------------

/// Every fallible operation in the framework funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A transition named a state the machine does not declare.
    UnknownState(Name),
    /// A timer or published event named an event no machine declares.
    UnknownEvent(Name),
    /// A host or task access to a variable that was never declared.
    UnknownVariable(Name),
    /// A typed variable read found a value of another type.
    VariableType(Name),
    /// A name was declared as both a state and an event.
    DuplicateName(Name),
    /// A task used one of the reserved handler or pseudo-event names.
    ReservedName(Name),
    /// A handler was bound to a name outside the declared state set.
    UnboundHandler(Name),
    /// A task's hardware variable has no value for this setup.
    UndefinedHardwareVariable {
        task: &'static str,
        variable: Name,
    },
    /// The machine registry is full.
    TooManyMachines,
    /// `register` was called while a run is active.
    RunActive,
    /// No free slot for another armed timer.
    TimerCapacity,
    /// The ordered event queue is full.
    EventQueueFull,
    /// Interrupt-side events were lost before reaching the queue.
    InboxOverflow(u32),
    /// Entry handlers kept requesting transitions past the configured bound.
    TransitionLoop(&'static str),
    /// A handler reported a fault.
    Task(Message),
    /// A handler panicked.
    Panic(Message),
    /// A frame could not be encoded or decoded.
    Codec(&'static str),
    /// Configuration is invalid.
    Config(&'static str),
}

impl Error {
    /// Build a task fault from handler code: `return Err(Error::task("lever jammed"))`.
    pub fn task(message: &str) -> Self {
        Self::Task(truncated(message))
    }

    pub(crate) fn unknown_state(name: &str) -> Self {
        Self::UnknownState(truncated(name))
    }

    pub(crate) fn unknown_event(name: &str) -> Self {
        Self::UnknownEvent(truncated(name))
    }

    pub(crate) fn unknown_variable(name: &str) -> Self {
        Self::UnknownVariable(truncated(name))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownState(name) => write!(f, "unknown state '{name}'"),
            Self::UnknownEvent(name) => write!(f, "unknown event '{name}'"),
            Self::UnknownVariable(name) => write!(f, "unknown variable '{name}'"),
            Self::VariableType(name) => write!(f, "variable '{name}' has the wrong type"),
            Self::DuplicateName(name) => {
                write!(f, "'{name}' declared as both a state and an event")
            }
            Self::ReservedName(name) => write!(f, "'{name}' is a reserved name"),
            Self::UnboundHandler(name) => {
                write!(f, "handler bound to undeclared state '{name}'")
            }
            Self::UndefinedHardwareVariable { task, variable } => write!(
                f,
                "hardware variable '{variable}' used by task '{task}' has no value"
            ),
            Self::TooManyMachines => write!(f, "machine registry full"),
            Self::RunActive => write!(f, "run already active"),
            Self::TimerCapacity => write!(f, "timer capacity exhausted"),
            Self::EventQueueFull => write!(f, "event queue overflow"),
            Self::InboxOverflow(n) => write!(f, "interrupt inbox dropped {n} events"),
            Self::TransitionLoop(state) => {
                write!(f, "transition loop entering state '{state}'")
            }
            Self::Task(msg) => write!(f, "task fault: {msg}"),
            Self::Panic(msg) => write!(f, "handler panicked: {msg}"),
            Self::Codec(msg) => write!(f, "codec: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Framework-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
