//! Handler capability interface.
//!
//! Every handler receives a [`Ctx`]: the only way task code touches the
//! framework.  It borrows the framework's shared [`Runtime`] (clock value,
//! name table, timers, event queue, output channel) plus the calling
//! machine's own variables and timed-transition slot, for the duration of
//! one handler call.
//!
//! `goto` is deferred: the request is recorded here and the machine
//! performs the exit → entry sequence after the handler returns, so a
//! transition never runs while another handler is still on the stack.
//! A `timed_goto` made after a pending `goto` in the same handler is held
//! back too, and armed once that transition has run.

use log::warn;

use crate::config::FrameworkConfig;
use crate::error::{Error, Result};
use crate::events::{EventQueue, EventRecord, EventSource, MachineId, Millis};
use crate::output::OutputChannel;
use crate::scheduler::NameTable;
use crate::timer::{TimerKey, TimerSet};
use crate::variables::Variables;

/// Framework state shared by all machines during a run.
pub struct Runtime {
    /// Current virtual time.
    pub now: Millis,
    pub config: FrameworkConfig,
    pub names: NameTable,
    pub timers: TimerSet,
    pub queue: EventQueue,
    pub output: OutputChannel,
    /// Set by `Ctx::stop` or a host `Stop`; honoured between events.
    pub stop_requested: bool,
}

impl Runtime {
    pub fn new(config: FrameworkConfig) -> Self {
        Self {
            now: 0,
            config,
            names: NameTable::new(),
            timers: TimerSet::new(),
            queue: EventQueue::new(),
            output: OutputChannel::new(),
            stop_requested: false,
        }
    }

    /// Forget everything left over from a previous run.
    pub fn reset(&mut self) {
        self.now = 0;
        self.timers.clear();
        self.queue.clear();
        self.output.clear();
        self.stop_requested = false;
    }
}

/// Handle passed to every task handler.
pub struct Ctx<'a> {
    pub(crate) rt: &'a mut Runtime,
    pub(crate) vars: &'a mut Variables,
    pub(crate) timed_target: &'a mut Option<usize>,
    pub(crate) states: &'a [&'static str],
    pub(crate) machine: MachineId,
    pub(crate) task: &'static str,
    pub(crate) current: usize,
    pub(crate) goto_allowed: bool,
    pub(crate) pending: Requests,
}

/// What a handler asked for that takes effect after it returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Requests {
    /// Target of the requested `goto`.
    pub goto: Option<usize>,
    /// `(target, fire_at)` of a `timed_goto` made after that `goto`.
    pub timed: Option<(usize, Millis)>,
}

impl Ctx<'_> {
    /// Current virtual time in milliseconds since run start.
    pub fn now(&self) -> Millis {
        self.rt.now
    }

    pub fn machine_id(&self) -> MachineId {
        self.machine
    }

    pub fn task_name(&self) -> &'static str {
        self.task
    }

    pub fn current_state(&self) -> &'static str {
        self.states[self.current]
    }

    // ── Transitions ───────────────────────────────────────────

    /// Request a transition to `state` once this handler returns.
    ///
    /// A second request in the same handler replaces the first.  Requests
    /// from `exit` and `run_end` handlers are ignored.
    pub fn goto(&mut self, state: &str) -> Result<()> {
        let target = self.state_index(state)?;
        if !self.goto_allowed {
            warn!("{}: goto('{}') ignored outside entry/event handlers", self.task, state);
            return Ok(());
        }
        if let Some(prev) = self.pending.goto.replace(target) {
            warn!(
                "{}: goto('{}') replaces pending goto('{}')",
                self.task, state, self.states[prev]
            );
        }
        // The new transition cancels any timed goto held for the old one.
        self.pending.timed = None;
        Ok(())
    }

    /// Transition to `state` after `interval` ms unless a `goto` happens
    /// first.  Replaces any timed transition already pending.
    ///
    /// Called after `goto` in the same handler, the timer is armed once
    /// that transition (and any it chains into) has completed.
    pub fn timed_goto(&mut self, state: &str, interval: Millis) -> Result<()> {
        let target = self.state_index(state)?;
        let at = self.deadline(interval);
        if self.pending.goto.is_some() {
            self.pending.timed = Some((target, at));
            return Ok(());
        }
        self.rt.timers.reset(TimerKey::Transition(self.machine), at)?;
        *self.timed_target = Some(target);
        Ok(())
    }

    // ── Timers ────────────────────────────────────────────────

    /// Post `event` to this machine after `interval` ms.
    pub fn set_timer(&mut self, event: &str, interval: Millis) -> Result<()> {
        let key = self.timer_key(event)?;
        let at = self.deadline(interval);
        self.rt.timers.set(key, at)
    }

    /// Cancel every pending timer for `event`.  No timer is not an error.
    pub fn disarm_timer(&mut self, event: &str) -> Result<()> {
        let key = self.timer_key(event)?;
        self.rt.timers.disarm(key);
        Ok(())
    }

    /// Cancel pending timers for `event` and arm a single new one.
    pub fn reset_timer(&mut self, event: &str, interval: Millis) -> Result<()> {
        let key = self.timer_key(event)?;
        let at = self.deadline(interval);
        self.rt.timers.reset(key, at)
    }

    // ── Events and output ─────────────────────────────────────

    /// Queue `event` stamped with the current virtual time.
    pub fn publish_event(&mut self, event: &str) -> Result<()> {
        let id = self.rt.names.event_id(event)?;
        self.rt.queue.push(EventRecord {
            id,
            timestamp: self.rt.now,
            source: EventSource::Published(self.machine),
        })
    }

    /// Send timestamped text to the host.
    pub fn print(&mut self, text: &str) {
        if self.rt.config.data_output {
            self.rt.output.print(self.rt.now, text);
        }
    }

    /// Send a named, typed payload to the host.
    pub fn emit_data(&mut self, name: &str, type_tag: char, payload: &[u8]) {
        if self.rt.config.data_output {
            self.rt.output.data(self.rt.now, name, type_tag, payload);
        }
    }

    /// End the run after the current event.
    pub fn stop(&mut self) {
        self.rt.stop_requested = true;
    }

    // ── Variables ─────────────────────────────────────────────

    pub fn vars(&self) -> &Variables {
        &*self.vars
    }

    pub fn vars_mut(&mut self) -> &mut Variables {
        &mut *self.vars
    }

    pub(crate) fn take_requests(&mut self) -> Requests {
        core::mem::take(&mut self.pending)
    }

    fn state_index(&self, state: &str) -> Result<usize> {
        self.states
            .iter()
            .position(|s| *s == state)
            .ok_or_else(|| Error::unknown_state(state))
    }

    fn timer_key(&self, event: &str) -> Result<TimerKey> {
        Ok(TimerKey::Event {
            machine: self.machine,
            event: self.rt.names.event_id(event)?,
        })
    }

    fn deadline(&self, interval: Millis) -> Millis {
        self.rt.now.saturating_add(interval)
    }
}
