//! Scheduler: machine registry, name tables and the dispatch loop.
//!
//! The [`Framework`] owns every piece of run state (virtual time, timers,
//! the ordered event queue, the output channel) and drives registered
//! machines from a single loop.  Interrupt context only ever touches the
//! [`EventInbox`]; everything else is mutated here.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Framework::run                          │
//! │                                                              │
//! │   ┌───────────┐   collect   ┌────────────┐                   │
//! │   │ EventInbox│────────────▶│ EventQueue │───┐               │
//! │   └───────────┘             └────────────┘   │ earliest ≤ now│
//! │   ┌───────────┐                              ▼               │
//! │   │ TimerSet  │─────────────────────▶┌──────────────┐        │
//! │   └───────────┘     expiry ≤ now     │   dispatch   │        │
//! │         ▲                            │ (route → SM) │        │
//! │         │                            └──────┬───────┘        │
//! │         └──── set_timer / timed_goto ───────┤                │
//! │                                             ▼                │
//! │   Clock::idle ◀── nothing due ── drain ◀── OutputChannel     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each pass moves interrupt events into the queue, then dispatches the
//! earliest event stamped at or before the current time.  A timer stays in
//! the [`TimerSet`] until it is that earliest event, so a handler that runs
//! first can still disarm it; queued events go before timers with the same
//! timestamp.  When nothing is due the output channel is flushed, host
//! commands are served at the current time, and the clock idles until the
//! next deadline.

use core::any::Any;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::app::commands::{HostCommand, HostReply};
use crate::app::ports::{Clock, HostPort};
use crate::config::FrameworkConfig;
use crate::error::{truncated, Error, Result};
use crate::events::{EventId, EventInbox, EventRecord, EventSource, MachineId, Millis, StateId};
use crate::fsm::context::Runtime;
use crate::fsm::{Machine, StateMachine, TaskDefinition, RESERVED_NAMES};
use crate::output::{OutputChannel, OutputRecord};
use crate::timer::TimerSet;
use crate::variables::{Value, Variables};

/// Maximum number of machines registered at once.
pub const MAX_MACHINES: usize = 4;

// ═══════════════════════════════════════════════════════════════
//  Name ↔ id tables
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    State,
    Event,
}

/// Interned state and event names.
///
/// Ids start at 1 (0 is the timed-transition event) and are handed out in
/// registration order: each machine's states, then its events.  A name
/// shared by two machines gets one id.  A name may not be a state in one
/// place and an event in another.
#[derive(Debug, Default)]
pub struct NameTable {
    entries: Vec<(&'static str, NameKind)>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern every name of `def`.  Nothing is added if any name conflicts.
    pub fn intern<T>(&mut self, def: &TaskDefinition<T>) -> Result<()> {
        let states = def.states.iter().map(|s| (*s, NameKind::State));
        let events = def.events.iter().map(|e| (*e, NameKind::Event));
        let all: Vec<_> = states.chain(events).collect();
        for &(name, kind) in &all {
            self.check(name, kind)?;
        }
        for (name, kind) in all {
            if self.lookup(name).is_none() {
                self.entries.push((name, kind));
            }
        }
        Ok(())
    }

    pub fn state_id(&self, name: &str) -> Result<StateId> {
        match self.lookup(name) {
            Some((id, NameKind::State)) => Ok(id),
            _ => Err(Error::unknown_state(name)),
        }
    }

    pub fn event_id(&self, name: &str) -> Result<EventId> {
        match self.lookup(name) {
            Some((id, NameKind::Event)) => Ok(id),
            _ => Err(Error::unknown_event(name)),
        }
    }

    /// Name for `id`; the timed-transition id reads as `"timed_goto"`.
    pub fn name(&self, id: u16) -> &'static str {
        match id.checked_sub(1) {
            None => "timed_goto",
            Some(i) => self.entries.get(usize::from(i)).map_or("?", |(n, _)| n),
        }
    }

    pub fn is_event(&self, id: u16) -> bool {
        id.checked_sub(1)
            .and_then(|i| self.entries.get(usize::from(i)))
            .is_some_and(|(_, kind)| *kind == NameKind::Event)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Export for the host.
    pub fn ids(&self) -> IdTable {
        let mut table = IdTable::default();
        for (i, (name, kind)) in self.entries.iter().enumerate() {
            let id = (i + 1) as u16;
            match kind {
                NameKind::State => table.states.push(((*name).to_owned(), id)),
                NameKind::Event => table.events.push(((*name).to_owned(), id)),
            }
        }
        table
    }

    fn lookup(&self, name: &str) -> Option<(u16, NameKind)> {
        self.entries
            .iter()
            .position(|(n, _)| *n == name)
            .map(|i| ((i + 1) as u16, self.entries[i].1))
    }

    fn check(&self, name: &str, kind: NameKind) -> Result<()> {
        if RESERVED_NAMES.contains(&name) {
            return Err(Error::ReservedName(truncated(name)));
        }
        match self.lookup(name) {
            Some((_, existing)) if existing != kind => Err(Error::DuplicateName(truncated(name))),
            _ => Ok(()),
        }
    }
}

/// Host-side copy of the name tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdTable {
    pub states: Vec<(String, StateId)>,
    pub events: Vec<(String, EventId)>,
}

impl IdTable {
    pub fn name(&self, id: u16) -> Option<&str> {
        self.states
            .iter()
            .chain(&self.events)
            .find(|(_, i)| *i == id)
            .map(|(n, _)| n.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════
//  Framework
// ═══════════════════════════════════════════════════════════════

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Virtual time when the run ended: the last dispatched event, or
    /// later if host commands were served after it.
    pub end_time: Millis,
    pub events_processed: u64,
    /// First fault that ended the run, if any.
    pub fault: Option<Error>,
    /// Output records lost to a full buffer or still unsent when the
    /// run ended.
    pub output_dropped: u32,
}

/// The scheduler.  One per device.
pub struct Framework<'a> {
    inbox: &'a EventInbox,
    rt: Runtime,
    machines: Vec<Box<dyn Machine>>,
    running: bool,
    events_processed: u64,
    fault: Option<Error>,
}

impl<'a> Framework<'a> {
    pub fn new(config: FrameworkConfig, inbox: &'a EventInbox) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inbox,
            rt: Runtime::new(config),
            machines: Vec::new(),
            running: false,
            events_processed: 0,
            fault: None,
        })
    }

    /// Register a task.  Returns the machine id used in telemetry and
    /// timer routing.
    pub fn register<T: 'static>(&mut self, def: TaskDefinition<T>, task: T) -> Result<MachineId> {
        if self.running {
            return Err(Error::RunActive);
        }
        if self.machines.len() >= MAX_MACHINES {
            return Err(Error::TooManyMachines);
        }
        def.validate()?;
        self.rt.names.intern(&def)?;
        let id = self.machines.len() as MachineId;
        let name = def.name();
        let machine = StateMachine::new(id, def, task, &self.rt.names)?;
        self.machines.push(Box::new(machine));
        info!("Framework: registered '{}' as machine {}", name, id);
        Ok(id)
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn config(&self) -> &FrameworkConfig {
        &self.rt.config
    }

    pub fn names(&self) -> &NameTable {
        &self.rt.names
    }

    pub fn ids(&self) -> IdTable {
        self.rt.names.ids()
    }

    pub fn now(&self) -> Millis {
        self.rt.now
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn inbox(&self) -> &'a EventInbox {
        self.inbox
    }

    pub fn output(&self) -> &OutputChannel {
        &self.rt.output
    }

    pub fn output_mut(&mut self) -> &mut OutputChannel {
        &mut self.rt.output
    }

    pub fn timers(&self) -> &TimerSet {
        &self.rt.timers
    }

    pub fn machine_count(&self) -> usize {
        self.machines.len()
    }

    pub fn task_name(&self, machine: MachineId) -> Option<&'static str> {
        self.machine(machine).map(|m| m.name())
    }

    pub fn current_state(&self, machine: MachineId) -> Option<&'static str> {
        self.machine(machine).map(|m| m.current_state())
    }

    pub fn variables(&self, machine: MachineId) -> Option<&Variables> {
        self.machine(machine).map(|m| m.variables())
    }

    /// Borrow a registered task's own data.
    pub fn task<T: 'static>(&self, machine: MachineId) -> Option<&T> {
        let any: &dyn Any = self.machine(machine)?.as_any();
        any.downcast_ref::<StateMachine<T>>().map(StateMachine::task)
    }

    // ── Host-facing operations ────────────────────────────────

    /// Set `name` on the first machine that declares it.
    pub fn set_variable(&mut self, name: &str, value: Value) -> Result<()> {
        let machine = self
            .machines
            .iter_mut()
            .find(|m| m.variables().contains(name))
            .ok_or_else(|| Error::unknown_variable(name))?;
        info!("Framework: {} = {}", name, value);
        machine.variables_mut().set(name, value)
    }

    /// Read `name` from the first machine that holds a value for it.
    pub fn get_variable(&self, name: &str) -> Result<Value> {
        self.machines
            .iter()
            .find_map(|m| m.variables().get(name).ok())
            .cloned()
            .ok_or_else(|| Error::unknown_variable(name))
    }

    /// Queue `event` at the current virtual time, addressed to every
    /// machine that declares it.
    pub fn publish_event(&mut self, event: &str) -> Result<()> {
        let id = self.rt.names.event_id(event)?;
        self.rt.queue.push(EventRecord {
            id,
            timestamp: self.rt.now,
            source: EventSource::Host,
        })
    }

    /// Request the run to end after the event being processed.
    pub fn stop(&mut self) {
        self.rt.stop_requested = true;
    }

    /// Every machine's hardware variables must have a value.
    pub fn check_hardware(&self) -> Result<()> {
        for m in &self.machines {
            if let Some(variable) = m.variables().undefined_hardware().next() {
                return Err(Error::UndefinedHardwareVariable {
                    task: m.name(),
                    variable: truncated(variable),
                });
            }
        }
        Ok(())
    }

    /// Apply one host command.  `Start` is only accepted by
    /// [`serve`](Self::serve) while idle.
    pub fn handle_command(&mut self, command: HostCommand) -> HostReply {
        let result = match command {
            HostCommand::SetVariable { name, value } => self.set_variable(&name, value),
            HostCommand::GetVariable { name } => {
                return match self.get_variable(&name) {
                    Ok(value) => HostReply::Variable { name, value },
                    Err(e) => HostReply::error(&e),
                };
            }
            HostCommand::TriggerEvent { name } => self.publish_event(&name),
            HostCommand::GetIds => return HostReply::Ids(self.ids()),
            HostCommand::Start { .. } => Err(Error::RunActive),
            HostCommand::Stop => {
                self.stop();
                Ok(())
            }
        };
        match result {
            Ok(()) => HostReply::Ack,
            Err(e) => {
                warn!("Framework: host command failed: {}", e);
                HostReply::error(&e)
            }
        }
    }

    /// Serve host commands while idle.  Returns the report of the run a
    /// `Start` command launched, or `None` once the host has nothing more.
    pub fn serve<C: Clock, H: HostPort>(
        &mut self,
        clock: &mut C,
        host: &mut H,
    ) -> Result<Option<RunReport>> {
        while let Some(command) = host.poll_command() {
            if let HostCommand::Start { duration } = command {
                return match self.run(clock, host, duration) {
                    Ok(report) => {
                        host.reply(&HostReply::Ack);
                        Ok(Some(report))
                    }
                    Err(e) => {
                        host.reply(&HostReply::error(&e));
                        Err(e)
                    }
                };
            }
            let reply = self.handle_command(command);
            host.reply(&reply);
        }
        Ok(None)
    }

    // ── Run lifecycle ─────────────────────────────────────────

    /// Run every registered machine until `stop`, a fault, the end of
    /// `duration` (events stamped exactly at it are still processed), or
    /// the clock reporting nothing left to wait for.
    ///
    /// Errors only if the run could not start.  Handler faults end the run
    /// and are returned in [`RunReport::fault`].
    pub fn run<C: Clock, H: HostPort>(
        &mut self,
        clock: &mut C,
        host: &mut H,
        duration: Option<Millis>,
    ) -> Result<RunReport> {
        if self.running {
            return Err(Error::RunActive);
        }
        self.check_hardware()?;

        self.rt.reset();
        self.inbox.clear();
        clock.reset();
        self.running = true;
        self.events_processed = 0;
        self.fault = None;
        info!(
            "Framework: run start ({} machines, duration {:?})",
            self.machines.len(),
            duration
        );

        self.start_machines();
        if self.fault.is_none() {
            self.dispatch_loop(clock, host, duration);
        }
        self.finish_machines();
        self.rt.output.drain_all(|r| host.send(r));
        let unsent = self.rt.output.len() as u32;
        if unsent > 0 {
            warn!("Framework: host refused {} records at run end", unsent);
        }
        self.running = false;

        let report = RunReport {
            end_time: self.rt.now,
            events_processed: self.events_processed,
            fault: self.fault.take(),
            output_dropped: self.rt.output.dropped() + unsent,
        };
        info!(
            "Framework: run end at t={} ({} events)",
            report.end_time, report.events_processed
        );
        Ok(report)
    }

    fn start_machines(&mut self) {
        let mut failure = None;
        for m in &mut self.machines {
            if let Err(e) = guarded(|| m.start(&mut self.rt)) {
                failure = Some(e);
                break;
            }
        }
        if let Some(e) = failure {
            self.raise(e);
        }
    }

    /// `run_end` for every machine, even after a fault.
    fn finish_machines(&mut self) {
        let mut failures = Vec::new();
        for m in &mut self.machines {
            if let Err(e) = guarded(|| m.finish(&mut self.rt)) {
                failures.push(e);
            }
        }
        for e in failures {
            self.raise(e);
        }
    }

    fn dispatch_loop<C: Clock, H: HostPort>(&mut self, clock: &mut C, host: &mut H, end: Option<Millis>) {
        let per_event = usize::from(self.rt.config.output_drain_per_event);
        while !self.rt.stop_requested {
            let now = clock.now_ms();
            let horizon = end.map_or(now, |e| now.min(e));

            if let Err(e) = self.collect() {
                self.raise(e);
                break;
            }
            if let Some(record) = self.next_due(horizon) {
                if let Err(e) = self.dispatch(record) {
                    self.raise(e);
                    break;
                }
                self.rt.output.drain(per_event, |r| host.send(r));
                continue;
            }

            // Nothing due: flush, serve the host, then wait.
            self.rt.output.drain_all(|r| host.send(r));
            if end.is_some_and(|e| now >= e) {
                break;
            }
            // Commands act at the current time, not the last event's.
            self.rt.now = self.rt.now.max(horizon);
            while let Some(command) = host.poll_command() {
                let reply = self.handle_command(command);
                host.reply(&reply);
            }
            if self.rt.stop_requested {
                break;
            }
            let deadline = [
                self.rt.timers.next_deadline(),
                self.rt.queue.peek_timestamp(),
                end,
            ]
            .into_iter()
            .flatten()
            .min();
            if !clock.idle(deadline, self.inbox) {
                break;
            }
        }
    }

    /// Move interrupt events into the queue.
    fn collect(&mut self) -> Result<()> {
        let dropped = self.inbox.take_dropped();
        if dropped > 0 {
            return Err(Error::InboxOverflow(dropped));
        }
        while let Some(raw) = self.inbox.pop() {
            if !self.rt.names.is_event(raw.id) {
                warn!("Framework: ignoring interrupt event with unknown id {}", raw.id);
                continue;
            }
            self.rt.queue.push(EventRecord {
                id: raw.id,
                timestamp: raw.timestamp,
                source: EventSource::Hardware,
            })?;
        }
        Ok(())
    }

    /// Earliest event due at `horizon`, from the queue or the timers.
    fn next_due(&mut self, horizon: Millis) -> Option<EventRecord> {
        let queued = self.rt.queue.peek_timestamp().filter(|&t| t <= horizon);
        let timer = self.rt.timers.next_deadline().filter(|&t| t <= horizon);
        match (queued, timer) {
            (Some(q), Some(t)) if t < q => self.expire_timer(horizon),
            (Some(_), _) => self.rt.queue.pop(),
            (None, Some(_)) => self.expire_timer(horizon),
            (None, None) => None,
        }
    }

    fn expire_timer(&mut self, horizon: Millis) -> Option<EventRecord> {
        self.rt.timers.pop_due(horizon).map(|(key, at)| key.expiry(at))
    }

    fn dispatch(&mut self, record: EventRecord) -> Result<()> {
        let rt = &mut self.rt;
        rt.now = rt.now.max(record.timestamp);
        self.events_processed += 1;

        if let EventSource::TimedTransition(m) = record.source {
            return match self.machines.get_mut(usize::from(m)) {
                Some(machine) => guarded(|| machine.fire_timed_goto(rt)),
                None => {
                    warn!("Framework: timed transition for unknown machine {}", m);
                    Ok(())
                }
            };
        }

        if rt.config.data_output {
            rt.output.push(OutputRecord::EventFired {
                time: rt.now,
                event: record.id,
            });
        }
        let target = record.target();
        for (i, machine) in self.machines.iter_mut().enumerate() {
            let addressed = match target {
                Some(t) => usize::from(t) == i,
                None => machine.handles(record.id),
            };
            if addressed {
                guarded(|| machine.dispatch(rt, record.id))?;
            }
        }
        Ok(())
    }

    /// Report a fault to the host and drive the run to a stop.
    fn raise(&mut self, fault: Error) {
        error!("Framework: fault at t={}: {}", self.rt.now, fault);
        self.rt.output.push(OutputRecord::Fault {
            time: self.rt.now,
            message: truncated(&fault.to_string()),
        });
        self.rt.stop_requested = true;
        if self.fault.is_none() {
            self.fault = Some(fault);
        }
    }

    fn machine(&self, id: MachineId) -> Option<&dyn Machine> {
        self.machines.get(usize::from(id)).map(|m| &**m)
    }
}

/// Run a handler call, turning a panic into [`Error::Panic`].
fn guarded(call: impl FnOnce() -> Result<()>) -> Result<()> {
    #[cfg(panic = "unwind")]
    {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(call))
            .unwrap_or_else(|payload| Err(Error::Panic(truncated(panic_text(payload.as_ref())))))
    }
    #[cfg(not(panic = "unwind"))]
    {
        call()
    }
}

#[cfg(panic = "unwind")]
fn panic_text(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
