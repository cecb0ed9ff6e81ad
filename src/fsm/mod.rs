//! Event-driven state machine engine.
//!
//! A task is described once by a [`TaskDefinition`]: its state and event
//! names, the initial state, variables, and plain `fn` handlers.  At
//! registration the definition is compiled into a dispatch table indexed
//! by state:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  StateMachine<T>                                          │
//! │  ┌──────────────┬─────────────────────────────────────┐   │
//! │  │ all_states   │ Option<fn(&mut T, ctx, trig)->bool> │   │
//! │  ├──────────────┼─────────────────────────────────────┤   │
//! │  │ state 0      │ Option<fn(&mut T, ctx, trig)>       │   │
//! │  │ state 1      │ Option<fn(&mut T, ctx, trig)>       │   │
//! │  │ ...          │ None = no-op                        │   │
//! │  ├──────────────┼─────────────────────────────────────┤   │
//! │  │ run_start    │ Option<fn(&mut T, ctx)>             │   │
//! │  │ run_end      │ Option<fn(&mut T, ctx)>             │   │
//! │  └──────────────┴─────────────────────────────────────┘   │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Every trigger (`Entry`, `Exit`, or a named event) goes to `all_states`
//! first; if it returns `true` the state's own handler is skipped.
//! Transitions requested through [`Ctx::goto`] run after the handler
//! returns: `exit` on the old state, cancel the timed transition, record
//! the state change, then `entry` on the new state.

pub mod context;

use core::any::Any;

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::events::{EventId, MachineId, StateId};
use crate::output::OutputRecord;
use crate::timer::TimerKey;
use crate::variables::{Value, Variables, HARDWARE_PREFIX};
use context::{Ctx, Requests, Runtime};

/// Names a task may not use for its own states or events.
pub const RESERVED_NAMES: [&str; 5] = ["entry", "exit", "all_states", "run_start", "run_end"];

// ---------------------------------------------------------------------------
// Handler signatures
// ---------------------------------------------------------------------------

/// What a handler is being called for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Entry,
    Exit,
    Event(&'static str),
}

impl Trigger {
    /// The event name, if this is a named event.
    pub fn event(self) -> Option<&'static str> {
        match self {
            Self::Event(name) => Some(name),
            Self::Entry | Self::Exit => None,
        }
    }
}

/// Per-state handler.
pub type StateHandlerFn<T> = fn(&mut T, &mut Ctx<'_>, Trigger) -> Result<()>;

/// Cross-cutting handler; `Ok(true)` means handled, skip the state handler.
pub type AllStatesFn<T> = fn(&mut T, &mut Ctx<'_>, Trigger) -> Result<bool>;

/// `run_start` / `run_end` hook.
pub type HookFn<T> = fn(&mut T, &mut Ctx<'_>) -> Result<()>;

// ---------------------------------------------------------------------------
// Task definition
// ---------------------------------------------------------------------------

/// Declarative description of one task.
pub struct TaskDefinition<T> {
    pub(crate) name: &'static str,
    pub(crate) states: Vec<&'static str>,
    pub(crate) events: Vec<&'static str>,
    pub(crate) initial: &'static str,
    handlers: Vec<(&'static str, StateHandlerFn<T>)>,
    all_states: Option<AllStatesFn<T>>,
    run_start: Option<HookFn<T>>,
    run_end: Option<HookFn<T>>,
    variables: Vec<(&'static str, Value)>,
    hardware: Vec<&'static str>,
}

impl<T> TaskDefinition<T> {
    pub fn new(
        name: &'static str,
        states: &[&'static str],
        events: &[&'static str],
        initial: &'static str,
    ) -> Self {
        Self {
            name,
            states: states.to_vec(),
            events: events.to_vec(),
            initial,
            handlers: Vec::new(),
            all_states: None,
            run_start: None,
            run_end: None,
            variables: Vec::new(),
            hardware: Vec::new(),
        }
    }

    /// Bind the handler for `state`.  Binding twice keeps the last one.
    #[must_use]
    pub fn state(mut self, state: &'static str, handler: StateHandlerFn<T>) -> Self {
        self.handlers.retain(|(s, _)| *s != state);
        self.handlers.push((state, handler));
        self
    }

    #[must_use]
    pub fn all_states(mut self, handler: AllStatesFn<T>) -> Self {
        self.all_states = Some(handler);
        self
    }

    #[must_use]
    pub fn run_start(mut self, hook: HookFn<T>) -> Self {
        self.run_start = Some(hook);
        self
    }

    #[must_use]
    pub fn run_end(mut self, hook: HookFn<T>) -> Self {
        self.run_end = Some(hook);
        self
    }

    /// Declare a task variable with its default value.
    #[must_use]
    pub fn variable(mut self, name: &'static str, default: impl Into<Value>) -> Self {
        self.variables.push((name, default.into()));
        self
    }

    /// Declare a hardware variable; its value comes from the setup.
    #[must_use]
    pub fn hardware_variable(mut self, name: &'static str) -> Self {
        self.hardware.push(name);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Check the definition is self-consistent.
    pub fn validate(&self) -> Result<()> {
        if let Some(reserved) = self
            .states
            .iter()
            .chain(&self.events)
            .find(|n| RESERVED_NAMES.contains(*n))
        {
            return Err(Error::ReservedName(crate::error::truncated(reserved)));
        }
        if let Some(both) = self.states.iter().find(|s| self.events.contains(*s)) {
            return Err(Error::DuplicateName(crate::error::truncated(both)));
        }
        if !self.states.contains(&self.initial) {
            return Err(Error::unknown_state(self.initial));
        }
        if let Some((unbound, _)) = self
            .handlers
            .iter()
            .find(|(s, _)| !self.states.contains(s))
        {
            return Err(Error::UnboundHandler(crate::error::truncated(unbound)));
        }
        if self.hardware.iter().any(|h| !h.starts_with(HARDWARE_PREFIX)) {
            return Err(Error::Config("hardware variable names must start with hw_"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Type-erased machine interface (used by the scheduler)
// ---------------------------------------------------------------------------

pub(crate) trait Machine {
    fn name(&self) -> &'static str;
    fn handles(&self, event: EventId) -> bool;
    fn start(&mut self, rt: &mut Runtime) -> Result<()>;
    fn dispatch(&mut self, rt: &mut Runtime, event: EventId) -> Result<()>;
    fn fire_timed_goto(&mut self, rt: &mut Runtime) -> Result<()>;
    fn finish(&mut self, rt: &mut Runtime) -> Result<()>;
    fn current_state(&self) -> &'static str;
    fn variables(&self) -> &Variables;
    fn variables_mut(&mut self) -> &mut Variables;
    fn as_any(&self) -> &dyn Any;
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// One registered task with its dispatch table and current state.
pub struct StateMachine<T> {
    id: MachineId,
    name: &'static str,
    task: T,
    states: Vec<&'static str>,
    state_ids: Vec<StateId>,
    /// Declared event ids, sorted.
    events: Vec<EventId>,
    table: Vec<Option<StateHandlerFn<T>>>,
    all_states: Option<AllStatesFn<T>>,
    run_start: Option<HookFn<T>>,
    run_end: Option<HookFn<T>>,
    initial: usize,
    current: usize,
    /// Target of the pending timed transition, if any.
    timed_target: Option<usize>,
    vars: Variables,
}

impl<T> StateMachine<T> {
    /// Compile `def` into a dispatch table.  Its names must already be
    /// interned in `names`.
    pub(crate) fn new(
        id: MachineId,
        def: TaskDefinition<T>,
        task: T,
        names: &crate::scheduler::NameTable,
    ) -> Result<Self> {
        def.validate()?;
        let state_ids = def
            .states
            .iter()
            .map(|s| names.state_id(s))
            .collect::<Result<Vec<_>>>()?;
        let mut events = def
            .events
            .iter()
            .map(|e| names.event_id(e))
            .collect::<Result<Vec<_>>>()?;
        events.sort_unstable();
        events.dedup();

        let mut table = vec![None; def.states.len()];
        for (state, handler) in &def.handlers {
            for (slot, name) in table.iter_mut().zip(&def.states) {
                if name == state {
                    *slot = Some(*handler);
                }
            }
        }
        let initial = def
            .states
            .iter()
            .position(|s| *s == def.initial)
            .ok_or_else(|| Error::unknown_state(def.initial))?;

        let mut vars = Variables::new();
        for (name, default) in def.variables {
            vars.declare(name, default);
        }
        for name in &def.hardware {
            vars.declare_hardware(name);
        }

        Ok(Self {
            id,
            name: def.name,
            task,
            states: def.states,
            state_ids,
            events,
            table,
            all_states: def.all_states,
            run_start: def.run_start,
            run_end: def.run_end,
            initial,
            current: initial,
            timed_target: None,
            vars,
        })
    }

    pub fn id(&self) -> MachineId {
        self.id
    }

    pub fn task(&self) -> &T {
        &self.task
    }

    /// Run `all_states` then (unless handled) the current state's handler.
    /// Returns what the handlers requested.
    fn call(&mut self, rt: &mut Runtime, trigger: Trigger, goto_allowed: bool) -> Result<Requests> {
        let mut ctx = Ctx {
            rt,
            vars: &mut self.vars,
            timed_target: &mut self.timed_target,
            states: &self.states,
            machine: self.id,
            task: self.name,
            current: self.current,
            goto_allowed,
            pending: Requests::default(),
        };
        let handled = match self.all_states {
            Some(f) => f(&mut self.task, &mut ctx, trigger)?,
            None => false,
        };
        if !handled {
            if let Some(f) = self.table[self.current] {
                f(&mut self.task, &mut ctx, trigger)?;
            }
        }
        Ok(ctx.take_requests())
    }

    fn hook(&mut self, rt: &mut Runtime, hook: HookFn<T>, goto_allowed: bool) -> Result<Requests> {
        let mut ctx = Ctx {
            rt,
            vars: &mut self.vars,
            timed_target: &mut self.timed_target,
            states: &self.states,
            machine: self.id,
            task: self.name,
            current: self.current,
            goto_allowed,
            pending: Requests::default(),
        };
        hook(&mut self.task, &mut ctx)?;
        Ok(ctx.take_requests())
    }

    /// Perform requested transitions until no entry handler asks for more,
    /// then arm a timed goto that was held back behind them.
    ///
    /// The earliest held request wins: it was made by the outermost
    /// handler, which would have run last had each goto been immediate.
    fn settle(&mut self, rt: &mut Runtime, first: Requests) -> Result<()> {
        let mut held = first.timed;
        let mut next = first.goto;
        let mut hops = 0u8;
        while let Some(target) = next {
            if hops >= rt.config.max_chained_transitions {
                return Err(Error::TransitionLoop(self.states[target]));
            }
            hops += 1;
            let requests = self.transition(rt, target)?;
            next = requests.goto;
            held = held.or(requests.timed);
        }
        if let Some((target, at)) = held {
            rt.timers.reset(TimerKey::Transition(self.id), at)?;
            self.timed_target = Some(target);
        }
        Ok(())
    }

    fn transition(&mut self, rt: &mut Runtime, target: usize) -> Result<Requests> {
        debug!(
            "{}: {} -> {} at t={}",
            self.name, self.states[self.current], self.states[target], rt.now
        );
        // Gotos from exit handlers are ignored.
        self.call(rt, Trigger::Exit, false)?;
        self.timed_target = None;
        rt.timers.disarm(TimerKey::Transition(self.id));
        self.enter(rt, target)
    }

    fn enter(&mut self, rt: &mut Runtime, target: usize) -> Result<Requests> {
        if rt.config.data_output {
            rt.output.push(OutputRecord::StateEntered {
                time: rt.now,
                state: self.state_ids[target],
            });
        }
        self.current = target;
        self.call(rt, Trigger::Entry, true)
    }
}

impl<T: 'static> Machine for StateMachine<T> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn handles(&self, event: EventId) -> bool {
        self.events.binary_search(&event).is_ok()
    }

    fn start(&mut self, rt: &mut Runtime) -> Result<()> {
        info!("{}: run start in '{}'", self.name, self.states[self.initial]);
        self.current = self.initial;
        self.timed_target = None;
        let from_start = match self.run_start {
            Some(hook) => self.hook(rt, hook, true)?,
            None => Requests::default(),
        };
        let from_entry = self.enter(rt, self.initial)?;
        if let (Some(start), Some(entry)) = (from_start.goto, from_entry.goto) {
            warn!(
                "{}: goto('{}') from initial entry replaces goto('{}') from run_start",
                self.name, self.states[entry], self.states[start]
            );
        }
        let requests = match from_entry.goto {
            Some(_) => from_entry,
            None => from_start,
        };
        self.settle(rt, requests)
    }

    fn dispatch(&mut self, rt: &mut Runtime, event: EventId) -> Result<()> {
        let name = rt.names.name(event);
        let requests = self.call(rt, Trigger::Event(name), true)?;
        self.settle(rt, requests)
    }

    fn fire_timed_goto(&mut self, rt: &mut Runtime) -> Result<()> {
        match self.timed_target.take() {
            Some(target) => self.settle(
                rt,
                Requests {
                    goto: Some(target),
                    timed: None,
                },
            ),
            None => {
                warn!("{}: timed transition fired with no target", self.name);
                Ok(())
            }
        }
    }

    fn finish(&mut self, rt: &mut Runtime) -> Result<()> {
        if let Some(hook) = self.run_end {
            self.hook(rt, hook, false)?;
        }
        Ok(())
    }

    fn current_state(&self) -> &'static str {
        self.states[self.current]
    }

    fn variables(&self) -> &Variables {
        &self.vars
    }

    fn variables_mut(&mut self) -> &mut Variables {
        &mut self.vars
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
