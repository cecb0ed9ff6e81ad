//! Timer subsystem.
//!
//! Holds every armed timer across all machines in a fixed-capacity vector
//! kept sorted latest-first, so the next expiry is always the last element:
//! `next_deadline` and `pop_due` are O(1), arming is an ordered insert.
//!
//! ```text
//!   armed: [ t=900 | t=700 | t=500 | t=500 ]  ◀── pop_due(now) takes from here
//!                                      ▲ armed before the other t=500
//! ```
//!
//! Timers sharing a fire time expire in the order they were armed.  An
//! expiry becomes an [`EventRecord`] stamped with the *scheduled* fire time,
//! independent of when the loop actually gets round to it.

use heapless::Vec;
use log::warn;

use crate::error::{Error, Result};
use crate::events::{EventId, EventRecord, EventSource, MachineId, Millis, TRANSITION_EVENT};

/// Maximum number of concurrently armed timers across all machines.
pub const TIMER_CAP: usize = 32;

/// The slot a timer occupies.  Arming and disarming are scoped by key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// A named event timer owned by a machine (`set_timer`).
    Event { machine: MachineId, event: EventId },
    /// A machine's private timed-transition slot (`timed_goto`).
    Transition(MachineId),
}

impl TimerKey {
    /// Build the queue record posted when this timer fires at `fire_at`.
    pub fn expiry(self, fire_at: Millis) -> EventRecord {
        match self {
            Self::Event { machine, event } => EventRecord {
                id: event,
                timestamp: fire_at,
                source: EventSource::Timer(machine),
            },
            Self::Transition(machine) => EventRecord {
                id: TRANSITION_EVENT,
                timestamp: fire_at,
                source: EventSource::TimedTransition(machine),
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Armed {
    fire_at: Millis,
    seq: u64,
    key: TimerKey,
}

impl Armed {
    fn order(&self) -> (Millis, u64) {
        (self.fire_at, self.seq)
    }
}

/// The set of armed timers.
pub struct TimerSet {
    /// Sorted latest-first; the earliest expiry is `armed.last()`.
    armed: Vec<Armed, TIMER_CAP>,
    next_seq: u64,
}

impl Default for TimerSet {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerSet {
    pub fn new() -> Self {
        Self {
            armed: Vec::new(),
            next_seq: 0,
        }
    }

    /// Arm a timer that fires at absolute virtual time `fire_at`.
    pub fn set(&mut self, key: TimerKey, fire_at: Millis) -> Result<()> {
        let entry = Armed {
            fire_at,
            seq: self.next_seq,
            key,
        };
        let index = self
            .armed
            .iter()
            .position(|a| a.order() < entry.order())
            .unwrap_or(self.armed.len());
        if self.armed.insert(index, entry).is_err() {
            warn!("TimerSet: capacity exhausted arming {:?} at t={}", key, fire_at);
            return Err(Error::TimerCapacity);
        }
        self.next_seq += 1;
        Ok(())
    }

    /// Remove every pending timer bound to `key`.  Returns how many were
    /// removed; zero is not an error.
    pub fn disarm(&mut self, key: TimerKey) -> usize {
        let before = self.armed.len();
        self.armed.retain(|a| a.key != key);
        before - self.armed.len()
    }

    /// Disarm then set: leaves exactly one pending timer for `key`.
    pub fn reset(&mut self, key: TimerKey, fire_at: Millis) -> Result<()> {
        self.disarm(key);
        self.set(key, fire_at)
    }

    /// Earliest pending fire time.
    pub fn next_deadline(&self) -> Option<Millis> {
        self.armed.last().map(|a| a.fire_at)
    }

    /// Take the earliest timer if it is due at `now`.
    pub fn pop_due(&mut self, now: Millis) -> Option<(TimerKey, Millis)> {
        match self.armed.last() {
            Some(a) if a.fire_at <= now => self.armed.pop().map(|a| (a.key, a.fire_at)),
            _ => None,
        }
    }

    /// Number of pending timers bound to `key`.
    pub fn pending(&self, key: TimerKey) -> usize {
        self.armed.iter().filter(|a| a.key == key).count()
    }

    /// Fire times of the pending timers bound to `key`, earliest first.
    pub fn fire_times(&self, key: TimerKey) -> impl Iterator<Item = Millis> + '_ {
        self.armed
            .iter()
            .rev()
            .filter(move |a| a.key == key)
            .map(|a| a.fire_at)
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }

    pub fn clear(&mut self) {
        self.armed.clear();
        self.next_seq = 0;
    }
}
