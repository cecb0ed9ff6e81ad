//! Edge-detecting digital input.
//!
//! ## Hardware
//!
//! Any pin implementing [`embedded_hal::digital::InputPin`] (lever switch,
//! beam-break, nose-poke sensor).  [`DigitalInput::sample`] is called from
//! the GPIO ISR or a fast polling timer with the current run time; a change
//! of level pushes the matching event id into the [`EventInbox`] stamped
//! with that time, so the event carries interrupt time and not dispatch time.
//!
//! ## Edges
//!
//! | Transition | Event pushed      |
//! |------------|-------------------|
//! | low → high | `rising` (if set) |
//! | high → low | `falling` (if set)|
//!
//! A change faster than `debounce_ms` after the previous accepted edge is
//! treated as contact bounce: the level is tracked but no event is pushed.

use embedded_hal::digital::InputPin;
use log::warn;

use crate::events::{EventId, EventInbox, Millis};

/// Level change seen on the pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

pub struct DigitalInput<P> {
    pin: P,
    rising: Option<EventId>,
    falling: Option<EventId>,
    debounce_ms: Millis,
    level: Option<bool>,
    last_edge: Option<Millis>,
    lost: u32,
}

impl<P: InputPin> DigitalInput<P> {
    /// `rising` / `falling` are event ids from the framework's name table.
    pub fn new(pin: P, rising: Option<EventId>, falling: Option<EventId>) -> Self {
        Self {
            pin,
            rising,
            falling,
            debounce_ms: 0,
            level: None,
            last_edge: None,
            lost: 0,
        }
    }

    #[must_use]
    pub fn with_debounce(mut self, debounce_ms: Millis) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    /// Last level read, `None` before the first sample.
    pub fn level(&self) -> Option<bool> {
        self.level
    }

    /// Edges the inbox refused because it was full.
    pub fn lost(&self) -> u32 {
        self.lost
    }

    pub fn release(self) -> P {
        self.pin
    }

    /// Read the pin and report an edge, pushing its event into `inbox`.
    ///
    /// The first sample only establishes the starting level.
    pub fn sample(&mut self, now: Millis, inbox: &EventInbox) -> Result<Option<Edge>, P::Error> {
        let high = self.pin.is_high()?;
        let previous = self.level.replace(high);
        let edge = match previous {
            Some(false) if high => Edge::Rising,
            Some(true) if !high => Edge::Falling,
            _ => return Ok(None),
        };

        if self
            .last_edge
            .is_some_and(|t| now.saturating_sub(t) < self.debounce_ms)
        {
            return Ok(None);
        }
        self.last_edge = Some(now);

        let id = match edge {
            Edge::Rising => self.rising,
            Edge::Falling => self.falling,
        };
        if let Some(id) = id {
            if !inbox.push(id, now) {
                self.lost += 1;
                warn!("DigitalInput: inbox full, {:?} edge at t={} lost", edge, now);
            }
        }
        Ok(Some(edge))
    }
}
