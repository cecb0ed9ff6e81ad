//! Interrupt-driven event system.
//!
//! Events are produced by:
//! - GPIO ISRs / serial RX (pushed into the [`EventInbox`] at interrupt time)
//! - Expired timers (moved in by the scheduler at their scheduled time)
//! - Task code (`publish_event`, stamped with the current virtual time)
//! - The host link (`TriggerEvent` commands)
//!
//! Events are consumed by the dispatch loop, which pops them from the
//! [`EventQueue`] earliest-timestamp first.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐
//! │ GPIO ISR    │────▶│  EventInbox  │──┐
//! │ Serial RX   │────▶│  (lock-free) │  │   ┌──────────────┐     ┌──────────────┐
//! └─────────────┘     └──────────────┘  ├──▶│  EventQueue  │────▶│ Dispatch loop│
//! ┌─────────────┐                       │   │ (ts, arrival)│     │  (consumer)  │
//! │ TimerSet    │───────────────────────┤   └──────────────┘     └──────────────┘
//! │ Task code   │───────────────────────┘
//! └─────────────┘
//! ```
//!
//! The inbox is the only structure touched from interrupt context.  Its
//! push is a bounded critical section; everything behind it is owned by
//! the single dispatch thread.

use core::cmp::Ordering as CmpOrdering;
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::binary_heap::{BinaryHeap, Min};
use log::error;

use crate::error::{Error, Result};

/// Virtual run-time in milliseconds since run start.
pub type Millis = u64;

/// Interned event identity (see [`NameTable`](crate::scheduler::NameTable)).
pub type EventId = u16;

/// Interned state identity; states and events share one id space.
pub type StateId = u16;

/// Machine identity assigned at registration.
pub type MachineId = u8;

/// Reserved id carried by timed-transition expiries.
pub const TRANSITION_EVENT: EventId = 0;

/// Maximum number of interrupt events awaiting collection.
pub const INBOX_CAP: usize = 32;

/// Maximum number of ordered events pending dispatch.
pub const EVENT_QUEUE_CAP: usize = 64;

// ═══════════════════════════════════════════════════════════════
//  Event records
// ═══════════════════════════════════════════════════════════════

/// Where an event came from; decides which machine receives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    /// Pin edge or other interrupt source.
    Hardware,
    /// Injected by the host link.
    Host,
    /// `publish_event` from a machine's handler.
    Published(MachineId),
    /// `set_timer` armed by a machine.
    Timer(MachineId),
    /// A machine's pending timed transition.
    TimedTransition(MachineId),
}

/// A single queued event.  Created once, queued once, consumed once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    pub id: EventId,
    /// Virtual time at creation (not at dequeue).
    pub timestamp: Millis,
    pub source: EventSource,
}

impl EventRecord {
    /// The machine this event is addressed to, or `None` to broadcast.
    pub fn target(&self) -> Option<MachineId> {
        match self.source {
            EventSource::Timer(m) | EventSource::TimedTransition(m) => Some(m),
            EventSource::Hardware | EventSource::Host | EventSource::Published(_) => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Interrupt inbox
// ═══════════════════════════════════════════════════════════════

/// Event captured in interrupt context: id plus the virtual time at
/// which the interrupt fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub id: EventId,
    pub timestamp: Millis,
}

/// Bounded ISR → dispatch-loop hand-off.
///
/// `push` is safe to call from interrupt context; it never blocks and
/// never allocates.  A full inbox increments an overflow counter that the
/// scheduler collects and reports, so lost interrupts are never silent.
pub struct EventInbox {
    channel: Channel<CriticalSectionRawMutex, RawEvent, INBOX_CAP>,
    dropped: AtomicU32,
}

impl Default for EventInbox {
    fn default() -> Self {
        Self::new()
    }
}

impl EventInbox {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            dropped: AtomicU32::new(0),
        }
    }

    /// Push an interrupt event.  Returns `false` if the inbox was full.
    pub fn push(&self, id: EventId, timestamp: Millis) -> bool {
        if self.channel.try_send(RawEvent { id, timestamp }).is_ok() {
            true
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Pop the oldest pending interrupt event.
    pub fn pop(&self) -> Option<RawEvent> {
        self.channel.try_receive().ok()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    /// Read and reset the overflow counter.
    pub fn take_dropped(&self) -> u32 {
        self.dropped.swap(0, Ordering::Relaxed)
    }

    /// Discard anything left over from a previous run.
    pub fn clear(&self) {
        self.channel.clear();
        self.dropped.store(0, Ordering::Relaxed);
    }
}

// ═══════════════════════════════════════════════════════════════
//  Ordered event queue
// ═══════════════════════════════════════════════════════════════

/// Heap entry ordered by timestamp, then arrival sequence.
#[derive(Debug, Clone, Copy)]
struct Queued {
    seq: u64,
    record: EventRecord,
}

impl Queued {
    fn key(&self) -> (Millis, u64) {
        (self.record.timestamp, self.seq)
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.key().cmp(&other.key())
    }
}

/// Pending events, earliest timestamp first; equal timestamps leave in
/// arrival order.
pub struct EventQueue {
    heap: BinaryHeap<Queued, Min, EVENT_QUEUE_CAP>,
    next_seq: u64,
    overflows: u32,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
            overflows: 0,
        }
    }

    /// Queue an event.  A full queue is counted and reported as
    /// [`Error::EventQueueFull`]; the event is not queued.
    pub fn push(&mut self, record: EventRecord) -> Result<()> {
        let entry = Queued {
            seq: self.next_seq,
            record,
        };
        if self.heap.push(entry).is_err() {
            self.overflows += 1;
            error!(
                "EventQueue: overflow dropping event {} at t={}",
                record.id, record.timestamp
            );
            return Err(Error::EventQueueFull);
        }
        self.next_seq += 1;
        Ok(())
    }

    /// Remove the earliest event.
    pub fn pop(&mut self) -> Option<EventRecord> {
        self.heap.pop().map(|q| q.record)
    }

    /// Timestamp of the earliest event, if any.
    pub fn peek_timestamp(&self) -> Option<Millis> {
        self.heap.peek().map(|q| q.record.timestamp)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Number of events refused because the queue was full.
    pub fn overflows(&self) -> u32 {
        self.overflows
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.next_seq = 0;
        self.overflows = 0;
    }
}
