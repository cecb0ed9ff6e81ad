//! Output channel: buffered telemetry for the host link.
//!
//! Handlers append [`OutputRecord`]s while they run; the dispatch loop hands
//! them to the host port between events.  The buffer is bounded.  When it is
//! full the record is counted as dropped, and the next time space is free a
//! [`OutputRecord::Dropped`] marker carrying the count is queued in its
//! place, so the host sees exactly where data went missing.

use heapless::{Deque, String, Vec};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{truncated, Message, Name};
use crate::events::{EventId, Millis, StateId};

/// Records buffered between drains.
pub const OUTPUT_CAP: usize = 64;

/// Longest `print` text kept; longer text is truncated.
pub const PRINT_CAP: usize = 128;

/// Longest structured-data payload kept; longer payloads are truncated.
pub const DATA_CAP: usize = 64;

pub type PrintText = String<PRINT_CAP>;
pub type DataPayload = Vec<u8, DATA_CAP>;

/// One unit of device → host telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutputRecord {
    StateEntered { time: Millis, state: StateId },
    EventFired { time: Millis, event: EventId },
    Print { time: Millis, text: PrintText },
    Data {
        time: Millis,
        name: Name,
        type_tag: char,
        payload: DataPayload,
    },
    /// A handler fault or fatal overflow ended the run.
    Fault { time: Millis, message: Message },
    /// `count` records were lost at this point in the stream.
    Dropped { count: u32 },
}

impl OutputRecord {
    /// Virtual timestamp, if the record carries one.
    pub fn time(&self) -> Option<Millis> {
        match self {
            Self::StateEntered { time, .. }
            | Self::EventFired { time, .. }
            | Self::Print { time, .. }
            | Self::Data { time, .. }
            | Self::Fault { time, .. } => Some(*time),
            Self::Dropped { .. } => None,
        }
    }
}

/// Bounded FIFO of pending telemetry.
pub struct OutputChannel {
    buf: Deque<OutputRecord, OUTPUT_CAP>,
    /// Drops not yet reported with a marker.
    pending_drops: u32,
    total_drops: u32,
    truncations: u32,
}

impl Default for OutputChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputChannel {
    pub const fn new() -> Self {
        Self {
            buf: Deque::new(),
            pending_drops: 0,
            total_drops: 0,
            truncations: 0,
        }
    }

    /// Append a record.  Returns `false` if it was dropped.
    pub fn push(&mut self, record: OutputRecord) -> bool {
        self.settle();
        if self.pending_drops == 0 && self.buf.push_back(record).is_ok() {
            return true;
        }
        if self.pending_drops == 0 {
            warn!("Output: buffer full, dropping records");
        }
        self.pending_drops += 1;
        self.total_drops += 1;
        false
    }

    /// Buffer a `print` record, truncating long text.
    pub fn print(&mut self, time: Millis, text: &str) -> bool {
        let kept: PrintText = truncated(text);
        if kept.len() < text.len() {
            self.truncations += 1;
        }
        self.push(OutputRecord::Print { time, text: kept })
    }

    /// Buffer a structured-data record, truncating a long payload.
    pub fn data(&mut self, time: Millis, name: &str, type_tag: char, payload: &[u8]) -> bool {
        let take = payload.len().min(DATA_CAP);
        if take < payload.len() {
            self.truncations += 1;
        }
        let mut bytes = DataPayload::new();
        // Cannot fail: `take` is bounded by the capacity.
        let _ = bytes.extend_from_slice(&payload[..take]);
        self.push(OutputRecord::Data {
            time,
            name: truncated(name),
            type_tag,
            payload: bytes,
        })
    }

    /// Hand up to `max` records to `send`, oldest first.  Stops early when
    /// `send` refuses a record (it stays buffered).  Returns how many went.
    pub fn drain(&mut self, max: usize, mut send: impl FnMut(&OutputRecord) -> bool) -> usize {
        let mut sent = 0;
        while sent < max {
            let Some(front) = self.buf.front() else {
                break;
            };
            if !send(front) {
                break;
            }
            self.buf.pop_front();
            sent += 1;
            self.settle();
        }
        sent
    }

    /// Hand over everything, then any drop marker freed up by the drain.
    pub fn drain_all(&mut self, mut send: impl FnMut(&OutputRecord) -> bool) -> usize {
        self.drain(usize::MAX, &mut send)
    }

    pub fn pop(&mut self) -> Option<OutputRecord> {
        let rec = self.buf.pop_front();
        self.settle();
        rec
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutputRecord> {
        self.buf.iter()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Records lost since the channel was created or cleared.
    pub fn dropped(&self) -> u32 {
        self.total_drops
    }

    /// Print or data records cut short to fit.
    pub fn truncations(&self) -> u32 {
        self.truncations
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.pending_drops = 0;
        self.total_drops = 0;
        self.truncations = 0;
    }

    fn settle(&mut self) {
        if self.pending_drops > 0
            && self
                .buf
                .push_back(OutputRecord::Dropped {
                    count: self.pending_drops,
                })
                .is_ok()
        {
            self.pending_drops = 0;
        }
    }
}
