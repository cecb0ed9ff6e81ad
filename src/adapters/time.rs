//! Clock adapters.
//!
//! - [`SystemClock`]: wall-clock milliseconds since the run started.
//!   - **`target_os = "espidf"`**: wraps `esp_timer_get_time()` (microsecond
//!     precision, monotonic) and idles with a FreeRTOS delay.
//!   - **`not(target_os = "espidf")`**: uses `std::time::Instant` and
//!     `thread::sleep` for host-side runs.
//! - [`SimClock`]: virtual time for tests and offline runs: idling jumps
//!   straight to the next deadline, and scripted interrupt events are pushed
//!   into the inbox as their time comes.

use std::collections::VecDeque;

use crate::app::ports::Clock;
use crate::events::{EventId, EventInbox, Millis};

// ───────────────────────────────────────────────────────────────
// Wall clock
// ───────────────────────────────────────────────────────────────

/// Real-time clock for running on hardware (or in real time on a host).
pub struct SystemClock {
    /// Longest single wait before re-checking the inbox.
    poll_ms: u32,
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
    #[cfg(target_os = "espidf")]
    start_us: i64,
}

impl SystemClock {
    pub fn new(poll_ms: u32) -> Self {
        Self {
            poll_ms: poll_ms.max(1),
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
            #[cfg(target_os = "espidf")]
            start_us: uptime_us(),
        }
    }

    fn wait_ms(&self, deadline: Option<Millis>) -> u32 {
        let poll = u64::from(self.poll_ms);
        let wait = deadline.map_or(poll, |d| d.saturating_sub(self.now_ms()).min(poll));
        wait as u32
    }
}

#[cfg(target_os = "espidf")]
fn uptime_us() -> i64 {
    unsafe { esp_idf_svc::sys::esp_timer_get_time() }
}

impl Clock for SystemClock {
    #[cfg(not(target_os = "espidf"))]
    fn reset(&mut self) {
        self.start = std::time::Instant::now();
    }

    #[cfg(target_os = "espidf")]
    fn reset(&mut self) {
        self.start_us = uptime_us();
    }

    #[cfg(not(target_os = "espidf"))]
    fn now_ms(&self) -> Millis {
        self.start.elapsed().as_millis() as Millis
    }

    #[cfg(target_os = "espidf")]
    fn now_ms(&self) -> Millis {
        ((uptime_us() - self.start_us) / 1000) as Millis
    }

    fn idle(&mut self, deadline: Option<Millis>, inbox: &EventInbox) -> bool {
        if !inbox.is_empty() {
            return true;
        }
        let wait = self.wait_ms(deadline);
        if wait > 0 {
            #[cfg(not(target_os = "espidf"))]
            std::thread::sleep(std::time::Duration::from_millis(u64::from(wait)));
            #[cfg(target_os = "espidf")]
            esp_idf_svc::hal::delay::FreeRtos::delay_ms(wait);
        }
        true
    }
}

// ───────────────────────────────────────────────────────────────
// Simulated clock
// ───────────────────────────────────────────────────────────────

/// Deterministic virtual clock.
#[derive(Debug, Default)]
pub struct SimClock {
    now: Millis,
    /// Scripted interrupt events, ordered by time then insertion.
    script: VecDeque<(Millis, EventId)>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver interrupt event `id` into the inbox at virtual time `at`.
    pub fn inject(&mut self, at: Millis, id: EventId) {
        let index = self.script.partition_point(|(t, _)| *t <= at);
        self.script.insert(index, (at, id));
    }

    /// Scripted events not yet delivered.
    pub fn pending(&self) -> usize {
        self.script.len()
    }
}

impl Clock for SimClock {
    fn reset(&mut self) {
        self.now = 0;
    }

    fn now_ms(&self) -> Millis {
        self.now
    }

    fn idle(&mut self, deadline: Option<Millis>, inbox: &EventInbox) -> bool {
        let next_script = self.script.front().map(|(t, _)| *t);
        let Some(target) = [deadline, next_script].into_iter().flatten().min() else {
            return !inbox.is_empty();
        };
        self.now = self.now.max(target);
        while let Some(&(at, id)) = self.script.front() {
            if at > self.now {
                break;
            }
            self.script.pop_front();
            inbox.push(id, at);
        }
        true
    }
}
