//! Log-based host adapter.
//!
//! Implements [`HostPort`] by writing each telemetry record to the logger
//! (UART / USB-CDC on the device, stderr on a host).  Lines use the compact
//! `D <time> <id>` / `P <time> <text>` layout, followed by the name when
//! the id table is known.  Commands are never received.

use log::{error, info, warn};

use crate::app::ports::HostPort;
use crate::output::OutputRecord;
use crate::scheduler::IdTable;

/// Adapter that logs every [`OutputRecord`] to the console.
#[derive(Debug, Default)]
pub struct LogHost {
    ids: IdTable,
    sent: u64,
}

impl LogHost {
    pub fn new(ids: IdTable) -> Self {
        Self { ids, sent: 0 }
    }

    /// Records written so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

}

impl HostPort for LogHost {
    fn send(&mut self, record: &OutputRecord) -> bool {
        let line = render(record, &self.ids);
        match record {
            OutputRecord::Fault { .. } => error!("{}", line),
            OutputRecord::Dropped { .. } => warn!("{}", line),
            _ => info!("{}", line),
        }
        self.sent += 1;
        true
    }
}

/// One telemetry line: `D <time> <id> <name>` for states and events,
/// `P` for prints, `A` for data and `!` for faults and losses.
pub fn render(record: &OutputRecord, ids: &IdTable) -> String {
    let label = |id: u16| ids.name(id).unwrap_or("");
    match record {
        OutputRecord::StateEntered { time, state } => format!("D {} {} {}", time, state, label(*state)),
        OutputRecord::EventFired { time, event } => format!("D {} {} {}", time, event, label(*event)),
        OutputRecord::Print { time, text } => format!("P {} {}", time, text),
        OutputRecord::Data {
            time,
            name,
            type_tag,
            payload,
        } => format!("A {} {} {} {:02x?}", time, name, type_tag, payload.as_slice()),
        OutputRecord::Fault { time, message } => format!("! {} {}", time, message),
        OutputRecord::Dropped { count } => format!("! {} records dropped", count),
    }
}
