//! Per-subject telemetry file.
//!
//! [`DataFile`] is a [`HostPort`] that appends every record to
//! `<dir>/<subject>-<YYYY-MM-DD>.txt`, one line per record in the same
//! layout as [`LogHost`](super::LogHost).  Each session starts with a
//! header naming the task, its state and event ids, and the start time,
//! so a day's sessions for one subject accumulate in one file.
//!
//! ```text
//! I Subject: m01
//! I Task: blink
//! I States: red=1 green=2 done=3
//! I Events: button=4
//! I Run started at: 2026-10-14 09:30:00
//!
//! D 0 1 red
//! D 250 2 green
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use log::{error, info};

use super::log_sink::render;
use crate::app::ports::HostPort;
use crate::output::OutputRecord;
use crate::scheduler::IdTable;

pub struct DataFile {
    path: PathBuf,
    file: File,
    ids: IdTable,
    written: u64,
}

impl DataFile {
    /// Open today's file for `subject` under `dir`, stamped with the local
    /// time.
    pub fn open(dir: &Path, subject: &str, task: &str, ids: IdTable) -> io::Result<Self> {
        Self::open_at(dir, subject, task, ids, chrono::Local::now().naive_local())
    }

    /// Open the file for `subject` on the day of `started`, creating `dir`
    /// if needed, and write the session header.
    pub fn open_at(
        dir: &Path,
        subject: &str,
        task: &str,
        ids: IdTable,
        started: NaiveDateTime,
    ) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}-{}.txt", subject, started.format("%Y-%m-%d")));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut data = Self {
            path,
            file,
            ids,
            written: 0,
        };
        data.write_header(subject, task, started)?;
        info!("DataFile: recording to {}", data.path.display());
        Ok(data)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records written this session.
    pub fn written(&self) -> u64 {
        self.written
    }

    fn write_header(&mut self, subject: &str, task: &str, started: NaiveDateTime) -> io::Result<()> {
        let states = id_list(&self.ids.states);
        let events = id_list(&self.ids.events);
        writeln!(self.file, "I Subject: {}", subject)?;
        writeln!(self.file, "I Task: {}", task)?;
        writeln!(self.file, "I States: {}", states)?;
        writeln!(self.file, "I Events: {}", events)?;
        writeln!(self.file, "I Run started at: {}", started.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(self.file)
    }
}

fn id_list(entries: &[(String, u16)]) -> String {
    entries
        .iter()
        .map(|(name, id)| format!("{}={}", name, id))
        .collect::<Vec<_>>()
        .join(" ")
}

impl HostPort for DataFile {
    /// A failed write leaves the record buffered; it is offered again and
    /// counted as dropped if the run ends first.
    fn send(&mut self, record: &OutputRecord) -> bool {
        let line = render(record, &self.ids);
        match writeln!(self.file, "{}", line) {
            Ok(()) => {
                self.written += 1;
                true
            }
            Err(e) => {
                error!("DataFile: write to {} failed: {}", self.path.display(), e);
                false
            }
        }
    }
}
