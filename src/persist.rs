//! Persistent variables.
//!
//! Some task variables carry over between sessions for the same subject
//! (a training stage, a running reward count).  They are kept in one JSON
//! file per experiment, mapping variable → subject → value:
//!
//! ```text
//! { "stage": { "m01": 3, "m02": 1 }, "rewards": { "m01": 412 } }
//! ```
//!
//! The runner restores them before a run and stores them back from the
//! framework afterwards.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::Error;
use crate::scheduler::Framework;
use crate::variables::Value;

#[derive(Debug)]
pub enum PersistError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Framework(Error),
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "persistent variables I/O: {e}"),
            Self::Json(e) => write!(f, "persistent variables JSON: {e}"),
            Self::Framework(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PersistError {}

impl From<std::io::Error> for PersistError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for PersistError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<Error> for PersistError {
    fn from(e: Error) -> Self {
        Self::Framework(e)
    }
}

type Table = BTreeMap<String, BTreeMap<String, serde_json::Value>>;

#[derive(Debug)]
pub struct PersistentVariables {
    path: PathBuf,
    values: Table,
}

impl PersistentVariables {
    /// Load the file at `path`.  A missing file is logged and treated as
    /// empty, so the first session for an experiment runs with defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Persist: {} does not exist, persistent variables not set",
                    path.display()
                );
                Table::new()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored value of `variable` for `subject`.
    pub fn value(&self, variable: &str, subject: &str) -> Option<Value> {
        self.values
            .get(variable)?
            .get(subject)
            .cloned()
            .and_then(Value::from_json)
    }

    /// Set each of `variables` stored for `subject` on the framework.
    /// Variables with nothing stored keep their defaults.  Returns how many
    /// were restored.
    pub fn restore(
        &self,
        framework: &mut Framework<'_>,
        subject: &str,
        variables: &[&str],
    ) -> Result<usize, PersistError> {
        let mut restored = 0;
        for name in variables {
            match self.value(name, subject) {
                Some(value) => {
                    framework.set_variable(name, value)?;
                    restored += 1;
                }
                None => warn!("Persist: no stored '{}' for subject {}", name, subject),
            }
        }
        Ok(restored)
    }

    /// Read `variables` back from the framework after a run.
    pub fn capture(
        &mut self,
        framework: &Framework<'_>,
        subject: &str,
        variables: &[&str],
    ) -> Result<(), PersistError> {
        for name in variables {
            let value = framework.get_variable(name)?;
            self.values
                .entry((*name).to_owned())
                .or_default()
                .insert(subject.to_owned(), value.to_json());
        }
        Ok(())
    }

    pub fn save(&self) -> Result<(), PersistError> {
        std::fs::write(&self.path, serde_json::to_string_pretty(&self.values)?)?;
        info!("Persist: stored {} variables to {}", self.values.len(), self.path.display());
        Ok(())
    }
}
