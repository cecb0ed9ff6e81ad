//! Hardware setup store.
//!
//! A setup is one physical rig, identified by the address it is connected
//! on (serial port or similar).  The store is a JSON object keyed by that
//! address:
//!
//! ```text
//! {
//!     "/dev/ttyACM0": {
//!         "name": "box_1",
//!         "unique_id": "e6614103e7696d2a",
//!         "variables": { "hw_lever_pin": 4, "hw_reward_ms": 120 }
//!     }
//! }
//! ```
//!
//! Before a run, every hardware variable a task declares must have a value
//! in the selected setup ([`SetupStore::check_task`]); the values are then
//! pushed into the framework with [`SetupStore::apply`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::events::MachineId;
use crate::scheduler::Framework;
use crate::variables::{Value, HARDWARE_PREFIX};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum SetupError {
    Io(std::io::Error),
    Json(serde_json::Error),
    /// Hardware variable names must carry the `hw_` prefix.
    MissingPrefix(String),
    /// Two setups share a name.
    DuplicateSetup(String),
    UnknownSetup(String),
    UndefinedVariable {
        variable: String,
        setup: String,
        task: String,
    },
    /// Two connected devices reported the same hardware id.
    DuplicateDeviceId {
        id: String,
        first: String,
        second: String,
    },
    /// A device reported an id other than the one saved for its address.
    DeviceIdMismatch {
        address: String,
        expected: String,
        found: String,
    },
    Framework(Error),
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "setup store I/O: {e}"),
            Self::Json(e) => write!(f, "setup store JSON: {e}"),
            Self::MissingPrefix(name) => {
                write!(f, "hardware variable '{name}' must start with '{HARDWARE_PREFIX}'")
            }
            Self::DuplicateSetup(name) => write!(f, "a setup named '{name}' already exists"),
            Self::UnknownSetup(key) => write!(f, "no setup for '{key}'"),
            Self::UndefinedVariable { variable, setup, task } => write!(
                f,
                "\"{variable}\" is not defined in the {setup} setup. Either remove \
                 \"{variable}\" from the {task} task, or add \"{variable}\" as a \
                 variable in the {setup} setup."
            ),
            Self::DuplicateDeviceId { id, first, second } => {
                write!(f, "devices on {first} and {second} share hardware id {id}")
            }
            Self::DeviceIdMismatch { address, expected, found } => write!(
                f,
                "device on {address} reports id {found}, expected {expected}"
            ),
            Self::Framework(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SetupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SetupError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for SetupError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<Error> for SetupError {
    fn from(e: Error) -> Self {
        Self::Framework(e)
    }
}

pub type SetupResult<T> = core::result::Result<T, SetupError>;

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// One rig.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetupRecord {
    pub name: String,
    /// Hardware id saved for the device on this address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Default)]
pub struct SetupStore {
    path: Option<PathBuf>,
    setups: BTreeMap<String, SetupRecord>,
}

impl SetupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the store at `path`.  A missing file is an empty store that
    /// will be created on [`save`](Self::save).
    pub fn load(path: impl AsRef<Path>) -> SetupResult<Self> {
        let path = path.as_ref();
        let mut store = match std::fs::read_to_string(path) {
            Ok(text) => Self::from_json(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Setup: no store at {}, starting empty", path.display());
                Self::new()
            }
            Err(e) => return Err(e.into()),
        };
        store.path = Some(path.to_path_buf());
        Ok(store)
    }

    pub fn from_json(text: &str) -> SetupResult<Self> {
        let setups: BTreeMap<String, SetupRecord> = serde_json::from_str(text)?;
        let store = Self { path: None, setups };
        store.validate()?;
        Ok(store)
    }

    pub fn to_json(&self) -> SetupResult<String> {
        Ok(serde_json::to_string_pretty(&self.setups)?)
    }

    /// Write back to the file the store was loaded from.
    pub fn save(&self) -> SetupResult<()> {
        let Some(path) = &self.path else {
            return Err(SetupError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "setup store has no backing file",
            )));
        };
        std::fs::write(path, self.to_json()?)?;
        info!("Setup: saved {} setups to {}", self.setups.len(), path.display());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.setups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.setups.is_empty()
    }

    pub fn get(&self, address: &str) -> Option<&SetupRecord> {
        self.setups.get(address)
    }

    /// Address of the setup called `name`.
    pub fn address_of(&self, name: &str) -> Option<&str> {
        self.setups
            .iter()
            .find(|(_, s)| s.name == name)
            .map(|(address, _)| address.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SetupRecord)> {
        self.setups.iter().map(|(a, s)| (a.as_str(), s))
    }

    /// Name (or rename) the setup on `address`.
    pub fn add_setup(&mut self, address: &str, name: &str) -> SetupResult<()> {
        if self.address_of(name).is_some_and(|a| a != address) {
            return Err(SetupError::DuplicateSetup(name.to_owned()));
        }
        self.setups.entry(address.to_owned()).or_default().name = name.to_owned();
        Ok(())
    }

    pub fn set_variable(&mut self, address: &str, name: &str, value: &Value) -> SetupResult<()> {
        check_prefix(name)?;
        let setup = self
            .setups
            .get_mut(address)
            .ok_or_else(|| SetupError::UnknownSetup(address.to_owned()))?;
        setup.variables.insert(name.to_owned(), value.to_json());
        Ok(())
    }

    pub fn remove_variable(&mut self, address: &str, name: &str) -> bool {
        self.setups
            .get_mut(address)
            .is_some_and(|s| s.variables.remove(name).is_some())
    }

    /// Every hardware variable `task` uses must be defined for `address`.
    pub fn check_task(&self, address: &str, task: &str, hardware: &[&str]) -> SetupResult<()> {
        let setup = self
            .setups
            .get(address)
            .ok_or_else(|| SetupError::UnknownSetup(address.to_owned()))?;
        for variable in hardware {
            let defined = setup
                .variables
                .get(*variable)
                .is_some_and(|v| !v.is_null());
            if !defined {
                return Err(SetupError::UndefinedVariable {
                    variable: (*variable).to_owned(),
                    setup: setup.name.clone(),
                    task: task.to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Check then set every registered machine's hardware variables from
    /// the setup on `address`.  Returns the number of values applied.
    pub fn apply(&self, address: &str, framework: &mut Framework<'_>) -> SetupResult<usize> {
        let mut assignments = Vec::new();
        for m in 0..framework.machine_count() as MachineId {
            let (Some(task), Some(vars)) = (framework.task_name(m), framework.variables(m)) else {
                continue;
            };
            let hardware: Vec<&str> = vars.hardware_names().collect();
            self.check_task(address, task, &hardware)?;
            assignments.extend(hardware.into_iter().map(str::to_owned));
        }

        let Some(setup) = self.setups.get(address) else {
            return Ok(0);
        };
        for name in &assignments {
            let Some(value) = setup.variables.get(name).cloned().and_then(Value::from_json) else {
                warn!("Setup: '{}' in {} has no usable value", name, setup.name);
                continue;
            };
            framework.set_variable(name, value)?;
        }
        info!("Setup: applied {} hardware variables from {}", assignments.len(), setup.name);
        Ok(assignments.len())
    }

    /// Check the ids reported by connected devices, as `(address, id)`
    /// pairs: no two may match, and each must agree with the id saved for
    /// its address (if one is saved).
    pub fn check_unique_ids(&self, reported: &[(&str, &str)]) -> SetupResult<()> {
        for (i, (address, id)) in reported.iter().enumerate() {
            if let Some((other, _)) = reported[..i].iter().find(|(_, other_id)| other_id == id) {
                return Err(SetupError::DuplicateDeviceId {
                    id: (*id).to_owned(),
                    first: (*other).to_owned(),
                    second: (*address).to_owned(),
                });
            }
            if let Some(expected) = self.setups.get(*address).and_then(|s| s.unique_id.as_deref()) {
                if expected != *id {
                    return Err(SetupError::DeviceIdMismatch {
                        address: (*address).to_owned(),
                        expected: expected.to_owned(),
                        found: (*id).to_owned(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Remember the ids reported by connected devices.
    pub fn save_unique_ids(&mut self, reported: &[(&str, &str)]) {
        for (address, id) in reported {
            self.setups.entry((*address).to_owned()).or_default().unique_id = Some((*id).to_owned());
        }
    }

    fn validate(&self) -> SetupResult<()> {
        let mut names: Vec<&str> = Vec::with_capacity(self.setups.len());
        for setup in self.setups.values() {
            if names.contains(&setup.name.as_str()) {
                return Err(SetupError::DuplicateSetup(setup.name.clone()));
            }
            names.push(&setup.name);
            for variable in setup.variables.keys() {
                check_prefix(variable)?;
            }
        }
        Ok(())
    }
}

fn check_prefix(name: &str) -> SetupResult<()> {
    if name.len() > HARDWARE_PREFIX.len() && name.starts_with(HARDWARE_PREFIX) {
        Ok(())
    } else {
        Err(SetupError::MissingPrefix(name.to_owned()))
    }
}

/// Hardware variables a task's source declares, found by scanning for
/// `hardware_variable("hw_...")` calls.  Sorted, without duplicates.
pub fn source_hardware_variables(source: &str) -> Vec<String> {
    const CALL: &str = "hardware_variable(";
    let mut found = Vec::new();
    let mut rest = source;
    while let Some(at) = rest.find(CALL) {
        rest = &rest[at + CALL.len()..];
        let Some(quoted) = rest.trim_start().strip_prefix('"') else {
            continue;
        };
        let Some(end) = quoted.find('"') else {
            break;
        };
        let name = &quoted[..end];
        if name.starts_with(HARDWARE_PREFIX) && !found.iter().any(|f| f == name) {
            found.push(name.to_owned());
        }
    }
    found.sort();
    found
}
