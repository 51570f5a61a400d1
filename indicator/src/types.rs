//! Machine records and index snapshots.
//!
//! A [`MachineIndex`] is one immutable read of Vagrant's machine index. It is
//! never mutated after construction: every read of the index file produces a
//! fresh snapshot, and diffing always compares two independent snapshots.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// State string Vagrant writes for a running machine.
const STATE_RUNNING: &str = "running";

/// State string Vagrant writes for a stopped machine.
const STATE_POWEROFF: &str = "poweroff";

/// Lifecycle state of a machine as recorded in the index.
///
/// Vagrant providers report many states (`saved`, `aborted`, `not_created`,
/// ...). Only the two the indicator acts on get their own variant; everything
/// else is preserved verbatim in [`MachineState::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MachineState {
    Running,
    Poweroff,
    Other(String),
}

impl MachineState {
    /// Returns the state exactly as Vagrant spells it.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Running => STATE_RUNNING,
            Self::Poweroff => STATE_POWEROFF,
            Self::Other(state) => state,
        }
    }
}

impl From<String> for MachineState {
    fn from(state: String) -> Self {
        match state.as_str() {
            STATE_RUNNING => Self::Running,
            STATE_POWEROFF => Self::Poweroff,
            _ => Self::Other(state),
        }
    }
}

impl From<&str> for MachineState {
    fn from(state: &str) -> Self {
        Self::from(state.to_string())
    }
}

impl From<MachineState> for String {
    fn from(state: MachineState) -> Self {
        match state {
            MachineState::Other(state) => state,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single Vagrant machine as recorded in the index.
///
/// Field equality (`==`) compares every field. Machine *identity* is decided
/// by [`Machine::same_machine`], which only looks at the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    /// Stable identifier assigned by Vagrant.
    pub id: String,

    /// Last state Vagrant recorded for the machine.
    pub state: MachineState,

    /// Directory holding the machine's Vagrantfile.
    pub directory: PathBuf,

    /// Machine name within its Vagrantfile (`default` for single-machine setups).
    pub name: String,
}

impl Machine {
    /// Creates a machine record.
    pub fn new(
        id: impl Into<String>,
        state: impl Into<MachineState>,
        directory: impl Into<PathBuf>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            state: state.into(),
            directory: directory.into(),
            name: name.into(),
        }
    }

    /// Returns `true` if both records describe the same machine.
    ///
    /// Only the id is compared; state, directory and name may differ.
    #[must_use]
    pub fn same_machine(&self, other: &Machine) -> bool {
        self.id == other.id
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == MachineState::Running
    }

    #[must_use]
    pub fn is_poweroff(&self) -> bool {
        self.state == MachineState::Poweroff
    }

    /// Returns the Vagrantfile directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl fmt::Display for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id={} state={} directory={} name={}",
            self.id,
            self.state,
            self.directory.display(),
            self.name
        )
    }
}

/// One snapshot of the machine index.
///
/// Machines keep the order in which the index file lists them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineIndex {
    machines: Vec<Machine>,
}

impl MachineIndex {
    /// Creates a snapshot from machines in index order.
    #[must_use]
    pub fn new(machines: Vec<Machine>) -> Self {
        Self { machines }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.machines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Machine> {
        self.machines.iter()
    }

    /// Looks up a machine by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Machine> {
        self.machines.iter().find(|machine| machine.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Machine] {
        &self.machines
    }
}

impl From<Vec<Machine>> for MachineIndex {
    fn from(machines: Vec<Machine>) -> Self {
        Self::new(machines)
    }
}

impl FromIterator<Machine> for MachineIndex {
    fn from_iter<I: IntoIterator<Item = Machine>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for MachineIndex {
    type Item = Machine;
    type IntoIter = std::vec::IntoIter<Machine>;

    fn into_iter(self) -> Self::IntoIter {
        self.machines.into_iter()
    }
}

impl<'a> IntoIterator for &'a MachineIndex {
    type Item = &'a Machine;
    type IntoIter = std::slice::Iter<'a, Machine>;

    fn into_iter(self) -> Self::IntoIter {
        self.machines.iter()
    }
}
