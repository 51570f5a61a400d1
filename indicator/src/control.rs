//! Pass-through lifecycle commands for Vagrant machines.
//!
//! Commands run `vagrant <subcommand> <machine-id>` from the machine's
//! Vagrantfile directory. Nothing here tracks machine state; the index
//! watcher picks up whatever Vagrant records afterwards.

use std::fmt;
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::config::Config;
use crate::types::Machine;

/// Errors that can occur while launching commands.
#[derive(Error, Debug)]
pub enum ControlError {
    /// The program could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// No machine with this id is in the index.
    #[error("no machine with id {0} in the machine index")]
    MachineNotFound(String),
}

/// Lifecycle commands the indicator can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachineAction {
    Up,
    Halt,
    Destroy,
}

impl MachineAction {
    /// Vagrant subcommand and flags for this action.
    ///
    /// `destroy` is forced because no terminal is attached to confirm it.
    #[must_use]
    pub fn vagrant_args(self) -> &'static [&'static str] {
        match self {
            Self::Up => &["up"],
            Self::Halt => &["halt"],
            Self::Destroy => &["destroy", "--force"],
        }
    }
}

impl fmt::Display for MachineAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.vagrant_args()[0])
    }
}

/// Launches Vagrant commands and terminals for machines.
#[derive(Debug, Clone)]
pub struct VagrantControl {
    vagrant_bin: String,
    terminal: String,
}

impl VagrantControl {
    #[must_use]
    pub fn new(vagrant_bin: impl Into<String>, terminal: impl Into<String>) -> Self {
        Self {
            vagrant_bin: vagrant_bin.into(),
            terminal: terminal.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.vagrant_bin.clone(), config.terminal.clone())
    }

    /// Builds the command for `action` on `machine` without running it.
    #[must_use]
    pub fn command(&self, action: MachineAction, machine: &Machine) -> Command {
        let mut command = Command::new(&self.vagrant_bin);
        command
            .args(action.vagrant_args())
            .arg(&machine.id)
            .current_dir(&machine.directory)
            .stdin(Stdio::null());
        command
    }

    /// Runs `action` on `machine` and waits for Vagrant to exit.
    ///
    /// A non-zero exit is logged and returned, not treated as an error.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Spawn`] if Vagrant cannot be started.
    pub async fn run(
        &self,
        action: MachineAction,
        machine: &Machine,
    ) -> Result<ExitStatus, ControlError> {
        info!(
            action = %action,
            machine_id = %machine.id,
            directory = %machine.directory.display(),
            "Running vagrant command"
        );

        let status = self
            .command(action, machine)
            .status()
            .await
            .map_err(|source| ControlError::Spawn {
                program: self.vagrant_bin.clone(),
                source,
            })?;

        if !status.success() {
            warn!(
                action = %action,
                machine_id = %machine.id,
                status = %status,
                "vagrant command failed"
            );
        }

        Ok(status)
    }

    /// Builds the command that opens a terminal in the machine's directory.
    #[must_use]
    pub fn terminal_command(&self, machine: &Machine) -> Command {
        let mut command = Command::new(&self.terminal);
        command.current_dir(&machine.directory).stdin(Stdio::null());
        command
    }

    /// Opens a terminal in the machine's directory without waiting for it.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Spawn`] if the terminal cannot be started.
    pub fn open_terminal(&self, machine: &Machine) -> Result<Child, ControlError> {
        info!(
            terminal = %self.terminal,
            directory = %machine.directory.display(),
            "Opening terminal"
        );

        self.terminal_command(machine)
            .spawn()
            .map_err(|source| ControlError::Spawn {
                program: self.terminal.clone(),
                source,
            })
    }
}
