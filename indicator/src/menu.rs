//! Toolkit-independent model of the indicator menu.
//!
//! The renderer turns each [`MenuEntry`] into a menu item with a submenu of
//! its actions and appends its own "Quit" item at the bottom.

use std::fmt;

use crate::control::MachineAction;
use crate::types::{Machine, MachineIndex};

/// Something the user can do with a machine from its submenu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MenuAction {
    OpenTerminal,
    Up,
    Halt,
    Destroy,
}

impl MenuAction {
    /// Label shown in the submenu.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::OpenTerminal => "Open terminal...",
            Self::Up => "Up",
            Self::Halt => "Halt",
            Self::Destroy => "Destroy",
        }
    }

    /// The Vagrant command behind this action, if it runs one.
    #[must_use]
    pub fn machine_action(self) -> Option<MachineAction> {
        match self {
            Self::OpenTerminal => None,
            Self::Up => Some(MachineAction::Up),
            Self::Halt => Some(MachineAction::Halt),
            Self::Destroy => Some(MachineAction::Destroy),
        }
    }
}

impl fmt::Display for MenuAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One machine's item in the indicator menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    pub machine_id: String,

    /// `"<directory> (<name>) - <state>"`.
    pub label: String,

    /// Icon key; the machine state, resolved to an image by the renderer.
    pub icon: String,

    /// Submenu actions in display order.
    pub actions: Vec<MenuAction>,
}

impl MenuEntry {
    /// Builds the entry for one machine.
    #[must_use]
    pub fn for_machine(machine: &Machine) -> Self {
        let mut actions = vec![MenuAction::OpenTerminal];
        if machine.is_poweroff() {
            actions.push(MenuAction::Up);
        }
        if machine.is_running() {
            actions.push(MenuAction::Halt);
        }
        actions.push(MenuAction::Destroy);

        Self {
            machine_id: machine.id.clone(),
            label: format!(
                "{} ({}) - {}",
                machine.directory.display(),
                machine.name,
                machine.state
            ),
            icon: machine.state.to_string(),
            actions,
        }
    }
}

/// Builds the menu for a snapshot, one entry per machine in index order.
#[must_use]
pub fn build_menu(index: &MachineIndex) -> Vec<MenuEntry> {
    index.iter().map(MenuEntry::for_machine).collect()
}
