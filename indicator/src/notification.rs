//! Balloon notifications derived from index diffs.

use std::fmt;

use crate::diff::IndexDiff;
use crate::types::Machine;

/// Prefix every notification title carries.
const TITLE_PREFIX: &str = "Vagrant";

/// A desktop notification to show for one machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// What happened, without the `Vagrant - ` prefix.
    pub title: String,

    /// `"<directory> (<name>)"` of the affected machine.
    pub message: String,
}

impl Notification {
    fn for_machine(title: String, machine: &Machine) -> Self {
        Self {
            title,
            message: format!("{} ({})", machine.directory.display(), machine.name),
        }
    }

    /// Title as displayed, e.g. `Vagrant - Machine went running`.
    #[must_use]
    pub fn display_title(&self) -> String {
        format!("{TITLE_PREFIX} - {}", self.title)
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.display_title(), self.message)
    }
}

/// Builds one notification per machine in the diff.
///
/// Order: added, then removed, then changed, each in diff order.
#[must_use]
pub fn notifications_for(diff: &IndexDiff) -> Vec<Notification> {
    let added = diff.added.iter().map(|machine| {
        Notification::for_machine(format!("New machine went {}", machine.state), machine)
    });
    let removed = diff
        .removed
        .iter()
        .map(|machine| Notification::for_machine("Machine destroyed".to_string(), machine));
    let changed = diff.changed.iter().map(|machine| {
        Notification::for_machine(format!("Machine went {}", machine.state), machine)
    });

    added.chain(removed).chain(changed).collect()
}
