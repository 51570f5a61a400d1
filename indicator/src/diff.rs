//! Three-way diff between machine index snapshots.
//!
//! Machines are matched by id only. A machine counts as changed when its
//! state differs between the snapshots; directory or name drift on its own is
//! not reported.

use std::collections::HashMap;

use crate::types::{Machine, MachineIndex};

/// Differences between an old and a new snapshot.
///
/// Each machine id appears in at most one of the three lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexDiff {
    /// Machines present only in the new snapshot, in new-snapshot order.
    pub added: Vec<Machine>,

    /// Machines present only in the old snapshot, in old-snapshot order.
    pub removed: Vec<Machine>,

    /// Machines present in both whose state changed, as recorded in the new
    /// snapshot, in new-snapshot order.
    pub changed: Vec<Machine>,
}

impl IndexDiff {
    /// Returns `true` if nothing was added, removed or changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Total number of reported machines across all three lists.
    #[must_use]
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.changed.len()
    }
}

/// Computes the diff from `old_index` to `new_index`.
#[must_use]
pub fn diff(new_index: &MachineIndex, old_index: &MachineIndex) -> IndexDiff {
    let old_by_id = by_id(old_index);
    let new_by_id = by_id(new_index);

    let mut result = IndexDiff::default();

    for machine in new_index {
        match old_by_id.get(machine.id.as_str()) {
            None => result.added.push(machine.clone()),
            Some(old) if old.state != machine.state => result.changed.push(machine.clone()),
            Some(_) => {}
        }
    }

    result.removed = old_index
        .iter()
        .filter(|machine| !new_by_id.contains_key(machine.id.as_str()))
        .cloned()
        .collect();

    result
}

fn by_id(index: &MachineIndex) -> HashMap<&str, &Machine> {
    index
        .iter()
        .map(|machine| (machine.id.as_str(), machine))
        .collect()
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::types::MachineState;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn arb_state() -> impl Strategy<Value = &'static str> {
        prop_oneof![
            Just("running"),
            Just("poweroff"),
            Just("saved"),
            Just("aborted"),
        ]
    }

    /// Snapshots drawn from a small id pool, so old and new overlap often.
    fn arb_index() -> impl Strategy<Value = MachineIndex> {
        proptest::collection::btree_map(
            0u8..8,
            (arb_state(), prop_oneof![Just("default"), Just("web")]),
            0..8,
        )
        .prop_map(|machines| {
            machines
                .into_iter()
                .map(|(id, (state, name))| {
                    Machine::new(format!("m{id}"), state, format!("/srv/m{id}"), name)
                })
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
        .prop_map(MachineIndex::from)
    }

    fn ids(machines: &[Machine]) -> Vec<&str> {
        machines.iter().map(|m| m.id.as_str()).collect()
    }

    proptest! {
        /// Added is exactly new minus old, in new-snapshot order.
        #[test]
        fn added_is_new_minus_old(old in arb_index(), new in arb_index()) {
            let result = diff(&new, &old);
            let expected: Vec<&str> = new
                .iter()
                .filter(|m| !old.contains(&m.id))
                .map(|m| m.id.as_str())
                .collect();
            prop_assert_eq!(ids(&result.added), expected);
        }

        /// Removed is exactly old minus new, in old-snapshot order.
        #[test]
        fn removed_is_old_minus_new(old in arb_index(), new in arb_index()) {
            let result = diff(&new, &old);
            let expected: Vec<&str> = old
                .iter()
                .filter(|m| !new.contains(&m.id))
                .map(|m| m.id.as_str())
                .collect();
            prop_assert_eq!(ids(&result.removed), expected);
        }

        /// Changed holds exactly the shared ids whose state differs, as
        /// recorded in the new snapshot, in new-snapshot order.
        #[test]
        fn changed_is_shared_ids_with_new_state(old in arb_index(), new in arb_index()) {
            let result = diff(&new, &old);
            let old_states: HashMap<&str, &MachineState> =
                old.iter().map(|m| (m.id.as_str(), &m.state)).collect();
            let expected: Vec<Machine> = new
                .iter()
                .filter(|m| old_states.get(m.id.as_str()).is_some_and(|s| **s != m.state))
                .cloned()
                .collect();
            prop_assert_eq!(result.changed, expected);
        }

        /// No id is reported in more than one list.
        #[test]
        fn lists_are_disjoint(old in arb_index(), new in arb_index()) {
            let result = diff(&new, &old);
            let added: HashSet<&str> = ids(&result.added).into_iter().collect();
            let removed: HashSet<&str> = ids(&result.removed).into_iter().collect();
            let changed: HashSet<&str> = ids(&result.changed).into_iter().collect();

            prop_assert!(added.is_disjoint(&removed));
            prop_assert!(added.is_disjoint(&changed));
            prop_assert!(removed.is_disjoint(&changed));
            prop_assert_eq!(added.len() + removed.len() + changed.len(), result.len());
        }

        /// A snapshot diffed against itself is empty.
        #[test]
        fn identical_snapshots_are_empty(index in arb_index()) {
            prop_assert!(diff(&index, &index).is_empty());
        }
    }
}
