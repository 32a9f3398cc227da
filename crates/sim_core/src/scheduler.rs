//! Work-class scheduler: advance-list partition and cadence decisions.
//!
//! Every live, animated item belongs to exactly one advance list at any
//! quiescent point between ticks. Membership changes requested while a tick
//! is in flight are buffered and applied in a single flush after the pass,
//! so a list being iterated is never mutated under the iterator and an item
//! is processed exactly once per scheduled tick.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::config::SchedulerConfig;
use crate::item::{ItemId, WorkClass};

/// Partition of animated items into per-category advance lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scheduler {
    lists: BTreeMap<WorkClass, Vec<ItemId>>,
    /// Which list each item currently sits in.
    membership: HashMap<ItemId, WorkClass>,
    /// Items with a buffered category change.
    pending: BTreeSet<ItemId>,
    /// Cadence table.
    pub config: SchedulerConfig,
}

impl Scheduler {
    /// Create an empty scheduler with the given cadence table.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            lists: BTreeMap::new(),
            membership: HashMap::new(),
            pending: BTreeSet::new(),
            config,
        }
    }

    /// Insert an item into the list for `class`. No-op if already there.
    pub fn add(&mut self, id: ItemId, class: WorkClass) {
        if let Some(current) = self.membership.get(&id) {
            if *current == class {
                return;
            }
            self.detach(id);
        }
        self.lists.entry(class).or_default().push(id);
        self.membership.insert(id, class);
    }

    /// Insert an item into the distinguished default list.
    pub fn add_to_default(&mut self, id: ItemId) {
        self.add(id, WorkClass::Default);
    }

    /// Buffer a category change for `id`. The move happens at the
    /// end-of-tick flush, keyed on the item's work value at that point.
    pub fn request_change(&mut self, id: ItemId) {
        self.pending.insert(id);
    }

    /// Immediately remove an item from every list. Used before destruction.
    pub fn remove_from_all(&mut self, id: ItemId) {
        self.detach(id);
        self.pending.remove(&id);
    }

    fn detach(&mut self, id: ItemId) {
        if let Some(class) = self.membership.remove(&id) {
            if let Some(list) = self.lists.get_mut(&class) {
                list.retain(|&other| other != id);
            }
        }
    }

    /// The category an item is currently filed under.
    #[must_use]
    pub fn class_of(&self, id: ItemId) -> Option<WorkClass> {
        self.membership.get(&id).copied()
    }

    /// Categories with at least one member, in deterministic order.
    #[must_use]
    pub fn classes(&self) -> Vec<WorkClass> {
        self.lists
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(class, _)| *class)
            .collect()
    }

    /// Snapshot of a category's members. Cloned so the caller can advance
    /// items (and mutate membership through the pending buffer) while
    /// iterating.
    #[must_use]
    pub fn members(&self, class: WorkClass) -> Vec<ItemId> {
        self.lists.get(&class).cloned().unwrap_or_default()
    }

    /// Whether `class` is scheduled to run on `tick`.
    #[must_use]
    pub fn runs_on(&self, class: WorkClass, tick: u64) -> bool {
        self.config.runs_on(class, tick)
    }

    /// Apply buffered category changes.
    ///
    /// `current_class` is consulted fresh for every pending item; items that
    /// have vanished (`None`) are simply dropped from the partition.
    pub fn flush_changes<F>(&mut self, current_class: F)
    where
        F: Fn(ItemId) -> Option<WorkClass>,
    {
        for id in std::mem::take(&mut self.pending) {
            self.detach(id);
            if let Some(class) = current_class(id) {
                self.lists.entry(class).or_default().push(id);
                self.membership.insert(id, class);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Work;

    #[test]
    fn test_membership_is_exclusive() {
        let mut scheduler = Scheduler::new(SchedulerConfig::default());
        scheduler.add(1, WorkClass::Unit(Work::Idle));
        scheduler.add(1, WorkClass::Unit(Work::Move));

        assert_eq!(scheduler.class_of(1), Some(WorkClass::Unit(Work::Move)));
        assert!(scheduler.members(WorkClass::Unit(Work::Idle)).is_empty());
        assert_eq!(scheduler.members(WorkClass::Unit(Work::Move)), vec![1]);
    }

    #[test]
    fn test_change_is_buffered_until_flush() {
        let mut scheduler = Scheduler::new(SchedulerConfig::default());
        scheduler.add(1, WorkClass::Unit(Work::Idle));
        scheduler.request_change(1);

        // Still filed under the old category until the flush.
        assert_eq!(scheduler.members(WorkClass::Unit(Work::Idle)), vec![1]);

        scheduler.flush_changes(|_| Some(WorkClass::Unit(Work::Attack)));
        assert!(scheduler.members(WorkClass::Unit(Work::Idle)).is_empty());
        assert_eq!(scheduler.members(WorkClass::Unit(Work::Attack)), vec![1]);
    }

    #[test]
    fn test_flush_drops_vanished_items() {
        let mut scheduler = Scheduler::new(SchedulerConfig::default());
        scheduler.add(9, WorkClass::Default);
        scheduler.request_change(9);
        scheduler.flush_changes(|_| None);

        assert_eq!(scheduler.class_of(9), None);
        assert!(scheduler.members(WorkClass::Default).is_empty());
    }

    #[test]
    fn test_remove_from_all_is_immediate() {
        let mut scheduler = Scheduler::new(SchedulerConfig::default());
        scheduler.add(4, WorkClass::Unit(Work::Attack));
        scheduler.request_change(4);
        scheduler.remove_from_all(4);

        assert_eq!(scheduler.class_of(4), None);
        // The buffered change died with the membership.
        scheduler.flush_changes(|_| Some(WorkClass::Default));
        assert!(scheduler.members(WorkClass::Default).is_empty());
    }

    #[test]
    fn test_classes_skip_empty_lists() {
        let mut scheduler = Scheduler::new(SchedulerConfig::default());
        scheduler.add(1, WorkClass::Default);
        scheduler.add(2, WorkClass::Unit(Work::Move));
        scheduler.remove_from_all(1);

        assert_eq!(scheduler.classes(), vec![WorkClass::Unit(Work::Move)]);
    }
}
