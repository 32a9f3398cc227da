//! Item registry: the single source of truth for "does this item exist".
//!
//! The registry is the only component that mints IDs and the only one that
//! performs final destruction. Removal is two-stage: `remove` drops the item
//! from every index immediately and marks it doomed, while the memory stays
//! put until `flush_removals` runs at a tick boundary. Any iterator holding
//! a stale ID simply gets `None` from `get` and no-ops.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::item::{Item, ItemId, INVALID_ITEM};

/// Owner of all live simulation items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRegistry {
    items: HashMap<ItemId, Item>,
    /// Next ID to assign; persisted so loaded games keep minting fresh IDs.
    next_id: ItemId,
    /// Removed from all indexes, memory not yet reclaimed.
    doomed: BTreeSet<ItemId>,
    /// Destroyed units kept as wreckage.
    destroyed: BTreeSet<ItemId>,
}

impl Default for ItemRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemRegistry {
    /// Create an empty registry. The first assigned ID is 1; 0 stays the
    /// invalid sentinel forever.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: HashMap::new(),
            next_id: INVALID_ITEM + 1,
            doomed: BTreeSet::new(),
            destroyed: BTreeSet::new(),
        }
    }

    /// Register an item, assigning the next unused ID.
    pub fn insert(&mut self, mut item: Item) -> ItemId {
        let id = self.next_id;
        self.next_id += 1;
        item.id = id;
        self.items.insert(id, item);
        id
    }

    /// Look up a live item. Doomed items are already gone from the
    /// caller's point of view.
    #[must_use]
    pub fn get(&self, id: ItemId) -> Option<&Item> {
        if self.doomed.contains(&id) {
            return None;
        }
        self.items.get(&id)
    }

    /// Mutable lookup of a live item.
    pub fn get_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        if self.doomed.contains(&id) {
            return None;
        }
        self.items.get_mut(&id)
    }

    /// Whether an item is live.
    #[must_use]
    pub fn contains(&self, id: ItemId) -> bool {
        !self.doomed.contains(&id) && self.items.contains_key(&id)
    }

    /// Number of live items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len() - self.doomed.len()
    }

    /// Whether no live items exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live item IDs in ascending order, for deterministic iteration.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<ItemId> {
        let mut ids: Vec<_> = self
            .items
            .keys()
            .copied()
            .filter(|id| !self.doomed.contains(id))
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Stage an item for deletion. The slot is reclaimed by the next
    /// [`flush_removals`](Self::flush_removals); until then lookups return
    /// `None`.
    pub fn remove(&mut self, id: ItemId) {
        if self.items.contains_key(&id) {
            self.destroyed.remove(&id);
            self.doomed.insert(id);
        } else {
            tracing::error!(id, "remove called for an unknown item");
        }
    }

    /// Reclaim doomed slots. Must only run between ticks, never from inside
    /// an advance pass.
    pub fn flush_removals(&mut self) -> usize {
        let count = self.doomed.len();
        for id in std::mem::take(&mut self.doomed) {
            self.items.remove(&id);
        }
        count
    }

    /// Move a unit into the destroyed/wreckage set.
    pub fn mark_destroyed(&mut self, id: ItemId) {
        self.destroyed.insert(id);
    }

    /// Whether a unit sits in the destroyed set.
    #[must_use]
    pub fn is_destroyed(&self, id: ItemId) -> bool {
        self.destroyed.contains(&id)
    }

    /// Destroyed unit IDs in ascending order.
    #[must_use]
    pub fn destroyed_ids(&self) -> Vec<ItemId> {
        self.destroyed
            .iter()
            .copied()
            .filter(|id| !self.doomed.contains(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ballistics::{Shot, ShotKind};
    use crate::item::{Body, NEUTRAL_PLAYER};
    use crate::math::{Fixed, Vec3Fixed};

    fn test_item() -> Item {
        Item {
            id: INVALID_ITEM,
            owner: NEUTRAL_PLAYER,
            pos: Vec3Fixed::ZERO,
            velocity: Vec3Fixed::ZERO,
            rotation: Fixed::ZERO,
            body: Body::Shot(Shot::new(
                ShotKind::Explosion { remaining: 1 },
                0,
                Fixed::ZERO,
                Fixed::ZERO,
            )),
        }
    }

    #[test]
    fn test_ids_are_monotonic_and_never_zero() {
        let mut registry = ItemRegistry::new();
        let a = registry.insert(test_item());
        let b = registry.insert(test_item());
        assert_eq!(a, 1);
        assert_eq!(b, 2);

        // Removing an item never frees its ID for reuse.
        registry.remove(a);
        registry.flush_removals();
        let c = registry.insert(test_item());
        assert_eq!(c, 3);
    }

    #[test]
    fn test_deferred_removal() {
        let mut registry = ItemRegistry::new();
        let id = registry.insert(test_item());

        registry.remove(id);
        // Gone from the caller's view immediately...
        assert!(registry.get(id).is_none());
        assert!(!registry.contains(id));
        assert_eq!(registry.len(), 0);
        assert!(!registry.sorted_ids().contains(&id));

        // ...memory reclaimed only at the flush.
        assert_eq!(registry.flush_removals(), 1);
        assert_eq!(registry.flush_removals(), 0);
    }

    #[test]
    fn test_destroyed_set_membership() {
        let mut registry = ItemRegistry::new();
        let id = registry.insert(test_item());
        registry.mark_destroyed(id);
        assert!(registry.is_destroyed(id));
        assert_eq!(registry.destroyed_ids(), vec![id]);

        // Removal takes the wreck out of the destroyed set too.
        registry.remove(id);
        assert!(!registry.is_destroyed(id));
        assert!(registry.destroyed_ids().is_empty());
    }
}
