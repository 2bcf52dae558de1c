#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative count of the entities an encounter has spawned.
//!
//! The simulation may report the end of an entity's life more than once: a
//! pooled entity is first deactivated and later destroyed, and both lifecycle
//! hooks notify the tracker. The first signal consumes the entity's handle, so
//! the live count is decremented exactly once per entity no matter how many
//! removal signals arrive or in which order.

use std::collections::BTreeSet;

use nightfall_core::EntityId;
use tracing::debug;

/// Tracks live entities and absorbs duplicate removal signals.
#[derive(Debug, Default)]
pub struct PopulationTracker {
    tracked: BTreeSet<EntityId>,
    alive: u32,
}

impl PopulationTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `entity`. Registering an already tracked entity is a no-op.
    pub fn register(&mut self, entity: EntityId) {
        if !self.tracked.insert(entity) {
            debug!(entity = entity.get(), "entity already tracked");
            return;
        }
        self.alive = self.alive.saturating_add(1);
    }

    /// Accounts for the removal of `entity`.
    ///
    /// Returns `true` only for the call that actually decremented the live count.
    /// Untracked entities and repeated signals are ignored.
    pub fn notify_removed(&mut self, entity: EntityId) -> bool {
        if !self.tracked.remove(&entity) {
            return false;
        }

        self.alive = self.alive.saturating_sub(1);
        debug!(entity = entity.get(), alive = self.alive, "entity removed");
        true
    }

    /// Detaches every tracked entity and resets the live count to zero.
    ///
    /// The entities themselves are left untouched; the detached identifiers are
    /// returned in ascending order so the caller can deactivate them.
    #[must_use = "detached entities are still alive in the simulation"]
    pub fn clear(&mut self) -> Vec<EntityId> {
        let detached: Vec<EntityId> = std::mem::take(&mut self.tracked).into_iter().collect();
        self.alive = 0;
        detached
    }

    /// Number of tracked entities that have not been reported removed.
    #[must_use]
    pub const fn alive_count(&self) -> u32 {
        self.alive
    }

    /// Reports whether no entity is currently tracked.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.alive == 0
    }

    /// Reports whether `entity` is currently tracked.
    #[must_use]
    pub fn is_tracked(&self, entity: EntityId) -> bool {
        self.tracked.contains(&entity)
    }

    /// Iterator over tracked entities in ascending identifier order.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.tracked.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(value: u32) -> EntityId {
        EntityId::new(value)
    }

    #[test]
    fn register_counts_each_entity_once() {
        let mut tracker = PopulationTracker::new();
        tracker.register(id(1));
        tracker.register(id(2));
        tracker.register(id(1));

        assert_eq!(tracker.alive_count(), 2);
        assert!(tracker.is_tracked(id(1)));
        assert!(tracker.is_tracked(id(2)));
    }

    #[test]
    fn duplicate_removal_decrements_once() {
        let mut tracker = PopulationTracker::new();
        tracker.register(id(7));
        tracker.register(id(8));

        assert!(tracker.notify_removed(id(7)), "first signal decrements");
        assert!(!tracker.notify_removed(id(7)), "second signal is absorbed");
        assert_eq!(tracker.alive_count(), 1);
        assert!(!tracker.is_tracked(id(7)));
        assert!(tracker.is_tracked(id(8)));
    }

    #[test]
    fn destroy_after_deactivate_never_goes_below_zero() {
        let mut tracker = PopulationTracker::new();
        tracker.register(id(4));

        let signals = [id(4), id(4), id(4)];
        let decrements = signals
            .into_iter()
            .filter(|entity| tracker.notify_removed(*entity))
            .count();

        assert_eq!(decrements, 1);
        assert_eq!(tracker.alive_count(), 0);
        assert!(tracker.is_empty());

        tracker.register(id(4));
        assert_eq!(tracker.alive_count(), 1, "a consumed handle can be tracked again");
    }

    #[test]
    fn untracked_removal_is_ignored() {
        let mut tracker = PopulationTracker::new();
        assert!(!tracker.notify_removed(id(3)));
        assert_eq!(tracker.alive_count(), 0);
        assert!(tracker.is_empty());
    }

    #[test]
    fn clear_detaches_everything() {
        let mut tracker = PopulationTracker::new();
        for value in [5, 1, 3] {
            tracker.register(id(value));
        }

        let detached = tracker.clear();

        assert_eq!(detached, vec![id(1), id(3), id(5)]);
        assert_eq!(tracker.alive_count(), 0);
        assert!(!tracker.notify_removed(id(3)), "late signals are no-ops");
        assert_eq!(tracker.iter().count(), 0);
    }

    proptest! {
        #[test]
        fn alive_matches_distinct_unremoved_entities(
            registered in proptest::collection::vec(0u32..32, 0..64),
            removed in proptest::collection::vec(0u32..32, 0..96),
        ) {
            let mut tracker = PopulationTracker::new();
            for value in &registered {
                tracker.register(id(*value));
            }

            let mut decrements = 0u32;
            for value in &removed {
                if tracker.notify_removed(id(*value)) {
                    decrements += 1;
                }
            }

            let mut expected: Vec<u32> = registered.clone();
            expected.sort_unstable();
            expected.dedup();
            let distinct = expected.len() as u32;
            let survivors = expected.iter().filter(|value| !removed.contains(value)).count() as u32;

            prop_assert_eq!(tracker.alive_count(), survivors);
            prop_assert_eq!(decrements, distinct - survivors);
            prop_assert_eq!(tracker.iter().count() as u32, survivors);
        }
    }
}
