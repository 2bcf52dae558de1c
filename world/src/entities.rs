//! Authoritative entity arena.

use std::{collections::BTreeMap, time::Duration};

use nightfall_core::{EntityId, SpawnError, SpawnPoint, TemplateId};

/// State of an entity stored inside the world.
#[derive(Clone, Debug)]
pub(crate) struct EntityState {
    /// Identifier allocated by the world for the entity.
    pub(crate) id: EntityId,
    /// Template the entity was instantiated from.
    pub(crate) template: TemplateId,
    /// Spawn point the entity was created at.
    pub(crate) point: SpawnPoint,
    /// Simulation time at which the entity was created.
    pub(crate) spawned_at: Duration,
    /// Simulation time at which the defenders remove the entity.
    pub(crate) expires_at: Option<Duration>,
    /// Whether the entity still participates in the simulation.
    pub(crate) active: bool,
}

/// Arena that stores entities and manages identifier allocation.
#[derive(Debug)]
pub(crate) struct EntityArena {
    entries: BTreeMap<EntityId, EntityState>,
    next_entity_id: Option<EntityId>,
}

impl EntityArena {
    /// Creates an empty arena with a reset identifier counter.
    pub(crate) fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_entity_id: Some(EntityId::new(0)),
        }
    }

    /// Stores a new active entity and returns its identifier.
    ///
    /// Identifiers are never reused, so late signals about a released entity
    /// can never be confused with a newer one.
    pub(crate) fn allocate(
        &mut self,
        template: TemplateId,
        point: SpawnPoint,
        spawned_at: Duration,
        lifetime: Option<Duration>,
    ) -> Result<EntityId, SpawnError> {
        let id = self.next_entity_id.ok_or(SpawnError::ArenaExhausted)?;
        self.next_entity_id = id.get().checked_add(1).map(EntityId::new);

        let state = EntityState {
            id,
            template,
            point,
            spawned_at,
            expires_at: lifetime.map(|lifetime| spawned_at.saturating_add(lifetime)),
            active: true,
        };
        let _ = self.entries.insert(id, state);
        Ok(id)
    }

    /// Marks the entity inactive, returning whether it was active before.
    pub(crate) fn deactivate(&mut self, id: EntityId) -> bool {
        match self.entries.get_mut(&id) {
            Some(state) if state.active => {
                state.active = false;
                true
            }
            _ => false,
        }
    }

    /// Releases the entity from the arena.
    pub(crate) fn remove(&mut self, id: EntityId) -> Option<EntityState> {
        self.entries.remove(&id)
    }

    /// Active entities whose lifetime ended at or before `now`, in identifier order.
    pub(crate) fn expired(&self, now: Duration) -> Vec<EntityId> {
        self.entries
            .values()
            .filter(|state| state.active && state.expires_at.is_some_and(|at| at <= now))
            .map(|state| state.id)
            .collect()
    }

    /// Entities that were deactivated and are still waiting to be released.
    pub(crate) fn inactive(&self) -> Vec<EntityId> {
        self.entries
            .values()
            .filter(|state| !state.active)
            .map(|state| state.id)
            .collect()
    }

    /// Looks up a stored entity.
    pub(crate) fn get(&self, id: EntityId) -> Option<&EntityState> {
        self.entries.get(&id)
    }

    /// Iterator over stored entities in identifier order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &EntityState> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: SpawnPoint = SpawnPoint::new(0.0, 0.0, 0.0);

    #[test]
    fn arena_starts_empty_with_zero_identifier() {
        let arena = EntityArena::new();
        assert_eq!(arena.iter().count(), 0);
        assert_eq!(arena.next_entity_id, Some(EntityId::new(0)));
    }

    #[test]
    fn identifiers_are_never_reused() {
        let mut arena = EntityArena::new();
        let first = arena
            .allocate(TemplateId::new(1), ORIGIN, Duration::ZERO, None)
            .expect("allocates");
        assert!(arena.remove(first).is_some());
        let second = arena
            .allocate(TemplateId::new(1), ORIGIN, Duration::ZERO, None)
            .expect("allocates");

        assert_ne!(first, second);
    }

    #[test]
    fn exhausted_arena_reports_error() {
        let mut arena = EntityArena::new();
        arena.next_entity_id = Some(EntityId::new(u32::MAX));

        let last = arena.allocate(TemplateId::new(1), ORIGIN, Duration::ZERO, None);
        assert_eq!(last, Ok(EntityId::new(u32::MAX)));
        assert_eq!(
            arena.allocate(TemplateId::new(1), ORIGIN, Duration::ZERO, None),
            Err(SpawnError::ArenaExhausted)
        );
    }

    #[test]
    fn expiry_ignores_inactive_and_immortal_entities() {
        let mut arena = EntityArena::new();
        let mortal = arena
            .allocate(
                TemplateId::new(1),
                ORIGIN,
                Duration::ZERO,
                Some(Duration::from_secs(1)),
            )
            .expect("allocates");
        let _immortal = arena
            .allocate(TemplateId::new(2), ORIGIN, Duration::ZERO, None)
            .expect("allocates");
        let parked = arena
            .allocate(
                TemplateId::new(1),
                ORIGIN,
                Duration::ZERO,
                Some(Duration::from_millis(500)),
            )
            .expect("allocates");
        assert!(arena.deactivate(parked));
        assert!(!arena.deactivate(parked));

        assert!(arena.expired(Duration::from_millis(999)).is_empty());
        assert_eq!(arena.expired(Duration::from_secs(1)), vec![mortal]);
        assert!(arena.get(parked).is_some_and(|state| !state.active));
        assert_eq!(arena.inactive(), vec![parked]);
    }
}
