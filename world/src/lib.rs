#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative simulation state standing in for the game world.
//!
//! The world owns every spawned entity. Entities created from a template with
//! a lifetime are removed by the defenders once that lifetime elapses; the
//! removal is reported the way a pooled game object reports it, first as a
//! deactivation and then as a destruction, so downstream bookkeeping receives
//! two removal signals for the same entity. Entities deactivated by command
//! are released on the following tick.

use std::{collections::BTreeMap, time::Duration};

use nightfall_core::{Command, EntityId, Event, SpawnError, SpawnPoint, Spawner, TemplateId};
use tracing::{debug, trace};

mod entities;

use entities::EntityArena;

/// Represents the authoritative world state.
#[derive(Debug)]
pub struct World {
    clock: Duration,
    tick_index: u64,
    templates: BTreeMap<TemplateId, TemplateState>,
    entities: EntityArena,
}

#[derive(Clone, Copy, Debug)]
struct TemplateState {
    lifetime: Option<Duration>,
}

impl World {
    /// Creates an empty world with no registered templates.
    #[must_use]
    pub fn new() -> Self {
        Self {
            clock: Duration::ZERO,
            tick_index: 0,
            templates: BTreeMap::new(),
            entities: EntityArena::new(),
        }
    }

    fn remove_entity(&mut self, entity: EntityId, out_events: &mut Vec<Event>) {
        let Some(state) = self.entities.remove(entity) else {
            return;
        };
        if state.active {
            out_events.push(Event::EntityDeactivated { entity });
        }
        out_events.push(Event::EntityDestroyed { entity });
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl Spawner for World {
    fn spawn(&mut self, template: TemplateId, point: SpawnPoint) -> Result<EntityId, SpawnError> {
        let Some(state) = self.templates.get(&template).copied() else {
            return Err(SpawnError::MissingTemplate(template));
        };

        let entity = self
            .entities
            .allocate(template, point, self.clock, state.lifetime)?;
        trace!(
            entity = entity.get(),
            template = template.get(),
            x = point.x(),
            y = point.y(),
            "entity instantiated"
        );
        Ok(entity)
    }
}

/// Applies the provided command to the world, mutating state deterministically.
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::Tick { dt } => {
            world.tick_index = world.tick_index.saturating_add(1);
            world.clock = world.clock.saturating_add(dt);
            out_events.push(Event::TimeAdvanced { dt });

            for entity in world.entities.inactive() {
                world.remove_entity(entity, out_events);
            }
            for entity in world.entities.expired(world.clock) {
                if world.entities.deactivate(entity) {
                    out_events.push(Event::EntityDeactivated { entity });
                }
                world.remove_entity(entity, out_events);
            }
        }
        Command::RegisterTemplate { template, lifetime } => {
            let previous = world
                .templates
                .insert(template, TemplateState { lifetime });
            if previous.is_some() {
                debug!(template = template.get(), "template re-registered");
            }
        }
        Command::DeactivateEntity { entity } => {
            if world.entities.deactivate(entity) {
                out_events.push(Event::EntityDeactivated { entity });
            }
        }
        Command::DestroyEntity { entity } => {
            world.remove_entity(entity, out_events);
        }
        Command::DeclareRoundLost => {
            out_events.push(Event::RoundLost);
        }
    }
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use std::time::Duration;

    use super::World;
    use nightfall_core::{EntityId, SpawnPoint, TemplateId};

    /// Simulation time accumulated through ticks.
    #[must_use]
    pub fn clock(world: &World) -> Duration {
        world.clock
    }

    /// Number of ticks applied so far.
    #[must_use]
    pub fn tick_index(world: &World) -> u64 {
        world.tick_index
    }

    /// Reports whether the template handle can be instantiated.
    #[must_use]
    pub fn template_registered(world: &World, template: TemplateId) -> bool {
        world.templates.contains_key(&template)
    }

    /// Number of entities that are still active.
    #[must_use]
    pub fn active_count(world: &World) -> usize {
        world.entities.iter().filter(|state| state.active).count()
    }

    /// Captures a snapshot of a single entity.
    #[must_use]
    pub fn entity(world: &World, entity: EntityId) -> Option<EntitySnapshot> {
        world.entities.get(entity).map(EntitySnapshot::from_state)
    }

    /// Captures a read-only view of every entity stored in the arena.
    #[must_use]
    pub fn entity_view(world: &World) -> EntityView {
        let snapshots = world
            .entities
            .iter()
            .map(EntitySnapshot::from_state)
            .collect();
        EntityView { snapshots }
    }

    /// Read-only snapshot describing all stored entities.
    #[derive(Clone, Debug, Default)]
    pub struct EntityView {
        snapshots: Vec<EntitySnapshot>,
    }

    impl EntityView {
        /// Iterator over the captured snapshots in identifier order.
        pub fn iter(&self) -> impl Iterator<Item = &EntitySnapshot> {
            self.snapshots.iter()
        }

        /// Consumes the view, yielding the underlying snapshots.
        #[must_use]
        pub fn into_vec(self) -> Vec<EntitySnapshot> {
            self.snapshots
        }
    }

    /// Immutable representation of a single entity used for queries.
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub struct EntitySnapshot {
        /// Identifier allocated by the world.
        pub id: EntityId,
        /// Template the entity was created from.
        pub template: TemplateId,
        /// Spawn point the entity was created at.
        pub point: SpawnPoint,
        /// Simulation time at which the entity was created.
        pub spawned_at: Duration,
        /// Whether the entity is still active.
        pub active: bool,
    }

    impl EntitySnapshot {
        fn from_state(state: &super::entities::EntityState) -> Self {
            Self {
                id: state.id,
                template: state.template,
                point: state.point,
                spawned_at: state.spawned_at,
                active: state.active,
            }
        }
    }
}
