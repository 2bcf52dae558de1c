#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Nightfall encounter engine.
//!
//! This crate defines the message surface that connects adapters, the
//! authoritative world, and pure systems. Adapters submit [`Command`] values
//! describing desired mutations, the world executes those commands via its
//! `apply` entry point, and then broadcasts [`Event`] values for systems to
//! react to deterministically. Systems consume event streams, query immutable
//! snapshots, and respond with new command or event batches.
//!
//! Spawning is the one synchronous seam: the wave scheduler creates entities
//! through the [`Spawner`] trait so that every successful spawn is registered
//! with the population tracker before the scheduler takes its next decision.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod plan;

pub use plan::{EncounterPlan, NightBucket, NightPresetSet, SpawnStream, Wave};

/// Population ceiling applied when a wave carries no override.
pub const DEFAULT_MAX_ALIVE: u32 = 35;

/// Initial offset applied per stream index so streams never fire on the same tick.
pub const DEFAULT_STREAM_STAGGER: Duration = Duration::from_millis(150);

/// Longest time a wave waits for its cleanup target before the next wave begins.
pub const DEFAULT_CLEANUP_GRACE: Duration = Duration::from_secs(12);

/// Shortest permissible gap between two spawns of the same stream.
pub const MIN_STREAM_INTERVAL: Duration = Duration::from_millis(20);

/// Commands that express all permissible world mutations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Advances the simulation clock by the provided delta time.
    Tick {
        /// Duration of simulated time that elapsed since the previous tick.
        dt: Duration,
    },
    /// Registers an entity template that spawners may instantiate.
    RegisterTemplate {
        /// Handle under which the template becomes available.
        template: TemplateId,
        /// Time the defenders need to remove an instance, if they ever do.
        lifetime: Option<Duration>,
    },
    /// Requests that a live entity be deactivated without being destroyed.
    DeactivateEntity {
        /// Identifier of the entity to deactivate.
        entity: EntityId,
    },
    /// Requests that an entity be destroyed and released from the arena.
    DestroyEntity {
        /// Identifier of the entity to destroy.
        entity: EntityId,
    },
    /// Declares that the current round was lost.
    DeclareRoundLost,
}

/// Events broadcast by the world and systems after processing commands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Indicates that the simulation clock advanced.
    TimeAdvanced {
        /// Duration of simulated time that elapsed in the tick.
        dt: Duration,
    },
    /// Reports that an entity became inactive.
    EntityDeactivated {
        /// Identifier of the entity that was deactivated.
        entity: EntityId,
    },
    /// Reports that an entity was destroyed.
    EntityDestroyed {
        /// Identifier of the entity that was destroyed.
        entity: EntityId,
    },
    /// Announces that the current round was lost.
    RoundLost,
    /// Announces that night fell and an encounter should begin.
    NightStarted,
    /// Announces that day broke and any running encounter should stop.
    DayStarted,
    /// Confirms that the scheduler began driving a plan.
    EncounterStarted {
        /// Name of the plan being driven.
        plan: String,
        /// Number of waves contained in the plan.
        waves: usize,
    },
    /// Reports that a wave entered its start delay.
    WaveStarted {
        /// Zero-based index of the wave within the plan.
        index: usize,
        /// Number of waves contained in the plan.
        total: usize,
        /// Display name of the wave.
        name: String,
    },
    /// Confirms that a stream spawned an entity.
    EntitySpawned {
        /// Identifier assigned to the spawned entity.
        entity: EntityId,
        /// Template the entity was created from.
        template: TemplateId,
        /// Zero-based index of the wave that dispatched the spawn.
        wave: usize,
        /// Zero-based index of the stream within the wave.
        stream: usize,
        /// Zero-based position of the spawn within its stream.
        ordinal: u32,
        /// Scheduled simulation time of the spawn.
        at: Duration,
    },
    /// Reports that a stream slot was consumed without producing an entity.
    SpawnFailed {
        /// Template the stream attempted to instantiate.
        template: TemplateId,
        /// Zero-based index of the wave that dispatched the attempt.
        wave: usize,
        /// Zero-based index of the stream within the wave.
        stream: usize,
        /// Zero-based position of the attempt within its stream.
        ordinal: u32,
        /// Scheduled simulation time of the attempt.
        at: Duration,
        /// Reason reported by the spawner.
        reason: SpawnError,
    },
    /// Reports that every stream of a wave was exhausted.
    WaveDispatched {
        /// Zero-based index of the wave within the plan.
        index: usize,
        /// Simulation time at which dispatch finished.
        at: Duration,
    },
    /// Confirms that a running encounter was aborted.
    EncounterStopped {
        /// Name of the plan that was aborted.
        plan: String,
    },
    /// Announces that every wave was dispatched and the field is clear.
    EncounterCleared {
        /// Name of the plan that was cleared.
        plan: String,
        /// Simulation time at which the clear was observed.
        at: Duration,
    },
}

/// Opaque handle describing what a stream spawns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TemplateId(u32);

impl TemplateId {
    /// Creates a new template handle with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the handle.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Unique identifier assigned to a spawned entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u32);

impl EntityId {
    /// Creates a new entity identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Location and facing handed to the spawner for a single spawn.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpawnPoint {
    x: f32,
    y: f32,
    #[serde(default)]
    rotation: f32,
}

impl SpawnPoint {
    /// Creates a spawn point at the provided world position and facing.
    #[must_use]
    pub const fn new(x: f32, y: f32, rotation: f32) -> Self {
        Self { x, y, rotation }
    }

    /// Horizontal world coordinate.
    #[must_use]
    pub const fn x(&self) -> f32 {
        self.x
    }

    /// Vertical world coordinate.
    #[must_use]
    pub const fn y(&self) -> f32 {
        self.y
    }

    /// Facing expressed in radians.
    #[must_use]
    pub const fn rotation(&self) -> f32 {
        self.rotation
    }
}

/// Lifecycle of a wave scheduler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SchedulerPhase {
    /// No encounter is running.
    #[default]
    Idle,
    /// An encounter is dispatching waves or waiting for the field to clear.
    Running,
    /// The last encounter was cleared.
    Complete,
}

/// Reasons a spawn request may fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Error)]
pub enum SpawnError {
    /// The template handle is unknown to the spawner.
    #[error("entity template {} is not registered", .0.get())]
    MissingTemplate(TemplateId),
    /// No spawn point was available for the request.
    #[error("no spawn points are configured")]
    NoSpawnPoints,
    /// The spawner ran out of entity identifiers.
    #[error("entity arena is exhausted")]
    ArenaExhausted,
}

/// Creates entities on behalf of the wave scheduler.
pub trait Spawner {
    /// Instantiates `template` at `point`, returning the identity of the new entity.
    fn spawn(&mut self, template: TemplateId, point: SpawnPoint) -> Result<EntityId, SpawnError>;
}

impl<F> Spawner for F
where
    F: FnMut(TemplateId, SpawnPoint) -> Result<EntityId, SpawnError>,
{
    fn spawn(&mut self, template: TemplateId, point: SpawnPoint) -> Result<EntityId, SpawnError> {
        self(template, point)
    }
}
