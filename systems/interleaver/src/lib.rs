#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Deterministic interleaving of the spawn streams that make up one wave.
//!
//! Every stream keeps its own next-fire instant. Whenever the interleaver is
//! advanced it repeatedly picks the unexhausted stream whose next-fire instant
//! is the soonest, breaking ties by the lowest stream index, and fires it if
//! that instant has been reached. A shared population cap acts as a global
//! valve: while the tracker reports the cap reached, no stream fires at all.
//!
//! Spawns that became due inside a coarse tick are stamped with their
//! scheduled instant rather than the tick's end, so the produced sequence only
//! depends on the plan, the cap and the instants at which removals were
//! observed.

use std::time::Duration;

use nightfall_core::{EntityId, Event, SpawnError, SpawnStream, TemplateId, MIN_STREAM_INTERVAL};
use nightfall_system_population::PopulationTracker;
use tracing::{debug, warn};

/// Result of advancing the interleaver up to a point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Every stream is exhausted; dispatch finished at the provided instant.
    Finished {
        /// Simulation time of the last dispatch decision.
        at: Duration,
    },
    /// The population cap is reached; nothing fires until an entity is removed.
    AwaitingPopulation,
    /// The soonest stream is not due yet.
    AwaitingTime {
        /// Simulation time at which the soonest stream becomes due.
        until: Duration,
    },
}

/// Per-wave dispatcher that decides which stream fires next and when.
#[derive(Clone, Debug)]
pub struct StreamInterleaver {
    wave: usize,
    streams: Vec<StreamCursor>,
    cursor: Duration,
    awaiting_population: bool,
}

#[derive(Clone, Copy, Debug)]
struct StreamCursor {
    template: TemplateId,
    count: u32,
    interval: Duration,
    spawned: u32,
    next_fire: Duration,
}

impl StreamCursor {
    fn is_exhausted(&self) -> bool {
        self.spawned >= self.count
    }
}

impl StreamInterleaver {
    /// Prepares dispatch of `streams` for the wave at index `wave`.
    ///
    /// Stream `i` first becomes due at `started_at + i * stagger`.
    #[must_use]
    pub fn new(
        wave: usize,
        streams: &[SpawnStream],
        started_at: Duration,
        stagger: Duration,
    ) -> Self {
        let streams = streams
            .iter()
            .enumerate()
            .map(|(index, stream)| {
                let offset = u32::try_from(index).unwrap_or(u32::MAX);
                StreamCursor {
                    template: stream.template(),
                    count: stream.count(),
                    interval: stream.interval().max(MIN_STREAM_INTERVAL),
                    spawned: 0,
                    next_fire: started_at.saturating_add(stagger.saturating_mul(offset)),
                }
            })
            .collect();

        Self {
            wave,
            streams,
            cursor: started_at,
            awaiting_population: false,
        }
    }

    /// Prepares a dispatcher that has nothing to spawn.
    #[must_use]
    pub fn empty(wave: usize, started_at: Duration) -> Self {
        Self::new(wave, &[], started_at, Duration::ZERO)
    }

    /// Index of the wave this interleaver dispatches.
    #[must_use]
    pub const fn wave(&self) -> usize {
        self.wave
    }

    /// Reports whether every stream has consumed all of its slots.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.streams.iter().all(StreamCursor::is_exhausted)
    }

    /// Number of slots not yet consumed across all streams.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.streams
            .iter()
            .map(|stream| u64::from(stream.count.saturating_sub(stream.spawned)))
            .sum()
    }

    /// Next-fire instant of the stream that would be picked next, if any.
    #[must_use]
    pub fn next_fire(&self) -> Option<Duration> {
        self.soonest().map(|index| self.streams[index].next_fire)
    }

    /// Fires every stream that is due at `now` while the population allows it.
    ///
    /// `spawn` is invoked with the template of the picked stream and returns the
    /// identity of the created entity. Successful spawns are registered with
    /// `population`; failures are logged and still consume the stream's slot so
    /// that dispatch always terminates.
    pub fn advance<F>(
        &mut self,
        now: Duration,
        cap: u32,
        population: &mut PopulationTracker,
        mut spawn: F,
        out: &mut Vec<Event>,
    ) -> Dispatch
    where
        F: FnMut(TemplateId) -> Result<EntityId, SpawnError>,
    {
        if self.awaiting_population {
            self.cursor = self.cursor.max(now);
            self.awaiting_population = false;
        }

        loop {
            let Some(index) = self.soonest() else {
                return Dispatch::Finished { at: self.cursor };
            };

            if population.alive_count() >= cap {
                self.awaiting_population = true;
                return Dispatch::AwaitingPopulation;
            }

            let scheduled = self.streams[index].next_fire;
            if scheduled > now {
                return Dispatch::AwaitingTime { until: scheduled };
            }

            let at = scheduled.max(self.cursor);
            self.cursor = at;
            self.fire(index, at, population, &mut spawn, out);
        }
    }

    fn fire<F>(
        &mut self,
        index: usize,
        at: Duration,
        population: &mut PopulationTracker,
        spawn: &mut F,
        out: &mut Vec<Event>,
    ) where
        F: FnMut(TemplateId) -> Result<EntityId, SpawnError>,
    {
        let wave = self.wave;
        let stream = &mut self.streams[index];
        let ordinal = stream.spawned;

        match spawn(stream.template) {
            Ok(entity) => {
                population.register(entity);
                debug!(
                    wave,
                    stream = index,
                    entity = entity.get(),
                    alive = population.alive_count(),
                    "entity spawned"
                );
                out.push(Event::EntitySpawned {
                    entity,
                    template: stream.template,
                    wave,
                    stream: index,
                    ordinal,
                    at,
                });
            }
            Err(reason) => {
                warn!(
                    wave,
                    stream = index,
                    template = stream.template.get(),
                    %reason,
                    "spawn failed; slot consumed"
                );
                out.push(Event::SpawnFailed {
                    template: stream.template,
                    wave,
                    stream: index,
                    ordinal,
                    at,
                    reason,
                });
            }
        }

        stream.spawned = stream.spawned.saturating_add(1);
        stream.next_fire = at.saturating_add(stream.interval);
    }

    fn soonest(&self) -> Option<usize> {
        let mut pick: Option<usize> = None;
        for (index, stream) in self.streams.iter().enumerate() {
            if stream.is_exhausted() {
                continue;
            }
            match pick {
                Some(current) if self.streams[current].next_fire <= stream.next_fire => {}
                _ => pick = Some(index),
            }
        }
        pick
    }
}
