#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Routes day/night signals to the wave scheduler and picks each night's plan.

use std::sync::Arc;

use nightfall_core::{Command, EncounterPlan, Event, NightPresetSet, SchedulerPhase};
use nightfall_system_waves::WaveScheduler;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

/// Pure system that starts and stops encounters as the cycle turns.
#[derive(Debug)]
pub struct NightDirector {
    presets: NightPresetSet,
    night_index: usize,
    night_started: bool,
    rng: ChaCha8Rng,
}

impl NightDirector {
    /// Creates a director that picks presets with a generator seeded by `seed`.
    #[must_use]
    pub fn new(presets: NightPresetSet, seed: u64) -> Self {
        Self {
            presets,
            night_index: 0,
            night_started: false,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Consumes cycle and world events, driving the scheduler accordingly.
    ///
    /// A sunrise only stops the encounter; live entities stay in the world. A
    /// lost round hard-resets the scheduler and requests deactivation of every
    /// entity it was still tracking.
    pub fn handle(
        &mut self,
        events: &[Event],
        scheduler: &mut WaveScheduler,
        out_commands: &mut Vec<Command>,
        out_events: &mut Vec<Event>,
    ) {
        for event in events {
            match event {
                Event::NightStarted => self.begin_night(scheduler, out_events),
                Event::DayStarted => self.begin_day(scheduler, out_events),
                Event::RoundLost => {
                    let detached = scheduler.hard_reset(out_events);
                    out_commands.extend(
                        detached
                            .into_iter()
                            .map(|entity| Command::DeactivateEntity { entity }),
                    );
                    self.night_index = 0;
                    self.night_started = false;
                    info!("night director reset to the first night");
                }
                _ => {}
            }
        }
    }

    fn begin_night(&mut self, scheduler: &mut WaveScheduler, out_events: &mut Vec<Event>) {
        if scheduler.phase() == SchedulerPhase::Running {
            debug!(
                night = self.night_index,
                "encounter already running; night signal ignored"
            );
            return;
        }

        let Some(plan) = self.resolve_plan() else {
            return;
        };
        info!(
            night = self.night_index + 1,
            plan = plan.name(),
            "starting night"
        );
        scheduler.start(plan, out_events);
        self.night_started = true;
    }

    fn begin_day(&mut self, scheduler: &mut WaveScheduler, out_events: &mut Vec<Event>) {
        scheduler.stop(out_events);
        if !self.night_started {
            return;
        }

        self.night_started = false;
        if self.night_index + 1 < self.presets.night_count() {
            self.night_index += 1;
        }
        debug!(night = self.night_index, "advanced night index");
    }

    fn resolve_plan(&mut self) -> Option<Arc<EncounterPlan>> {
        let Some(bucket) = self.presets.bucket(self.night_index) else {
            warn!("night preset set is empty");
            return None;
        };

        let presets = bucket.presets();
        if presets.is_empty() {
            warn!(
                night = self.night_index,
                bucket = bucket.name(),
                "night bucket has no presets"
            );
            return None;
        }

        let pick = self.rng.gen_range(0..presets.len());
        presets.get(pick).cloned()
    }

    /// Zero-based index of the night the next encounter is picked for.
    #[must_use]
    pub const fn night_index(&self) -> usize {
        self.night_index
    }

    /// Catalogue the director picks plans from.
    #[must_use]
    pub const fn presets(&self) -> &NightPresetSet {
        &self.presets
    }
}
