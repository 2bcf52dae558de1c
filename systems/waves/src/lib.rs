#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Wave scheduler that drives an encounter plan from start to a single clear.
//!
//! The scheduler is an explicit state machine advanced by simulation time.
//! Every wave passes through the same stages: a start delay, live dispatch of
//! its streams through a [`StreamInterleaver`], an end delay and a cleanup
//! wait that ends once the population dropped to the cleanup target or the
//! grace period elapsed. After the last wave the scheduler waits, without a
//! timeout, for the population to reach zero and then raises
//! [`Event::EncounterCleared`] exactly once.
//!
//! Suspension is represented by the stage the run is parked in, so stopping
//! an encounter only has to drop the run. Within one tick the scheduler keeps
//! a virtual cursor: delays end at their exact instant and any stage that
//! becomes reachable inside the tick is evaluated immediately.

use std::{sync::Arc, time::Duration};

use nightfall_core::{
    EncounterPlan, EntityId, Event, SchedulerPhase, SpawnError, SpawnPoint, Spawner,
    DEFAULT_CLEANUP_GRACE, DEFAULT_MAX_ALIVE, DEFAULT_STREAM_STAGGER,
};
use nightfall_system_interleaver::{Dispatch, StreamInterleaver};
use nightfall_system_population::PopulationTracker;
use tracing::{info, warn};

mod spawn_points;

pub use spawn_points::{SpawnPointPolicy, DEFAULT_SPAWN_POINT_SEED};

use spawn_points::SpawnPointSelector;

/// Policy deciding how far the population must drop before the next wave starts.
///
/// The target is `min(ceiling, cap / divisor)`. A divisor of zero yields a
/// target of zero, so the cleanup wait then only ends on a clear field or on
/// the grace timeout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CleanupTarget {
    ceiling: u32,
    divisor: u32,
}

impl CleanupTarget {
    /// Creates a policy with the provided ceiling and cap divisor.
    #[must_use]
    pub const fn new(ceiling: u32, divisor: u32) -> Self {
        Self { ceiling, divisor }
    }

    /// Highest target the policy ever yields.
    #[must_use]
    pub const fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Divisor applied to the effective cap.
    #[must_use]
    pub const fn divisor(&self) -> u32 {
        self.divisor
    }

    /// Population at or below which the cleanup wait is satisfied.
    #[must_use]
    pub fn target(&self, cap: u32) -> u32 {
        cap.checked_div(self.divisor)
            .map_or(0, |share| share.min(self.ceiling))
    }
}

impl Default for CleanupTarget {
    fn default() -> Self {
        Self::new(4, 5)
    }
}

/// Configuration parameters required to construct the wave scheduler.
#[derive(Clone, Debug)]
pub struct Config {
    max_alive: u32,
    stagger: Duration,
    cleanup_grace: Duration,
    cleanup_target: CleanupTarget,
    spawn_points: Vec<SpawnPoint>,
    spawn_point_policy: SpawnPointPolicy,
}

impl Config {
    /// Creates a configuration with default tuning and the provided spawn points.
    #[must_use]
    pub fn new(spawn_points: Vec<SpawnPoint>) -> Self {
        Self {
            max_alive: DEFAULT_MAX_ALIVE,
            stagger: DEFAULT_STREAM_STAGGER,
            cleanup_grace: DEFAULT_CLEANUP_GRACE,
            cleanup_target: CleanupTarget::default(),
            spawn_points,
            spawn_point_policy: SpawnPointPolicy::default(),
        }
    }

    /// Overrides the population cap used by waves without an override.
    #[must_use]
    pub fn with_max_alive(mut self, max_alive: u32) -> Self {
        self.max_alive = max_alive;
        self
    }

    /// Overrides the per-stream-index offset applied when dispatch begins.
    #[must_use]
    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    /// Overrides the longest cleanup wait between two waves.
    #[must_use]
    pub fn with_cleanup_grace(mut self, grace: Duration) -> Self {
        self.cleanup_grace = grace;
        self
    }

    /// Overrides the cleanup target policy.
    #[must_use]
    pub fn with_cleanup_target(mut self, target: CleanupTarget) -> Self {
        self.cleanup_target = target;
        self
    }

    /// Overrides how spawn points are picked.
    #[must_use]
    pub fn with_spawn_point_policy(mut self, policy: SpawnPointPolicy) -> Self {
        self.spawn_point_policy = policy;
        self
    }

    /// Population cap used by waves without an override.
    #[must_use]
    pub const fn max_alive(&self) -> u32 {
        self.max_alive
    }

    /// Per-stream-index offset applied when dispatch begins.
    #[must_use]
    pub const fn stagger(&self) -> Duration {
        self.stagger
    }

    /// Longest cleanup wait between two waves.
    #[must_use]
    pub const fn cleanup_grace(&self) -> Duration {
        self.cleanup_grace
    }

    /// Cleanup target policy.
    #[must_use]
    pub const fn cleanup_target(&self) -> CleanupTarget {
        self.cleanup_target
    }

    /// Spawn points handed to the spawner.
    #[must_use]
    pub fn spawn_points(&self) -> &[SpawnPoint] {
        &self.spawn_points
    }

    /// Strategy used to pick spawn points.
    #[must_use]
    pub const fn spawn_point_policy(&self) -> SpawnPointPolicy {
        self.spawn_point_policy
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[derive(Clone, Copy, Debug)]
struct Tuning {
    max_alive: u32,
    stagger: Duration,
    cleanup_grace: Duration,
    cleanup_target: CleanupTarget,
}

#[derive(Debug)]
enum Stage {
    StartDelay {
        until: Duration,
    },
    Dispatch {
        interleaver: StreamInterleaver,
        cap: u32,
    },
    EndDelay {
        until: Duration,
        cap: u32,
    },
    Cleanup {
        target: u32,
        deadline: Duration,
        polled: bool,
    },
    FinalClear {
        polled: bool,
    },
}

#[derive(Debug)]
struct EncounterRun {
    plan: Arc<EncounterPlan>,
    wave_index: usize,
    stage: Stage,
    cursor: Duration,
}

enum Step {
    Continue,
    Blocked,
    Cleared { at: Duration },
}

struct StepContext<'a, S: ?Sized> {
    now: Duration,
    tuning: Tuning,
    population: &'a mut PopulationTracker,
    spawn_points: &'a mut SpawnPointSelector,
    spawner: &'a mut S,
}

impl EncounterRun {
    fn new(plan: Arc<EncounterPlan>, started_at: Duration, out: &mut Vec<Event>) -> Self {
        let mut run = Self {
            plan,
            wave_index: 0,
            stage: Stage::FinalClear { polled: false },
            cursor: started_at,
        };
        if run.plan.waves().is_empty() {
            warn!(plan = run.plan.name(), "plan has no waves");
        } else {
            run.enter_wave(0, out);
        }
        run
    }

    fn enter_wave(&mut self, index: usize, out: &mut Vec<Event>) {
        let total = self.plan.waves().len();
        let Some(wave) = self.plan.waves().get(index) else {
            self.stage = Stage::FinalClear { polled: false };
            return;
        };
        self.wave_index = index;

        info!(
            plan = self.plan.name(),
            wave = index,
            total,
            name = wave.name(),
            "wave started"
        );
        out.push(Event::WaveStarted {
            index,
            total,
            name: wave.name().to_owned(),
        });
        self.stage = Stage::StartDelay {
            until: self.cursor.saturating_add(wave.start_delay()),
        };
    }

    fn step<S>(&mut self, ctx: &mut StepContext<'_, S>, out: &mut Vec<Event>) -> Step
    where
        S: Spawner + ?Sized,
    {
        let now = ctx.now;
        let plan = Arc::clone(&self.plan);
        let Some(wave) = plan.waves().get(self.wave_index) else {
            return self.await_clear(ctx);
        };

        match &mut self.stage {
            Stage::StartDelay { until } => {
                if *until > now {
                    return Step::Blocked;
                }
                self.cursor = *until;

                let cap = wave.effective_cap(ctx.tuning.max_alive);
                let interleaver = if wave.streams().is_empty() {
                    warn!(wave = self.wave_index, "wave has no streams");
                    StreamInterleaver::empty(self.wave_index, self.cursor)
                } else if ctx.spawn_points.is_empty() {
                    warn!(
                        wave = self.wave_index,
                        skipped = wave.total_spawns(),
                        "no spawn points configured; dispatch skipped"
                    );
                    StreamInterleaver::empty(self.wave_index, self.cursor)
                } else {
                    StreamInterleaver::new(
                        self.wave_index,
                        wave.streams(),
                        self.cursor,
                        ctx.tuning.stagger,
                    )
                };
                self.stage = Stage::Dispatch { interleaver, cap };
                Step::Continue
            }
            Stage::Dispatch { interleaver, cap } => {
                let cap = *cap;
                let spawn_points = &mut *ctx.spawn_points;
                let spawner = &mut *ctx.spawner;
                let outcome = interleaver.advance(
                    now,
                    cap,
                    ctx.population,
                    |template| {
                        let point = spawn_points.select().ok_or(SpawnError::NoSpawnPoints)?;
                        spawner.spawn(template, point)
                    },
                    out,
                );

                match outcome {
                    Dispatch::Finished { at } => {
                        out.push(Event::WaveDispatched {
                            index: self.wave_index,
                            at,
                        });
                        self.cursor = at;
                        self.stage = Stage::EndDelay {
                            until: at.saturating_add(wave.end_delay()),
                            cap,
                        };
                        Step::Continue
                    }
                    Dispatch::AwaitingPopulation | Dispatch::AwaitingTime { .. } => Step::Blocked,
                }
            }
            Stage::EndDelay { until, cap } => {
                if *until > now {
                    return Step::Blocked;
                }
                self.cursor = *until;
                self.stage = Stage::Cleanup {
                    target: ctx.tuning.cleanup_target.target(*cap),
                    deadline: self.cursor.saturating_add(ctx.tuning.cleanup_grace),
                    polled: false,
                };
                Step::Continue
            }
            Stage::Cleanup {
                target,
                deadline,
                polled,
            } => {
                let alive = ctx.population.alive_count();
                if alive <= *target {
                    if *polled {
                        self.cursor = now.min(*deadline);
                    }
                } else if *deadline <= now {
                    warn!(
                        wave = self.wave_index,
                        alive,
                        target = *target,
                        "cleanup grace elapsed; continuing"
                    );
                    self.cursor = *deadline;
                } else {
                    *polled = true;
                    return Step::Blocked;
                }

                self.enter_wave(self.wave_index + 1, out);
                Step::Continue
            }
            Stage::FinalClear { .. } => self.await_clear(ctx),
        }
    }

    fn await_clear<S: ?Sized>(&mut self, ctx: &StepContext<'_, S>) -> Step {
        let Stage::FinalClear { polled } = &mut self.stage else {
            self.stage = Stage::FinalClear { polled: false };
            return Step::Continue;
        };

        if !ctx.population.is_empty() {
            *polled = true;
            return Step::Blocked;
        }

        let at = if *polled { ctx.now } else { self.cursor };
        Step::Cleared { at }
    }
}

/// Orchestrates one encounter at a time, wave by wave.
#[derive(Debug)]
pub struct WaveScheduler {
    tuning: Tuning,
    spawn_points: SpawnPointSelector,
    population: PopulationTracker,
    phase: SchedulerPhase,
    run: Option<EncounterRun>,
    current_wave_index: usize,
    cleared_raised: bool,
    now: Duration,
}

impl WaveScheduler {
    /// Creates an idle scheduler using the supplied configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let Config {
            max_alive,
            stagger,
            cleanup_grace,
            cleanup_target,
            spawn_points,
            spawn_point_policy,
        } = config;

        Self {
            tuning: Tuning {
                max_alive,
                stagger,
                cleanup_grace,
                cleanup_target,
            },
            spawn_points: SpawnPointSelector::new(spawn_points, spawn_point_policy),
            population: PopulationTracker::new(),
            phase: SchedulerPhase::Idle,
            run: None,
            current_wave_index: 0,
            cleared_raised: false,
            now: Duration::ZERO,
        }
    }

    /// Begins driving `plan`, cancelling any encounter that is still running.
    ///
    /// Handles left over from a previous encounter are detached without
    /// touching their entities, so the new encounter counts from zero.
    pub fn start(&mut self, plan: Arc<EncounterPlan>, out: &mut Vec<Event>) {
        if self.phase == SchedulerPhase::Running {
            self.stop(out);
        }

        let detached = self.population.clear();
        if !detached.is_empty() {
            info!(
                detached = detached.len(),
                "leftover entities detached from the population"
            );
        }

        self.current_wave_index = 0;
        self.cleared_raised = false;
        self.phase = SchedulerPhase::Running;

        info!(
            plan = plan.name(),
            waves = plan.waves().len(),
            spawns = plan.total_spawns(),
            "encounter started"
        );
        out.push(Event::EncounterStarted {
            plan: plan.name().to_owned(),
            waves: plan.waves().len(),
        });
        self.run = Some(EncounterRun::new(plan, self.now, out));
    }

    /// Aborts the running encounter without raising the clear signal.
    ///
    /// Tracked entities stay tracked; they belong to the simulation. Calling
    /// this while idle is a no-op.
    pub fn stop(&mut self, out: &mut Vec<Event>) {
        match self.phase {
            SchedulerPhase::Idle => {}
            SchedulerPhase::Complete => self.phase = SchedulerPhase::Idle,
            SchedulerPhase::Running => {
                self.phase = SchedulerPhase::Idle;
                if let Some(run) = self.run.take() {
                    info!(
                        plan = run.plan.name(),
                        wave = run.wave_index,
                        alive = self.population.alive_count(),
                        "encounter stopped"
                    );
                    out.push(Event::EncounterStopped {
                        plan: run.plan.name().to_owned(),
                    });
                }
            }
        }
    }

    /// Stops the encounter and detaches every tracked entity.
    ///
    /// Reserved for defeat or reload. The detached identifiers are returned in
    /// ascending order so the caller can deactivate the entities.
    #[must_use = "detached entities are still alive in the simulation"]
    pub fn hard_reset(&mut self, out: &mut Vec<Event>) -> Vec<EntityId> {
        self.stop(out);
        let detached = self.population.clear();
        self.current_wave_index = 0;
        self.cleared_raised = false;
        warn!(detached = detached.len(), "scheduler hard reset");
        detached
    }

    /// Accounts for the removal of `entity`, returning whether the population shrank.
    pub fn notify_removed(&mut self, entity: EntityId) -> bool {
        self.population.notify_removed(entity)
    }

    /// Consumes world events, forwarding removals before advancing time.
    pub fn handle<S>(&mut self, events: &[Event], spawner: &mut S, out: &mut Vec<Event>)
    where
        S: Spawner + ?Sized,
    {
        let mut elapsed = Duration::ZERO;
        for event in events {
            match event {
                Event::TimeAdvanced { dt } => elapsed = elapsed.saturating_add(*dt),
                Event::EntityDeactivated { entity } | Event::EntityDestroyed { entity } => {
                    let _ = self.population.notify_removed(*entity);
                }
                _ => {}
            }
        }

        if elapsed.is_zero() {
            return;
        }

        self.tick(elapsed, spawner, out);
    }

    /// Advances the scheduler clock by `dt` and runs every stage that becomes ready.
    pub fn tick<S>(&mut self, dt: Duration, spawner: &mut S, out: &mut Vec<Event>)
    where
        S: Spawner + ?Sized,
    {
        self.now = self.now.saturating_add(dt);
        if self.phase != SchedulerPhase::Running {
            return;
        }

        let Some(run) = self.run.as_mut() else {
            return;
        };
        let mut ctx = StepContext {
            now: self.now,
            tuning: self.tuning,
            population: &mut self.population,
            spawn_points: &mut self.spawn_points,
            spawner,
        };

        let cleared_at = loop {
            match run.step(&mut ctx, out) {
                Step::Continue => self.current_wave_index = run.wave_index,
                Step::Blocked => return,
                Step::Cleared { at } => break at,
            }
        };

        self.finish(cleared_at, out);
    }

    fn finish(&mut self, at: Duration, out: &mut Vec<Event>) {
        let Some(run) = self.run.take() else {
            return;
        };
        self.phase = SchedulerPhase::Complete;

        if self.cleared_raised {
            return;
        }
        self.cleared_raised = true;
        info!(
            plan = run.plan.name(),
            at = ?at,
            "encounter cleared"
        );
        out.push(Event::EncounterCleared {
            plan: run.plan.name().to_owned(),
            at,
        });
    }

    /// Current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    /// Number of live entities spawned by the current encounter.
    #[must_use]
    pub const fn alive_count(&self) -> u32 {
        self.population.alive_count()
    }

    /// Index of the wave the current or last encounter is working on.
    #[must_use]
    pub const fn current_wave_index(&self) -> usize {
        self.current_wave_index
    }

    /// Whether the clear signal was raised for the current or last encounter.
    #[must_use]
    pub const fn cleared_raised(&self) -> bool {
        self.cleared_raised
    }

    /// Population tracker owned by the scheduler.
    #[must_use]
    pub const fn population(&self) -> &PopulationTracker {
        &self.population
    }

    /// Simulation time observed by the scheduler.
    #[must_use]
    pub const fn now(&self) -> Duration {
        self.now
    }

    /// Spawn points handed to the spawner.
    #[must_use]
    pub fn spawn_points(&self) -> &[SpawnPoint] {
        self.spawn_points.points()
    }

    /// Plan driven by the running encounter, if any.
    #[must_use]
    pub fn active_plan(&self) -> Option<&Arc<EncounterPlan>> {
        self.run.as_ref().map(|run| &run.plan)
    }
}
