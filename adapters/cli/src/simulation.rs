//! Fixed-step harness that drives the world, the cycle and the wave scheduler.

use std::{fmt, time::Duration};

use anyhow::{bail, Result};
use nightfall_core::{Command, Event};
use nightfall_system_cycle::CycleGate;
use nightfall_system_night_director::NightDirector;
use nightfall_system_waves::WaveScheduler;
use nightfall_world::{self as world, query, World};
use tracing::{debug, info};

use crate::config::Scenario;

/// Parameters of a single simulation run.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RunOptions {
    pub(crate) nights: u32,
    pub(crate) step: Duration,
    pub(crate) seed: u64,
    pub(crate) lose_night: Option<u32>,
}

/// How a night came to an end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NightOutcome {
    /// The encounter cleared before sunrise.
    Cleared { at: Duration },
    /// Sunrise arrived with the encounter still running.
    Sunrise,
    /// The round was declared lost during the night.
    Lost,
}

impl fmt::Display for NightOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cleared { at } => write!(f, "cleared at {:.1}s", at.as_secs_f64()),
            Self::Sunrise => f.write_str("sunrise"),
            Self::Lost => f.write_str("lost"),
        }
    }
}

/// Tally of a single played night.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct NightSummary {
    pub(crate) number: u32,
    pub(crate) plan: Option<String>,
    pub(crate) spawned: u32,
    pub(crate) failed: u32,
    pub(crate) outcome: NightOutcome,
}

impl fmt::Display for NightSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "night {}: plan={} spawned={} failed={} outcome={}",
            self.number,
            self.plan.as_deref().unwrap_or("-"),
            self.spawned,
            self.failed,
            self.outcome
        )
    }
}

#[derive(Debug)]
struct OpenNight {
    number: u32,
    plan: Option<String>,
    spawned: u32,
    failed: u32,
    cleared_at: Option<Duration>,
    lost: bool,
    loss_declared: bool,
}

impl OpenNight {
    fn new(number: u32) -> Self {
        Self {
            number,
            plan: None,
            spawned: 0,
            failed: 0,
            cleared_at: None,
            lost: false,
            loss_declared: false,
        }
    }

    fn finish(self) -> NightSummary {
        let outcome = if self.lost {
            NightOutcome::Lost
        } else if let Some(at) = self.cleared_at {
            NightOutcome::Cleared { at }
        } else {
            NightOutcome::Sunrise
        };

        NightSummary {
            number: self.number,
            plan: self.plan,
            spawned: self.spawned,
            failed: self.failed,
            outcome,
        }
    }
}

/// Follows the event stream and books what happened during each night.
#[derive(Debug, Default)]
struct Ledger {
    played: u32,
    open: Option<OpenNight>,
    closed: Vec<NightSummary>,
}

impl Ledger {
    fn observe(&mut self, events: &[Event]) {
        for event in events {
            match event {
                Event::NightStarted => {
                    self.close();
                    self.played = self.played.saturating_add(1);
                    self.open = Some(OpenNight::new(self.played));
                }
                Event::DayStarted => self.close(),
                _ => {
                    if let Some(night) = self.open.as_mut() {
                        night.record(event);
                    }
                }
            }
        }
    }

    fn close(&mut self) {
        if let Some(night) = self.open.take() {
            let summary = night.finish();
            info!(night = summary.number, outcome = %summary.outcome, "night ended");
            self.closed.push(summary);
        }
    }
}

impl OpenNight {
    fn record(&mut self, event: &Event) {
        match event {
            Event::RoundLost => self.lost = true,
            Event::EncounterStarted { plan, .. } => self.plan = Some(plan.clone()),
            Event::EntitySpawned { .. } => self.spawned = self.spawned.saturating_add(1),
            Event::SpawnFailed { .. } => self.failed = self.failed.saturating_add(1),
            Event::EncounterCleared { at, .. } if self.cleared_at.is_none() => {
                self.cleared_at = Some(*at);
            }
            _ => {}
        }
    }
}

/// Runs the scenario until `options.nights` nights have ended.
///
/// Each frame applies pending world commands, ticks the world, then lets the
/// cycle gate, the night director and the scheduler react in that order.
/// Scheduler events reach the cycle gate on the following frame.
pub(crate) fn run(scenario: Scenario, options: &RunOptions) -> Result<Vec<NightSummary>> {
    if options.step.is_zero() {
        bail!("simulation step must be positive");
    }
    let wanted = usize::try_from(options.nights).unwrap_or(usize::MAX);
    let frame_limit = frame_limit(&scenario, options);

    let mut world = World::new();
    let mut world_events = Vec::new();
    for template in &scenario.templates {
        debug!(template = %template.name, id = template.id.get(), "registering template");
        world::apply(
            &mut world,
            Command::RegisterTemplate {
                template: template.id,
                lifetime: template.lifetime,
            },
            &mut world_events,
        );
    }

    let mut cycle = CycleGate::new(scenario.cycle);
    let mut director = NightDirector::new(scenario.presets, options.seed);
    let mut scheduler = WaveScheduler::new(scenario.scheduler);

    let mut ledger = Ledger::default();
    let mut commands: Vec<Command> = Vec::new();
    let mut scheduler_events: Vec<Event> = Vec::new();
    let mut frames: u64 = 0;

    while ledger.closed.len() < wanted {
        if frames == frame_limit {
            bail!(
                "only {} of {} nights ended within {} frames",
                ledger.closed.len(),
                options.nights,
                frame_limit
            );
        }
        frames += 1;

        world_events.clear();
        for command in commands.drain(..) {
            world::apply(&mut world, command, &mut world_events);
        }
        world::apply(
            &mut world,
            Command::Tick { dt: options.step },
            &mut world_events,
        );

        let mut cycle_input = world_events.clone();
        cycle_input.append(&mut scheduler_events);
        let mut cycle_events = Vec::new();
        cycle.handle(&cycle_input, &mut cycle_events);

        let mut director_input = world_events.clone();
        director_input.extend(cycle_events.iter().cloned());
        director.handle(
            &director_input,
            &mut scheduler,
            &mut commands,
            &mut scheduler_events,
        );
        scheduler.handle(&world_events, &mut world, &mut scheduler_events);

        ledger.observe(&world_events);
        ledger.observe(&cycle_events);
        ledger.observe(&scheduler_events);

        if let Some(night) = ledger.open.as_mut() {
            if options.lose_night == Some(night.number)
                && !night.loss_declared
                && scheduler.alive_count() > 0
            {
                info!(night = night.number, "declaring the round lost");
                night.loss_declared = true;
                commands.push(Command::DeclareRoundLost);
            }
        }
    }

    info!(
        frames,
        clock = ?query::clock(&world),
        active = query::active_count(&world),
        "simulation finished"
    );
    ledger.closed.truncate(wanted);
    Ok(ledger.closed)
}

/// Upper bound on frames before a run is considered stuck.
fn frame_limit(scenario: &Scenario, options: &RunOptions) -> u64 {
    let cycle = scenario
        .cycle
        .day()
        .saturating_add(scenario.cycle.night_spawn_delay())
        .saturating_add(scenario.cycle.night());
    let per_cycle = cycle.as_nanos() / options.step.as_nanos().max(1) + 2;
    let limit = per_cycle
        .saturating_mul(u128::from(options.nights) + 1)
        .saturating_mul(2);
    u64::try_from(limit).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use nightfall_core::{
        EncounterPlan, NightBucket, NightPresetSet, SpawnPoint, SpawnStream, TemplateId, Wave,
    };
    use nightfall_system_cycle::Config as CycleConfig;
    use nightfall_system_waves::Config as SchedulerConfig;

    use super::*;
    use crate::config::TemplateSpec;

    const WALKER: TemplateId = TemplateId::new(1);

    fn scenario(lifetime: Option<Duration>, stream_template: TemplateId, night: Duration) -> Scenario {
        let plan = EncounterPlan::new(
            "skirmish",
            vec![Wave::new(
                "only",
                vec![SpawnStream::new(stream_template, 3, Duration::from_millis(100))],
            )
            .with_end_delay(Duration::from_millis(500))],
        );

        Scenario {
            scheduler: SchedulerConfig::new(vec![SpawnPoint::new(0.0, 0.0, 0.0)]),
            cycle: CycleConfig::new(Duration::from_secs(1), night)
                .with_night_spawn_delay(Duration::ZERO),
            templates: vec![TemplateSpec {
                id: WALKER,
                name: "walker".to_owned(),
                lifetime,
            }],
            presets: NightPresetSet::new(vec![NightBucket::new(
                "first",
                vec![Arc::new(plan)],
            )]),
        }
    }

    fn options(nights: u32, lose_night: Option<u32>) -> RunOptions {
        RunOptions {
            nights,
            step: Duration::from_millis(100),
            seed: 3,
            lose_night,
        }
    }

    #[test]
    fn short_lived_entities_let_every_night_clear() {
        let scenario = scenario(
            Some(Duration::from_millis(500)),
            WALKER,
            Duration::from_secs(10),
        );
        let summaries = run(scenario, &options(2, None)).expect("run finishes");

        assert_eq!(summaries.len(), 2);
        for (index, summary) in summaries.iter().enumerate() {
            assert_eq!(summary.number, u32::try_from(index + 1).expect("small"));
            assert_eq!(summary.plan.as_deref(), Some("skirmish"));
            assert_eq!((summary.spawned, summary.failed), (3, 0));
            assert!(
                matches!(summary.outcome, NightOutcome::Cleared { .. }),
                "{summary}"
            );
        }
    }

    #[test]
    fn immortal_entities_hold_the_night_until_sunrise() {
        let scenario = scenario(None, WALKER, Duration::from_secs(2));
        let summaries = run(scenario, &options(1, None)).expect("run finishes");

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].spawned, 3);
        assert_eq!(summaries[0].outcome, NightOutcome::Sunrise);
        assert_eq!(
            summaries[0].to_string(),
            "night 1: plan=skirmish spawned=3 failed=0 outcome=sunrise"
        );
    }

    #[test]
    fn losing_a_night_rewinds_and_play_continues() {
        let scenario = scenario(None, WALKER, Duration::from_secs(5));
        let summaries = run(scenario, &options(2, Some(1))).expect("run finishes");

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].outcome, NightOutcome::Lost);
        assert!(summaries[0].spawned >= 1);
        assert_eq!(summaries[1].outcome, NightOutcome::Sunrise);
        assert_eq!(summaries[1].spawned, 3);
    }

    #[test]
    fn unregistered_templates_fail_and_still_clear() {
        let scenario = scenario(None, TemplateId::new(9), Duration::from_secs(10));
        let summaries = run(scenario, &options(1, None)).expect("run finishes");

        assert_eq!((summaries[0].spawned, summaries[0].failed), (0, 3));
        assert!(matches!(
            summaries[0].outcome,
            NightOutcome::Cleared { .. }
        ));
    }

    #[test]
    fn zero_step_is_rejected() {
        let scenario = scenario(None, WALKER, Duration::from_secs(1));
        let mut options = options(1, None);
        options.step = Duration::ZERO;
        assert!(run(scenario, &options).is_err());
    }
}
