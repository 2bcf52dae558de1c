use std::time::Duration;

use nightfall_core::{Command, Event, SpawnError, SpawnPoint, SpawnStream, Spawner, TemplateId};
use nightfall_system_interleaver::{Dispatch, StreamInterleaver};
use nightfall_system_population::PopulationTracker;
use nightfall_world::{self as world, query, World};

const GATE: SpawnPoint = SpawnPoint::new(0.0, 0.0, 0.0);

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn world_with(templates: &[TemplateId]) -> World {
    let mut world = World::new();
    let mut events = Vec::new();
    for template in templates {
        world::apply(
            &mut world,
            Command::RegisterTemplate {
                template: *template,
                lifetime: None,
            },
            &mut events,
        );
    }
    world
}

fn spawn_log(events: &[Event]) -> Vec<(usize, u32, Duration)> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::EntitySpawned {
                stream,
                ordinal,
                at,
                ..
            } => Some((*stream, *ordinal, *at)),
            _ => None,
        })
        .collect()
}

#[test]
fn coarse_advance_stamps_spawns_with_their_schedule() {
    let template = TemplateId::new(1);
    let mut world = world_with(&[template]);
    let mut population = PopulationTracker::new();
    let mut out = Vec::new();
    let mut interleaver = StreamInterleaver::new(
        0,
        &[SpawnStream::new(template, 5, ms(200))],
        Duration::ZERO,
        ms(150),
    );

    let outcome = interleaver.advance(
        ms(1_000),
        35,
        &mut population,
        |template| world.spawn(template, GATE),
        &mut out,
    );

    assert_eq!(outcome, Dispatch::Finished { at: ms(800) });
    assert_eq!(
        spawn_log(&out),
        vec![
            (0, 0, ms(0)),
            (0, 1, ms(200)),
            (0, 2, ms(400)),
            (0, 3, ms(600)),
            (0, 4, ms(800)),
        ]
    );
    assert_eq!(population.alive_count(), 5);
    assert_eq!(query::active_count(&world), 5);
}

#[test]
fn streams_interleave_by_next_fire_time() {
    let (fast, slow) = (TemplateId::new(1), TemplateId::new(2));
    let mut world = world_with(&[fast, slow]);
    let mut population = PopulationTracker::new();
    let mut out = Vec::new();
    let mut interleaver = StreamInterleaver::new(
        0,
        &[
            SpawnStream::new(fast, 3, ms(300)),
            SpawnStream::new(slow, 2, ms(400)),
        ],
        Duration::ZERO,
        ms(150),
    );

    let outcome = interleaver.advance(
        ms(2_000),
        35,
        &mut population,
        |template| world.spawn(template, GATE),
        &mut out,
    );

    assert_eq!(outcome, Dispatch::Finished { at: ms(600) });
    assert_eq!(
        spawn_log(&out),
        vec![
            (0, 0, ms(0)),
            (1, 0, ms(150)),
            (0, 1, ms(300)),
            (1, 1, ms(550)),
            (0, 2, ms(600)),
        ]
    );
}

#[test]
fn population_cap_blocks_every_stream() {
    let template = TemplateId::new(1);
    let mut world = world_with(&[template]);
    let mut population = PopulationTracker::new();
    let mut out = Vec::new();
    let streams = vec![SpawnStream::new(template, 4, ms(20)); 3];
    let mut interleaver = StreamInterleaver::new(2, &streams, Duration::ZERO, ms(150));

    let outcome = interleaver.advance(
        ms(5_000),
        2,
        &mut population,
        |template| world.spawn(template, GATE),
        &mut out,
    );

    assert_eq!(outcome, Dispatch::AwaitingPopulation);
    assert_eq!(population.alive_count(), 2);
    assert_eq!(interleaver.remaining(), 10);

    let first = population.iter().next().expect("tracked entity");
    assert!(population.notify_removed(first));
    let outcome = interleaver.advance(
        ms(6_000),
        2,
        &mut population,
        |template| world.spawn(template, GATE),
        &mut out,
    );

    assert_eq!(outcome, Dispatch::AwaitingPopulation);
    assert_eq!(spawn_log(&out).last(), Some(&(0, 2, ms(6_000))));
}

#[test]
fn failed_spawns_consume_slots_without_counting() {
    let missing = TemplateId::new(7);
    let mut world = world_with(&[]);
    let mut population = PopulationTracker::new();
    let mut out = Vec::new();
    let mut interleaver = StreamInterleaver::new(
        0,
        &[SpawnStream::new(missing, 3, ms(100))],
        Duration::ZERO,
        ms(150),
    );

    let outcome = interleaver.advance(
        ms(1_000),
        1,
        &mut population,
        |template| world.spawn(template, GATE),
        &mut out,
    );

    assert_eq!(outcome, Dispatch::Finished { at: ms(200) });
    assert!(interleaver.is_exhausted());
    assert_eq!(population.alive_count(), 0);
    let reasons: Vec<SpawnError> = out
        .iter()
        .filter_map(|event| match event {
            Event::SpawnFailed { reason, .. } => Some(*reason),
            _ => None,
        })
        .collect();
    assert_eq!(reasons, vec![SpawnError::MissingTemplate(missing); 3]);
}

#[test]
fn zero_count_streams_never_fire() {
    let template = TemplateId::new(1);
    let mut population = PopulationTracker::new();
    let mut out = Vec::new();
    let mut calls = 0;
    let mut interleaver = StreamInterleaver::new(
        0,
        &[SpawnStream::new(template, 0, ms(100))],
        ms(500),
        ms(150),
    );

    assert!(interleaver.is_exhausted());
    assert_eq!(interleaver.next_fire(), None);
    let outcome = interleaver.advance(
        ms(900),
        35,
        &mut population,
        |_| {
            calls += 1;
            Err(SpawnError::NoSpawnPoints)
        },
        &mut out,
    );

    assert_eq!(outcome, Dispatch::Finished { at: ms(500) });
    assert_eq!(calls, 0);
    assert!(out.is_empty());
}

#[test]
fn replays_are_identical_for_identical_clock_readings() {
    fn run() -> Vec<Event> {
        let templates = [TemplateId::new(1), TemplateId::new(2), TemplateId::new(3)];
        let mut world = world_with(&templates);
        let mut population = PopulationTracker::new();
        let mut out = Vec::new();
        let streams = [
            SpawnStream::new(templates[0], 4, ms(250)),
            SpawnStream::new(templates[1], 3, ms(90)),
            SpawnStream::new(templates[2], 2, ms(0)),
        ];
        let mut interleaver = StreamInterleaver::new(1, &streams, Duration::ZERO, ms(150));

        let mut now = Duration::ZERO;
        while !interleaver.is_exhausted() {
            now += ms(70);
            let _ = interleaver.advance(
                now,
                3,
                &mut population,
                |template| world.spawn(template, GATE),
                &mut out,
            );
            let oldest = population.iter().next();
            if let Some(oldest) = oldest {
                let _ = population.notify_removed(oldest);
            }
        }
        out
    }

    let first = run();
    assert_eq!(spawn_log(&first).len(), 9);
    assert_eq!(first, run());
}
