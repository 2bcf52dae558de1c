#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Day/night clock that announces when encounters should begin and end.
//!
//! Every cycle runs through three phases. Day lasts for the configured day
//! duration, dusk holds the night back for the spawn delay, and night lasts
//! for the configured night duration. [`Event::NightStarted`] is emitted when
//! dusk ends and [`Event::DayStarted`] whenever a day begins.

use std::time::Duration;

use nightfall_core::Event;
use tracing::info;

/// Shortest day or night the gate accepts.
pub const MIN_PHASE_DURATION: Duration = Duration::from_millis(1);

/// Configuration parameters required to construct the cycle gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    day: Duration,
    night: Duration,
    night_spawn_delay: Duration,
    start_at_night: bool,
}

impl Config {
    /// Creates a configuration with the provided day and night durations.
    #[must_use]
    pub const fn new(day: Duration, night: Duration) -> Self {
        Self {
            day,
            night,
            night_spawn_delay: Duration::from_secs(5),
            start_at_night: false,
        }
    }

    /// Overrides how long dusk holds the night back.
    #[must_use]
    pub const fn with_night_spawn_delay(mut self, delay: Duration) -> Self {
        self.night_spawn_delay = delay;
        self
    }

    /// Starts the first cycle at dusk instead of at day.
    #[must_use]
    pub const fn with_start_at_night(mut self, start_at_night: bool) -> Self {
        self.start_at_night = start_at_night;
        self
    }

    /// Duration of a day.
    #[must_use]
    pub const fn day(&self) -> Duration {
        self.day
    }

    /// Duration of a night.
    #[must_use]
    pub const fn night(&self) -> Duration {
        self.night
    }

    /// Delay between nightfall and the night signal.
    #[must_use]
    pub const fn night_spawn_delay(&self) -> Duration {
        self.night_spawn_delay
    }

    /// Whether the first cycle starts at dusk.
    #[must_use]
    pub const fn start_at_night(&self) -> bool {
        self.start_at_night
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Duration::from_secs(90), Duration::from_secs(90))
    }
}

/// Phase of the day/night cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CyclePhase {
    /// Daylight; no encounter runs.
    Day,
    /// Night fell but the night signal has not been raised yet.
    Dusk,
    /// An encounter is expected to run.
    Night,
}

/// Pure system that advances the day/night clock.
#[derive(Debug)]
pub struct CycleGate {
    day: Duration,
    night: Duration,
    night_spawn_delay: Duration,
    phase: CyclePhase,
    remaining: Duration,
    day_number: u32,
    announced: bool,
}

impl CycleGate {
    /// Creates a gate using the supplied configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let day = config.day.max(MIN_PHASE_DURATION);
        let night = config.night.max(MIN_PHASE_DURATION);
        let (phase, remaining) = if config.start_at_night {
            (CyclePhase::Dusk, config.night_spawn_delay)
        } else {
            (CyclePhase::Day, day)
        };

        Self {
            day,
            night,
            night_spawn_delay: config.night_spawn_delay,
            phase,
            remaining,
            day_number: 1,
            announced: false,
        }
    }

    /// Consumes events and emits cycle transitions.
    ///
    /// The first call announces the initial day. A cleared encounter ends the
    /// night early; a lost round resets the cycle to the first day.
    pub fn handle(&mut self, events: &[Event], out: &mut Vec<Event>) {
        if !self.announced {
            self.announced = true;
            if self.phase == CyclePhase::Day {
                info!(day = self.day_number, "day started");
                out.push(Event::DayStarted);
            }
        }

        for event in events {
            match event {
                Event::TimeAdvanced { dt } => self.advance(*dt, out),
                Event::EncounterCleared { .. } if self.phase != CyclePhase::Day => {
                    self.start_day(out);
                }
                Event::RoundLost => {
                    self.day_number = 0;
                    self.start_day(out);
                }
                _ => {}
            }
        }
    }

    fn advance(&mut self, dt: Duration, out: &mut Vec<Event>) {
        let mut dt = dt;
        loop {
            if dt < self.remaining {
                self.remaining -= dt;
                return;
            }
            dt -= self.remaining;

            match self.phase {
                CyclePhase::Day => {
                    self.phase = CyclePhase::Dusk;
                    self.remaining = self.night_spawn_delay;
                }
                CyclePhase::Dusk => {
                    self.phase = CyclePhase::Night;
                    self.remaining = self.night;
                    info!(day = self.day_number, "night started");
                    out.push(Event::NightStarted);
                }
                CyclePhase::Night => self.start_day(out),
            }
        }
    }

    fn start_day(&mut self, out: &mut Vec<Event>) {
        self.phase = CyclePhase::Day;
        self.remaining = self.day;
        self.day_number = self.day_number.saturating_add(1);
        info!(day = self.day_number, "day started");
        out.push(Event::DayStarted);
    }

    /// Current phase of the cycle.
    #[must_use]
    pub const fn phase(&self) -> CyclePhase {
        self.phase
    }

    /// Time left in the current phase.
    #[must_use]
    pub const fn remaining(&self) -> Duration {
        self.remaining
    }

    /// One-based number of the current day.
    #[must_use]
    pub const fn day_number(&self) -> u32 {
        self.day_number
    }

    /// Reports whether night has fallen, including dusk.
    #[must_use]
    pub fn is_night(&self) -> bool {
        self.phase != CyclePhase::Day
    }
}
