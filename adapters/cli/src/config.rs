//! Scenario file describing templates, cycle timing and the night catalogue.

use std::{collections::BTreeMap, fs, path::Path, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use nightfall_core::{
    EncounterPlan, NightBucket, NightPresetSet, SpawnPoint, SpawnStream, TemplateId, Wave,
};
use nightfall_system_cycle::Config as CycleConfig;
use nightfall_system_waves::{CleanupTarget, Config as SchedulerConfig, SpawnPointPolicy};
use serde::Deserialize;
use tracing::warn;

/// Fully resolved scenario ready to be simulated.
#[derive(Debug)]
pub(crate) struct Scenario {
    pub(crate) scheduler: SchedulerConfig,
    pub(crate) cycle: CycleConfig,
    pub(crate) templates: Vec<TemplateSpec>,
    pub(crate) presets: NightPresetSet,
}

/// Entity template registered with the world before the first frame.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct TemplateSpec {
    pub(crate) id: TemplateId,
    pub(crate) name: String,
    pub(crate) lifetime: Option<Duration>,
}

/// Loads the scenario stored at `path`.
///
/// `seed` feeds the random spawn-point policy when the file selects it.
pub(crate) fn load(path: &Path, seed: u64) -> Result<Scenario> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario at {}", path.display()))?;
    parse(&contents, seed).with_context(|| format!("invalid scenario {}", path.display()))
}

fn parse(contents: &str, seed: u64) -> Result<Scenario> {
    let file: ScenarioFile =
        toml::from_str(contents).context("failed to parse scenario toml contents")?;
    file.resolve(seed)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScenarioFile {
    #[serde(default)]
    scheduler: SchedulerSection,
    #[serde(default)]
    cycle: CycleSection,
    #[serde(default)]
    templates: Vec<TemplateEntry>,
    #[serde(default)]
    nights: Vec<NightEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SchedulerSection {
    max_alive: Option<u32>,
    stagger_ms: Option<u64>,
    cleanup_grace_ms: Option<u64>,
    cleanup_ceiling: Option<u32>,
    cleanup_divisor: Option<u32>,
    spawn_point_policy: PolicyEntry,
    spawn_points: Vec<SpawnPoint>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum PolicyEntry {
    #[default]
    Random,
    RoundRobin,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct CycleSection {
    day_ms: Option<u64>,
    night_ms: Option<u64>,
    night_spawn_delay_ms: Option<u64>,
    start_at_night: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TemplateEntry {
    name: String,
    #[serde(default)]
    lifetime_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NightEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    presets: Vec<PresetEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PresetEntry {
    name: String,
    #[serde(default)]
    waves: Vec<WaveEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WaveEntry {
    #[serde(default = "default_wave_name")]
    name: String,
    #[serde(default = "default_start_delay_ms")]
    start_delay_ms: u64,
    #[serde(default = "default_end_delay_ms")]
    end_delay_ms: u64,
    #[serde(default)]
    max_alive_override: u32,
    #[serde(default)]
    entries: Vec<StreamEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StreamEntry {
    template: String,
    #[serde(default = "default_count")]
    count: u32,
    #[serde(default = "default_interval_ms")]
    interval_ms: u64,
}

fn default_wave_name() -> String {
    "Wave".to_owned()
}

fn default_start_delay_ms() -> u64 {
    2_000
}

fn default_end_delay_ms() -> u64 {
    3_000
}

fn default_count() -> u32 {
    1
}

fn default_interval_ms() -> u64 {
    1_000
}

/// Maps template names to handles, minting unregistered handles for unknown names.
struct TemplateResolver {
    known: BTreeMap<String, TemplateId>,
    unknown: BTreeMap<String, TemplateId>,
}

impl TemplateResolver {
    fn resolve(&mut self, name: &str) -> Result<TemplateId> {
        if let Some(id) = self.known.get(name).or_else(|| self.unknown.get(name)) {
            return Ok(*id);
        }

        let next = self.known.len() + self.unknown.len() + 1;
        let id = TemplateId::new(u32::try_from(next).context("too many entity templates")?);
        warn!(
            template = name,
            id = id.get(),
            "unknown template; its spawns will fail"
        );
        let _ = self.unknown.insert(name.to_owned(), id);
        Ok(id)
    }
}

impl ScenarioFile {
    fn resolve(self, seed: u64) -> Result<Scenario> {
        let mut known = BTreeMap::new();
        let mut templates = Vec::with_capacity(self.templates.len());
        for (index, entry) in self.templates.into_iter().enumerate() {
            let id = TemplateId::new(
                u32::try_from(index + 1).context("too many entity templates")?,
            );
            if known.insert(entry.name.clone(), id).is_some() {
                bail!("duplicate template `{}`", entry.name);
            }
            templates.push(TemplateSpec {
                id,
                name: entry.name,
                lifetime: entry.lifetime_ms.map(Duration::from_millis),
            });
        }

        let mut resolver = TemplateResolver {
            known,
            unknown: BTreeMap::new(),
        };
        let mut nights = Vec::with_capacity(self.nights.len());
        for (index, night) in self.nights.into_iter().enumerate() {
            let mut presets = Vec::with_capacity(night.presets.len());
            for preset in night.presets {
                let plan = preset
                    .resolve(&mut resolver)
                    .with_context(|| format!("invalid preset in night {}", index + 1))?;
                presets.push(Arc::new(plan));
            }
            nights.push(NightBucket::new(night.name, presets));
        }
        if nights.is_empty() {
            warn!("scenario defines no nights");
        }

        Ok(Scenario {
            scheduler: self.scheduler.resolve(seed),
            cycle: self.cycle.resolve(),
            templates,
            presets: NightPresetSet::new(nights),
        })
    }
}

impl PresetEntry {
    fn resolve(self, resolver: &mut TemplateResolver) -> Result<EncounterPlan> {
        let mut waves = Vec::with_capacity(self.waves.len());
        for wave in self.waves {
            let mut streams = Vec::with_capacity(wave.entries.len());
            for entry in wave.entries {
                streams.push(SpawnStream::new(
                    resolver.resolve(&entry.template)?,
                    entry.count,
                    Duration::from_millis(entry.interval_ms),
                ));
            }
            waves.push(
                Wave::new(wave.name, streams)
                    .with_start_delay(Duration::from_millis(wave.start_delay_ms))
                    .with_end_delay(Duration::from_millis(wave.end_delay_ms))
                    .with_max_alive_override(wave.max_alive_override),
            );
        }
        Ok(EncounterPlan::new(self.name, waves))
    }
}

impl SchedulerSection {
    fn resolve(self, seed: u64) -> SchedulerConfig {
        if self.spawn_points.is_empty() {
            warn!("scenario defines no spawn points; waves will not dispatch");
        }

        let policy = match self.spawn_point_policy {
            PolicyEntry::Random => SpawnPointPolicy::Random { seed },
            PolicyEntry::RoundRobin => SpawnPointPolicy::RoundRobin,
        };
        let mut config = SchedulerConfig::new(self.spawn_points).with_spawn_point_policy(policy);

        if let Some(max_alive) = self.max_alive {
            config = config.with_max_alive(max_alive);
        }
        if let Some(stagger) = self.stagger_ms {
            config = config.with_stagger(Duration::from_millis(stagger));
        }
        if let Some(grace) = self.cleanup_grace_ms {
            config = config.with_cleanup_grace(Duration::from_millis(grace));
        }

        let target = config.cleanup_target();
        config.with_cleanup_target(CleanupTarget::new(
            self.cleanup_ceiling.unwrap_or(target.ceiling()),
            self.cleanup_divisor.unwrap_or(target.divisor()),
        ))
    }
}

impl CycleSection {
    fn resolve(self) -> CycleConfig {
        let defaults = CycleConfig::default();
        CycleConfig::new(
            self.day_ms.map_or(defaults.day(), Duration::from_millis),
            self.night_ms.map_or(defaults.night(), Duration::from_millis),
        )
        .with_night_spawn_delay(
            self.night_spawn_delay_ms
                .map_or(defaults.night_spawn_delay(), Duration::from_millis),
        )
        .with_start_at_night(self.start_at_night)
    }
}
