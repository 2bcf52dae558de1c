//! Immutable encounter plan data handed to the wave scheduler.

use std::{num::NonZeroU32, sync::Arc, time::Duration};

use crate::TemplateId;

/// A single repeating spawn source within a wave.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpawnStream {
    template: TemplateId,
    count: u32,
    interval: Duration,
}

impl SpawnStream {
    /// Creates a stream that spawns `count` instances of `template`, `interval` apart.
    #[must_use]
    pub const fn new(template: TemplateId, count: u32, interval: Duration) -> Self {
        Self {
            template,
            count,
            interval,
        }
    }

    /// Template instantiated by every spawn of the stream.
    #[must_use]
    pub const fn template(&self) -> TemplateId {
        self.template
    }

    /// Total spawns the stream performs within its wave.
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// Minimum time between two spawns of the stream.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }
}

/// One ordered phase of an encounter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Wave {
    name: String,
    start_delay: Duration,
    end_delay: Duration,
    max_alive_override: Option<NonZeroU32>,
    streams: Vec<SpawnStream>,
}

impl Wave {
    /// Creates a wave without delays or population override.
    #[must_use]
    pub fn new(name: impl Into<String>, streams: Vec<SpawnStream>) -> Self {
        Self {
            name: name.into(),
            start_delay: Duration::ZERO,
            end_delay: Duration::ZERO,
            max_alive_override: None,
            streams,
        }
    }

    /// Sets the pause observed before the wave's dispatch begins.
    #[must_use]
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    /// Sets the pause observed after dispatch finishes and before the cleanup wait.
    #[must_use]
    pub fn with_end_delay(mut self, delay: Duration) -> Self {
        self.end_delay = delay;
        self
    }

    /// Overrides the scheduler's population cap for this wave. Zero clears the override.
    #[must_use]
    pub fn with_max_alive_override(mut self, cap: u32) -> Self {
        self.max_alive_override = NonZeroU32::new(cap);
        self
    }

    /// Display name of the wave.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pause observed before dispatch.
    #[must_use]
    pub const fn start_delay(&self) -> Duration {
        self.start_delay
    }

    /// Pause observed after dispatch.
    #[must_use]
    pub const fn end_delay(&self) -> Duration {
        self.end_delay
    }

    /// Population cap override, if any.
    #[must_use]
    pub const fn max_alive_override(&self) -> Option<NonZeroU32> {
        self.max_alive_override
    }

    /// Streams dispatched by the wave in declaration order.
    #[must_use]
    pub fn streams(&self) -> &[SpawnStream] {
        &self.streams
    }

    /// Resolves the population cap that applies while this wave is active.
    ///
    /// The override wins when present; otherwise the scheduler default is used,
    /// floored at one so dispatch can always make progress.
    #[must_use]
    pub fn effective_cap(&self, default_cap: u32) -> u32 {
        self.max_alive_override
            .map_or(default_cap.max(1), NonZeroU32::get)
    }

    /// Total number of spawn slots across all streams.
    #[must_use]
    pub fn total_spawns(&self) -> u64 {
        self.streams
            .iter()
            .map(|stream| u64::from(stream.count()))
            .sum()
    }
}

/// Ordered list of waves that make up one encounter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncounterPlan {
    name: String,
    waves: Vec<Wave>,
}

impl EncounterPlan {
    /// Creates a plan from its waves.
    #[must_use]
    pub fn new(name: impl Into<String>, waves: Vec<Wave>) -> Self {
        Self {
            name: name.into(),
            waves,
        }
    }

    /// Display name of the plan.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waves in execution order.
    #[must_use]
    pub fn waves(&self) -> &[Wave] {
        &self.waves
    }

    /// Total number of spawn slots across all waves.
    #[must_use]
    pub fn total_spawns(&self) -> u64 {
        self.waves.iter().map(Wave::total_spawns).sum()
    }
}

/// Candidate plans for a single night; one is picked per run.
#[derive(Clone, Debug, Default)]
pub struct NightBucket {
    name: String,
    presets: Vec<Arc<EncounterPlan>>,
}

impl NightBucket {
    /// Creates a bucket holding the provided candidate plans.
    #[must_use]
    pub fn new(name: impl Into<String>, presets: Vec<Arc<EncounterPlan>>) -> Self {
        Self {
            name: name.into(),
            presets,
        }
    }

    /// Optional label of the night.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Candidate plans in declaration order.
    #[must_use]
    pub fn presets(&self) -> &[Arc<EncounterPlan>] {
        &self.presets
    }
}

/// Catalogue of plans indexed by night number.
#[derive(Clone, Debug, Default)]
pub struct NightPresetSet {
    nights: Vec<NightBucket>,
}

impl NightPresetSet {
    /// Creates a preset set from per-night buckets.
    #[must_use]
    pub fn new(nights: Vec<NightBucket>) -> Self {
        Self { nights }
    }

    /// Number of nights described by the set.
    #[must_use]
    pub fn night_count(&self) -> usize {
        self.nights.len()
    }

    /// Bucket for `night_index`, clamped to the last defined night.
    #[must_use]
    pub fn bucket(&self, night_index: usize) -> Option<&NightBucket> {
        let last = self.nights.len().checked_sub(1)?;
        self.nights.get(night_index.min(last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(count: u32) -> SpawnStream {
        SpawnStream::new(TemplateId::new(1), count, Duration::from_secs(1))
    }

    #[test]
    fn effective_cap_prefers_positive_override() {
        let wave = Wave::new("w", vec![stream(3)]).with_max_alive_override(6);
        assert_eq!(wave.effective_cap(35), 6);
    }

    #[test]
    fn zero_override_falls_back_to_default() {
        let wave = Wave::new("w", vec![stream(3)]).with_max_alive_override(0);
        assert_eq!(wave.max_alive_override(), None);
        assert_eq!(wave.effective_cap(35), 35);
    }

    #[test]
    fn default_cap_is_floored_at_one() {
        let wave = Wave::new("w", Vec::new());
        assert_eq!(wave.effective_cap(0), 1);
    }

    #[test]
    fn totals_sum_every_stream() {
        let plan = EncounterPlan::new(
            "night",
            vec![
                Wave::new("a", vec![stream(3), stream(2)]),
                Wave::new("b", vec![stream(0), stream(7)]),
            ],
        );
        assert_eq!(plan.waves()[0].total_spawns(), 5);
        assert_eq!(plan.total_spawns(), 12);
    }

    #[test]
    fn bucket_lookup_clamps_to_last_night() {
        let plan = Arc::new(EncounterPlan::new("only", Vec::new()));
        let set = NightPresetSet::new(vec![
            NightBucket::new("first", vec![Arc::clone(&plan)]),
            NightBucket::new("second", Vec::new()),
        ]);

        assert_eq!(set.night_count(), 2);
        assert_eq!(set.bucket(0).map(NightBucket::name), Some("first"));
        assert_eq!(set.bucket(9).map(NightBucket::name), Some("second"));
        assert!(NightPresetSet::default().bucket(0).is_none());
    }
}
