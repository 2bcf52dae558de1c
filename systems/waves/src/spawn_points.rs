//! Spawn-point selection used when a stream fires.

use nightfall_core::SpawnPoint;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seed used by [`SpawnPointPolicy::default`].
pub const DEFAULT_SPAWN_POINT_SEED: u64 = 0x6e69_6768_7466_616c;

/// Strategy used to pick a spawn point for each spawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpawnPointPolicy {
    /// Cycles through the configured points in declaration order.
    RoundRobin,
    /// Picks a point uniformly at random from a seeded generator.
    Random {
        /// Seed of the deterministic generator.
        seed: u64,
    },
}

impl Default for SpawnPointPolicy {
    fn default() -> Self {
        Self::Random {
            seed: DEFAULT_SPAWN_POINT_SEED,
        }
    }
}

#[derive(Clone, Debug)]
enum Mode {
    RoundRobin { next: usize },
    Random { rng: ChaCha8Rng },
}

#[derive(Clone, Debug)]
pub(crate) struct SpawnPointSelector {
    points: Vec<SpawnPoint>,
    mode: Mode,
}

impl SpawnPointSelector {
    pub(crate) fn new(points: Vec<SpawnPoint>, policy: SpawnPointPolicy) -> Self {
        let mode = match policy {
            SpawnPointPolicy::RoundRobin => Mode::RoundRobin { next: 0 },
            SpawnPointPolicy::Random { seed } => Mode::Random {
                rng: ChaCha8Rng::seed_from_u64(seed),
            },
        };
        Self { points, mode }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub(crate) fn points(&self) -> &[SpawnPoint] {
        &self.points
    }

    pub(crate) fn select(&mut self) -> Option<SpawnPoint> {
        if self.points.is_empty() {
            return None;
        }

        let index = match &mut self.mode {
            Mode::RoundRobin { next } => {
                let index = *next % self.points.len();
                *next = (index + 1) % self.points.len();
                index
            }
            Mode::Random { rng } => rng.gen_range(0..self.points.len()),
        };
        self.points.get(index).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points() -> Vec<SpawnPoint> {
        vec![
            SpawnPoint::new(0.0, 0.0, 0.0),
            SpawnPoint::new(5.0, 0.0, 0.0),
            SpawnPoint::new(0.0, 5.0, 1.0),
        ]
    }

    #[test]
    fn round_robin_cycles_in_order() {
        let mut selector = SpawnPointSelector::new(points(), SpawnPointPolicy::RoundRobin);
        let picked: Vec<f32> = (0..4)
            .filter_map(|_| selector.select())
            .map(|point| point.x())
            .collect();
        assert_eq!(picked, vec![0.0, 5.0, 0.0, 0.0]);
        assert_eq!(selector.points().len(), 3);
    }

    #[test]
    fn random_selection_is_reproducible() {
        let policy = SpawnPointPolicy::Random { seed: 42 };
        let mut first = SpawnPointSelector::new(points(), policy);
        let mut second = SpawnPointSelector::new(points(), policy);

        for _ in 0..32 {
            let picked = first.select();
            assert!(picked.is_some());
            assert_eq!(picked, second.select());
        }
    }

    #[test]
    fn empty_selector_yields_nothing() {
        let mut selector = SpawnPointSelector::new(Vec::new(), SpawnPointPolicy::default());
        assert!(selector.is_empty());
        assert_eq!(selector.select(), None);
    }
}
