//! How the two sides of a new contest are chosen.

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use std::collections::VecDeque;

use crate::config::*;

/// Picks two distinct candidates for a new contest.
pub trait CandidateSampler: Send {
    /// Returns `None` if no pair can be picked out of `mappings`.
    fn pick_pair(&mut self, mappings: &[CandidateMapping]) -> Option<(MappingId, MappingId)>;
}

/// Uniform choice of two distinct candidates.
#[derive(Debug, Clone)]
pub struct RandomSampler {
    rng: StdRng,
}

impl RandomSampler {
    pub fn from_seed(seed: u64) -> RandomSampler {
        RandomSampler {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> RandomSampler {
        RandomSampler {
            rng: StdRng::from_entropy(),
        }
    }
}

impl CandidateSampler for RandomSampler {
    fn pick_pair(&mut self, mappings: &[CandidateMapping]) -> Option<(MappingId, MappingId)> {
        if mappings.len() < 2 {
            return None;
        }
        let picked = rand::seq::index::sample(&mut self.rng, mappings.len(), 2);
        Some((mappings[picked.index(0)].id, mappings[picked.index(1)].id))
    }
}

/// Plays back a fixed list of matchups, given as items.
///
/// Used to replay recorded sessions and in tests. Returns `None` once the
/// list is exhausted or when the next pair is not made of two candidates of
/// the topic.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSampler {
    queue: VecDeque<(ItemId, ItemId)>,
}

impl ScriptedSampler {
    pub fn new(pairs: &[(ItemId, ItemId)]) -> ScriptedSampler {
        ScriptedSampler {
            queue: pairs.iter().cloned().collect(),
        }
    }

    pub fn push(&mut self, first: ItemId, second: ItemId) {
        self.queue.push_back((first, second));
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl CandidateSampler for ScriptedSampler {
    fn pick_pair(&mut self, mappings: &[CandidateMapping]) -> Option<(MappingId, MappingId)> {
        let (first, second) = self.queue.pop_front()?;
        let find = |item: ItemId| mappings.iter().find(|m| m.item == item).map(|m| m.id);
        match (find(first), find(second)) {
            (Some(a), Some(b)) if a != b => {
                debug!("ScriptedSampler: picked items {} and {}", first, second);
                Some((a, b))
            }
            _ => {
                warn!(
                    "ScriptedSampler: items {} and {} are not two candidates of the topic",
                    first, second
                );
                None
            }
        }
    }
}
