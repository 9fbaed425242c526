use crate::config::*;
use crate::{
    distinct_sorted, run_condorcet, run_instant_runoff, run_pairwise, weighted_votes,
    RankedPreference,
};

use std::hash::Hash;

/// A builder for assembling candidates and ballots before running one of
/// the social-choice algorithms.
///
/// Weighted votes are counted as many times as their weight, without being
/// copied.
///
/// ```
/// use contest_engine::builder::Builder;
/// use contest_engine::Placement;
///
/// let mut builder = Builder::new().candidates(&["Anna", "Bob", "Clara"]);
///
/// builder.add_vote_simple(&["Anna", "Clara"]);
/// builder.add_vote(&["Bob", "Clara"], 2);
/// builder.add_vote(&["Clara", "Anna"], 2);
///
/// // Anna drops out first and her vote goes to Clara.
/// assert_eq!(builder.instant_runoff()?, Placement::Single("Clara"));
/// # Ok::<(), contest_engine::EngineError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Builder<C> {
    pub(crate) _candidates: Vec<C>,
    pub(crate) _votes: Vec<Vote<C>>,
}

impl<C> Default for Builder<C> {
    fn default() -> Self {
        Builder {
            _candidates: Vec::new(),
            _votes: Vec::new(),
        }
    }
}

impl<C> Builder<C>
where
    C: Clone + Eq + Hash + Ord,
{
    pub fn new() -> Builder<C> {
        Builder::default()
    }

    /// Sets the candidates. The votes already added are kept.
    pub fn candidates(self, cands: &[C]) -> Builder<C> {
        Builder {
            _candidates: cands.to_vec(),
            _votes: self._votes,
        }
    }

    /// Adds a single ballot.
    pub fn add_vote_simple(&mut self, candidates: &[C]) {
        self.add_vote(candidates, 1)
    }

    /// Adds a ballot, with a potential weight attached to it.
    ///
    /// candidates: the choices made by the voter, most preferred first. Names that are not
    /// candidates are ignored when counting.
    pub fn add_vote(&mut self, candidates: &[C], count: u64) {
        self.add_vote_2(&Vote {
            candidates: candidates.to_vec(),
            count,
        })
    }

    pub fn add_vote_2(&mut self, vote: &Vote<C>) {
        self._votes.push(vote.clone());
    }

    pub fn get_candidates(&self) -> &[C] {
        &self._candidates
    }

    pub fn votes(&self) -> &[Vote<C>] {
        &self._votes
    }

    /// The number of ballots, counting weights. Saturates at `u64::MAX`.
    pub fn num_ballots(&self) -> u64 {
        self._votes
            .iter()
            .fold(0u64, |acc, v| acc.saturating_add(v.count))
    }

    pub fn instant_runoff(&self) -> EngineResult<Placement<C>> {
        run_instant_runoff(
            self._candidates.iter().cloned().collect(),
            &weighted_votes(&self._votes),
        )
    }

    pub fn condorcet_winner(&self) -> Option<C> {
        run_condorcet(
            &distinct_sorted(&self._candidates),
            &weighted_votes(&self._votes),
        )
    }

    pub fn pairwise_ranking(&self) -> Vec<Placement<C>> {
        run_pairwise(
            &distinct_sorted(&self._candidates),
            &weighted_votes(&self._votes),
        )
    }

    pub fn full_ranked_preference(&self) -> RankedPreference<C> {
        RankedPreference::new(
            self._candidates.iter().cloned().collect(),
            weighted_votes(&self._votes),
        )
    }
}
