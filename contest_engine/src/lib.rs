//! Ratings and rankings out of pairwise contests.
//!
//! Voters are repeatedly shown two items of a topic and pick one. Each
//! decision moves an Elo-style score per (item, voter). Sorting one voter's
//! scores gives that voter's ballot, and the ballots of all voters are
//! combined into a global ranking with one of the social-choice algorithms
//! of this crate: instant-runoff, Condorcet or pairwise wins.
//!
//! The algorithms work on any candidate type and can be used directly:
//!
//! ```
//! use contest_engine::{instant_runoff, pairwise_ranking, Placement};
//!
//! let candidates = ["Blue", "Red", "Green"];
//! let ballots = vec![
//!     vec!["Red", "Blue", "Green"],
//!     vec!["Blue", "Red"],
//!     vec!["Blue", "Green", "Red"],
//!     vec!["Green", "Red"],
//!     vec!["Green", "Blue", "Red"],
//! ];
//! assert_eq!(instant_runoff(&candidates, &ballots)?, Placement::Single("Blue"));
//! assert_eq!(pairwise_ranking(&candidates, &ballots)[0], Placement::Single("Blue"));
//! # Ok::<(), contest_engine::EngineError>(())
//! ```
//!
//! See the [manual] for the complete flow with a store.

mod config;
use log::debug;
use snafu::ensure;

use std::{
    cmp::Reverse,
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    hash::Hash,
    iter::FusedIterator,
    ops::{Add, AddAssign},
};

pub mod aggregator;
pub mod builder;
pub mod manual;
pub mod orchestrator;
pub mod rating;
pub mod sampler;
pub mod store;

pub use crate::aggregator::RankingAggregator;
pub use crate::config::*;
pub use crate::orchestrator::ContestOrchestrator;
pub use crate::rating::{expected_score, RatingUpdater};
pub use crate::sampler::{CandidateSampler, RandomSampler, ScriptedSampler};
pub use crate::store::{ContestStore, MemoryStore};

// **** Private structures ****

type RoundId = u32;

/// Wide enough to hold the sum of any number of `u64` ballot weights.
#[derive(Eq, PartialEq, Debug, Clone, Copy, PartialOrd, Ord, Hash)]
struct VoteCount(u128);

impl VoteCount {
    const EMPTY: VoteCount = VoteCount(0);

    fn new(weight: u64) -> VoteCount {
        VoteCount(u128::from(weight))
    }
}

impl std::iter::Sum for VoteCount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(VoteCount::EMPTY, |acc, vc| acc + vc)
    }
}

impl AddAssign for VoteCount {
    fn add_assign(&mut self, rhs: VoteCount) {
        *self = *self + rhs;
    }
}

impl Add for VoteCount {
    type Output = VoteCount;
    fn add(self: VoteCount, rhs: VoteCount) -> VoteCount {
        VoteCount(self.0.saturating_add(rhs.0))
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
struct VoteInternal<C> {
    ranks: Vec<C>,
    count: VoteCount,
}

impl<C: Eq + Hash> VoteInternal<C> {
    /// The first listed candidate that is still in the running.
    fn first_valid<'a>(&'a self, still_valid: &HashSet<C>) -> Option<&'a C> {
        self.ranks.iter().find(|c| still_valid.contains(*c))
    }

    /// Which one of the two candidates this ballot lists first, if any.
    fn prefers<'a>(&'a self, a: &C, b: &C) -> Option<&'a C> {
        self.ranks.iter().find(|c| *c == a || *c == b)
    }
}

fn simple_votes<C: Clone>(ballots: &[Vec<C>]) -> Vec<VoteInternal<C>> {
    ballots
        .iter()
        .map(|b| VoteInternal {
            ranks: b.clone(),
            count: VoteCount::new(1),
        })
        .collect()
}

fn weighted_votes<C: Clone>(votes: &[Vote<C>]) -> Vec<VoteInternal<C>> {
    votes
        .iter()
        .filter(|v| v.count > 0)
        .map(|v| VoteInternal {
            ranks: v.candidates.clone(),
            count: VoteCount::new(v.count),
        })
        .collect()
}

// **** Instant-runoff ****

/// Runs an instant-runoff election.
///
/// Each round, every ballot counts for its first listed candidate that is
/// still running. A candidate with more than half of the votes of the round
/// wins. Otherwise all the candidates with the lowest count are removed,
/// unless every remaining candidate has the same count, in which case they
/// are returned together as a tie.
///
/// Candidates that no ballot supports in a round are dropped from the
/// running. Fails with [`EngineError::NoVotes`] when no ballot lists any of
/// the remaining candidates.
pub fn instant_runoff<C>(candidates: &[C], ballots: &[Vec<C>]) -> EngineResult<Placement<C>>
where
    C: Clone + Eq + Hash + Ord,
{
    run_instant_runoff(
        candidates.iter().cloned().collect(),
        &simple_votes(ballots),
    )
}

fn compute_tally<C>(votes: &[VoteInternal<C>], still_valid: &HashSet<C>) -> HashMap<C, VoteCount>
where
    C: Clone + Eq + Hash,
{
    // Unlike a registered election, candidates without a single vote do not
    // enter the tally at all.
    let mut tally: HashMap<C, VoteCount> = HashMap::new();
    for v in votes.iter() {
        if let Some(cid) = v.first_valid(still_valid) {
            *tally.entry(cid.clone()).or_insert(VoteCount::EMPTY) += v.count;
        }
    }
    tally
}

fn run_instant_runoff<C>(
    candidates: HashSet<C>,
    votes: &[VoteInternal<C>],
) -> EngineResult<Placement<C>>
where
    C: Clone + Eq + Hash + Ord,
{
    let mut still_valid = candidates;
    let mut round_id: RoundId = 0;
    loop {
        round_id += 1;
        let tally = compute_tally(votes, &still_valid);
        let total_count: VoteCount = tally.values().cloned().sum();
        debug!(
            "run_instant_runoff: round {:?}: {:?} candidates, {:?} votes in tally",
            round_id,
            still_valid.len(),
            total_count
        );
        ensure!(
            total_count > VoteCount::EMPTY,
            NoVotesSnafu {
                remaining: still_valid.len()
            }
        );

        let mut high: Option<(&C, VoteCount)> = None;
        let mut low_count = total_count;
        for (cid, &vc) in tally.iter() {
            if high.map_or(true, |(_, hc)| vc > hc) {
                high = Some((cid, vc));
            }
            if vc < low_count {
                low_count = vc;
            }
        }
        if let Some((leader, high_count)) = high {
            // Strict majority of the votes cast in this round.
            if high_count.0 > total_count.0 - high_count.0 {
                debug!(
                    "run_instant_runoff: round {:?}: majority with {:?} out of {:?}",
                    round_id, high_count, total_count
                );
                return Ok(Placement::Single(leader.clone()));
            }
            if low_count == high_count {
                debug!(
                    "run_instant_runoff: round {:?}: all {:?} remaining candidates tied at {:?}",
                    round_id,
                    tally.len(),
                    low_count
                );
                return Ok(Placement::from_group(tally.into_keys().collect()));
            }
        }

        still_valid = tally
            .into_iter()
            .filter_map(|(cid, vc)| if vc > low_count { Some(cid) } else { None })
            .collect();
    }
}

// **** Head to head ****

/// Counts how many ballots list `a` before `b` and the other way around.
/// Ballots listing neither are not counted.
fn head_to_head<C: Eq + Hash>(votes: &[VoteInternal<C>], a: &C, b: &C) -> (VoteCount, VoteCount) {
    let mut for_a = VoteCount::EMPTY;
    let mut for_b = VoteCount::EMPTY;
    for v in votes.iter() {
        match v.prefers(a, b) {
            Some(c) if c == a => for_a += v.count,
            Some(_) => for_b += v.count,
            None => {}
        }
    }
    (for_a, for_b)
}

fn distinct_sorted<C: Clone + Ord>(candidates: &[C]) -> Vec<C> {
    let set: BTreeSet<C> = candidates.iter().cloned().collect();
    set.into_iter().collect()
}

/// Finds the candidate that beats every other candidate head-to-head.
///
/// A matchup is won with a strict majority of the ballots that express a
/// preference between the two. Returns `None` when preferences are circular
/// or when some matchup is tied.
pub fn condorcet_winner<C>(candidates: &[C], ballots: &[Vec<C>]) -> Option<C>
where
    C: Clone + Eq + Hash + Ord,
{
    run_condorcet(&distinct_sorted(candidates), &simple_votes(ballots))
}

fn run_condorcet<C>(candidates: &[C], votes: &[VoteInternal<C>]) -> Option<C>
where
    C: Clone + Eq + Hash + Ord,
{
    let winner = candidates.iter().find(|&c| {
        candidates.iter().filter(|&o| o != c).all(|o| {
            let (wins, losses) = head_to_head(votes, c, o);
            wins > losses
        })
    });
    debug!("run_condorcet: {:?} candidates, winner found: {:?}", candidates.len(), winner.is_some());
    winner.cloned()
}

/// Ranks the candidates by the number of head-to-head matchups they win.
///
/// A tied matchup awards no win. Candidates with the same number of wins
/// share a [`Placement::Tied`] position.
pub fn pairwise_ranking<C>(candidates: &[C], ballots: &[Vec<C>]) -> Vec<Placement<C>>
where
    C: Clone + Eq + Hash + Ord,
{
    run_pairwise(&distinct_sorted(candidates), &simple_votes(ballots))
}

fn run_pairwise<C>(candidates: &[C], votes: &[VoteInternal<C>]) -> Vec<Placement<C>>
where
    C: Clone + Eq + Hash + Ord,
{
    let mut wins: Vec<u32> = vec![0; candidates.len()];
    for (i, a) in candidates.iter().enumerate() {
        for (j, b) in candidates.iter().enumerate().skip(i + 1) {
            let (for_a, for_b) = head_to_head(votes, a, b);
            if for_a > for_b {
                wins[i] += 1;
            } else if for_b > for_a {
                wins[j] += 1;
            }
        }
    }

    let mut by_wins: BTreeMap<Reverse<u32>, BTreeSet<C>> = BTreeMap::new();
    for (cid, w) in candidates.iter().zip(wins) {
        by_wins.entry(Reverse(w)).or_default().insert(cid.clone());
    }
    debug!("run_pairwise: groups by wins: {:?}", by_wins.keys().map(|w| w.0).collect::<Vec<_>>());
    by_wins.into_values().map(Placement::from_group).collect()
}

// **** Full ranked preference ****

/// Orders all the candidates by running instant-runoff again and again,
/// removing the winners of each run from the pool.
///
/// The ballots are copied when this function is called. Candidates that no
/// ballot ever lists are left out of the sequence.
pub fn full_ranked_preference<C>(candidates: &[C], ballots: &[Vec<C>]) -> RankedPreference<C>
where
    C: Clone + Eq + Hash + Ord,
{
    RankedPreference::new(candidates.iter().cloned().collect(), simple_votes(ballots))
}

/// Lazy sequence of placements, from best to worst. See
/// [`full_ranked_preference`].
#[derive(Debug, Clone)]
pub struct RankedPreference<C> {
    remaining: HashSet<C>,
    votes: Vec<VoteInternal<C>>,
    exhausted: bool,
}

impl<C> RankedPreference<C>
where
    C: Clone + Eq + Hash + Ord,
{
    fn new(remaining: HashSet<C>, votes: Vec<VoteInternal<C>>) -> Self {
        RankedPreference {
            remaining,
            votes,
            exhausted: false,
        }
    }
}

impl<C> Iterator for RankedPreference<C>
where
    C: Clone + Eq + Hash + Ord,
{
    type Item = Placement<C>;

    fn next(&mut self) -> Option<Placement<C>> {
        if self.exhausted || self.remaining.is_empty() {
            return None;
        }
        match run_instant_runoff(self.remaining.clone(), &self.votes) {
            Ok(placement) => {
                for c in placement.members() {
                    self.remaining.remove(&c);
                }
                Some(placement)
            }
            Err(e) => {
                debug!(
                    "RankedPreference: stopping with {:?} unranked candidates: {}",
                    self.remaining.len(),
                    e
                );
                self.exhausted = true;
                None
            }
        }
    }
}

impl<C> FusedIterator for RankedPreference<C> where C: Clone + Eq + Hash + Ord {}
