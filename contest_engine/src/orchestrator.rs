//! Lifecycle of the contest a voter is currently looking at.
//!
//! Per (topic, voter), a contest goes from open to decided. Deciding a
//! contest leaves the voter without an open contest, so the next call to
//! [`ContestOrchestrator::get_or_create`] starts a new one.

use log::{info, warn};
use snafu::{ensure, OptionExt};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::*;
use crate::rating::RatingUpdater;
use crate::sampler::CandidateSampler;
use crate::store::ContestStore;

pub struct ContestOrchestrator<S, R> {
    store: Arc<S>,
    updater: RatingUpdater,
    sampler: Mutex<R>,
}

impl<S: ContestStore, R: CandidateSampler> ContestOrchestrator<S, R> {
    pub fn new(store: Arc<S>, rules: &EngineRules, sampler: R) -> ContestOrchestrator<S, R> {
        ContestOrchestrator {
            store,
            updater: RatingUpdater::new(rules),
            sampler: Mutex::new(sampler),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Access to the sampler, for instance to queue the next matchups of a
    /// scripted sampler.
    pub fn sampler(&self) -> MutexGuard<'_, R> {
        self.sampler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the open contest of `voter` in `topic`, or starts a new one
    /// between two distinct candidates picked by the sampler.
    pub fn get_or_create(&self, topic: TopicId, voter: VoterId) -> EngineResult<Contest> {
        let (contest, created) = self.store.open_or_create_contest(topic, voter, |mappings| {
            ensure!(
                mappings.len() >= 2,
                InsufficientCandidatesSnafu {
                    topic,
                    available: mappings.len()
                }
            );
            let pair = self.sampler().pick_pair(mappings);
            if pair.is_none() {
                warn!(
                    "get_or_create: sampler drew no pair among {} candidates of topic {}",
                    mappings.len(),
                    topic
                );
            }
            pair.context(NoPairDrawnSnafu {
                topic,
                available: mappings.len(),
            })
        })?;
        if created {
            info!(
                "Created contest {} for voter {} in topic {} between ratings {} and {}",
                contest.id, voter, topic, contest.contestants[0], contest.contestants[1]
            );
        }
        Ok(contest)
    }

    /// The items behind the two sides of a contest, in contestant order.
    pub fn contestants(&self, contest: ContestId) -> EngineResult<[Item; 2]> {
        let c = self.store.contest(contest)?;
        let [a, b] = c.contestants;
        Ok([self.contestant_item(a)?, self.contestant_item(b)?])
    }

    fn contestant_item(&self, rating: RatingId) -> EngineResult<Item> {
        let r = self.store.rating(rating)?;
        let m = self.store.mapping(r.mapping)?;
        self.store.item(m.item)
    }

    /// Decides `contest` in favour of the contestant standing for
    /// `winning_item` and updates both scores.
    pub fn record_winner(
        &self,
        contest: ContestId,
        winning_item: ItemId,
    ) -> EngineResult<Settlement> {
        let c = self.store.contest(contest)?;
        let mut winner: Option<RatingId> = None;
        for rid in c.contestants {
            let r = self.store.rating(rid)?;
            if self.store.mapping(r.mapping)?.item == winning_item {
                winner = Some(rid);
            }
        }
        let winner = winner.context(UnknownWinnerSnafu {
            contest,
            item: winning_item,
        })?;
        self.updater.update(self.store.as_ref(), contest, winner)
    }

    pub fn delete_contest(&self, contest: ContestId) -> EngineResult<()> {
        self.store.delete_contest(contest)
    }
}
