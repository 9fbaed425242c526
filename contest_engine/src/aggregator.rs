//! Global rankings of a topic out of the ratings of all its voters.

use log::{debug, info};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::builder::Builder;
use crate::config::*;
use crate::store::ContestStore;

/// Turns stored ratings into ballots and ballots into rankings.
///
/// Reads go through the store one call at a time: a ranking computed while
/// contests are being decided may miss the latest decisions.
pub struct RankingAggregator<S> {
    store: Arc<S>,
    method: RankingMethod,
}

impl<S: ContestStore> RankingAggregator<S> {
    pub fn new(store: Arc<S>, rules: &EngineRules) -> RankingAggregator<S> {
        RankingAggregator {
            store,
            method: rules.ranking_method,
        }
    }

    pub fn method(&self) -> RankingMethod {
        self.method
    }

    /// The candidates of the topic and one ballot per voter.
    ///
    /// A ballot lists the candidates the voter has rated, by decreasing
    /// score. Equal scores are ordered by candidate registration.
    pub fn ballots(&self, topic: TopicId) -> EngineResult<Builder<ItemId>> {
        let mappings = self.store.mappings(topic)?;
        let items: HashMap<MappingId, ItemId> = mappings.iter().map(|m| (m.id, m.item)).collect();
        let ratings = self.store.ratings_for_topic(topic)?;

        let mut by_voter: BTreeMap<VoterId, Vec<Rating>> = BTreeMap::new();
        for r in ratings {
            by_voter.entry(r.voter).or_default().push(r);
        }

        let candidates: Vec<ItemId> = mappings.iter().map(|m| m.item).collect();
        let mut builder = Builder::new().candidates(&candidates);
        for (voter, mut rs) in by_voter {
            rs.sort_by(|x, y| y.score.total_cmp(&x.score).then(x.mapping.cmp(&y.mapping)));
            // A mapping removed since the snapshot of the ratings is skipped.
            let ballot: Vec<ItemId> = rs.iter().filter_map(|r| items.get(&r.mapping).cloned()).collect();
            debug!("ballots: topic {}: voter {}: {:?}", topic, voter, ballot);
            builder.add_vote_simple(&ballot);
        }
        Ok(builder)
    }

    /// The full ranking of the topic, ties included. Empty when nobody has
    /// rated anything yet.
    pub fn placements(&self, topic: TopicId) -> EngineResult<Vec<Placement<ItemId>>> {
        let builder = self.ballots(topic)?;
        if builder.votes().is_empty() {
            return Ok(Vec::new());
        }
        info!(
            "Ranking topic {} with {:?}: {} candidates, {} ballots",
            topic,
            self.method,
            builder.get_candidates().len(),
            builder.num_ballots()
        );
        let res = match self.method {
            RankingMethod::Pairwise => builder.pairwise_ranking(),
            RankingMethod::RankedPreference => builder.full_ranked_preference().collect(),
        };
        Ok(res)
    }

    /// The best `count` items of the topic, best first. Tied items are
    /// listed by ascending id.
    pub fn top_options(&self, topic: TopicId, count: usize) -> EngineResult<Vec<Item>> {
        let top: Vec<ItemId> = self
            .placements(topic)?
            .iter()
            .flat_map(|p| p.members())
            .take(count)
            .collect();
        top.into_iter().map(|id| self.store.item(id)).collect()
    }

    pub fn condorcet_winner(&self, topic: TopicId) -> EngineResult<Option<Item>> {
        let builder = self.ballots(topic)?;
        if builder.votes().is_empty() {
            return Ok(None);
        }
        builder
            .condorcet_winner()
            .map(|id| self.store.item(id))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        topic: TopicId,
        items: Vec<Item>,
        mappings: Vec<CandidateMapping>,
    }

    fn fixture(labels: &[&str]) -> Fixture {
        let store = Arc::new(MemoryStore::default());
        let topic = store.create_topic("Colors").id;
        let items: Vec<Item> = labels.iter().map(|l| store.create_item(l)).collect();
        let mappings = items
            .iter()
            .map(|i| store.map_item(topic, i.id).unwrap())
            .collect();
        Fixture {
            store,
            topic,
            items,
            mappings,
        }
    }

    impl Fixture {
        fn rate(&self, voter: u64, idx: usize, score: f64) {
            let r = self
                .store
                .get_or_create_rating(self.mappings[idx].id, VoterId(voter))
                .unwrap();
            let c = self
                .store
                .open_or_create_contest(self.topic, VoterId(voter), |_| {
                    Ok((self.mappings[idx].id, self.mappings[(idx + 1) % self.mappings.len()].id))
                })
                .unwrap()
                .0;
            self.store
                .settle_contest(c.id, r.id, |c, _, _| {
                    Ok(if c.contestants[0] == r.id {
                        [score, 1000.0]
                    } else {
                        [1000.0, score]
                    })
                })
                .unwrap();
        }

        fn ids(&self, idx: &[usize]) -> Vec<ItemId> {
            idx.iter().map(|i| self.items[*i].id).collect()
        }
    }

    #[test]
    fn no_ratings_no_ranking() {
        let f = fixture(&["Blue", "Red"]);
        let agg = RankingAggregator::new(f.store.clone(), &EngineRules::DEFAULT_RULES);
        assert_eq!(agg.top_options(f.topic, 5), Ok(vec![]));
        assert_eq!(agg.placements(f.topic), Ok(vec![]));
        assert_eq!(agg.condorcet_winner(f.topic), Ok(None));
        assert!(agg.top_options(TopicId(999), 5).is_err());
    }

    #[test]
    fn ballots_follow_scores() {
        let f = fixture(&["Blue", "Red", "Green"]);
        f.rate(1, 2, 1200.0);
        let agg = RankingAggregator::new(f.store.clone(), &EngineRules::DEFAULT_RULES);
        let builder = agg.ballots(f.topic).unwrap();
        assert_eq!(builder.get_candidates(), f.ids(&[0, 1, 2]).as_slice());
        // Green 1200, Blue 1000 (created by the contest against Green).
        assert_eq!(builder.votes().len(), 1);
        assert_eq!(builder.votes()[0].candidates, f.ids(&[2, 0]));
    }

    #[test]
    fn top_options_flatten_ties() {
        let f = fixture(&["Blue", "Red", "Green"]);
        // Voter 1 ranks Red then Green, voter 2 Blue then Red.
        f.rate(1, 1, 1100.0);
        f.rate(2, 0, 1100.0);
        let agg = RankingAggregator::new(f.store.clone(), &EngineRules::DEFAULT_RULES);
        // Red beats Green 2-0 and ties with Blue. Blue and Green tie 1-1.
        let placements = agg.placements(f.topic).unwrap();
        assert_eq!(
            placements,
            vec![
                Placement::Single(f.items[1].id),
                Placement::Tied(f.ids(&[0, 2]).into_iter().collect())
            ]
        );
        let top = agg.top_options(f.topic, 2).unwrap();
        assert_eq!(top, vec![f.items[1].clone(), f.items[0].clone()]);
        assert_eq!(agg.top_options(f.topic, 10).unwrap().len(), 3);
        assert_eq!(agg.top_options(f.topic, 0).unwrap(), vec![]);
        assert_eq!(agg.condorcet_winner(f.topic), Ok(None));
    }

    #[test]
    fn ranked_preference_method() {
        let f = fixture(&["Blue", "Red", "Green"]);
        f.rate(1, 1, 1100.0);
        f.rate(2, 1, 1050.0);
        let rules = EngineRules {
            ranking_method: RankingMethod::RankedPreference,
            ..EngineRules::DEFAULT_RULES
        };
        let agg = RankingAggregator::new(f.store.clone(), &rules);
        assert_eq!(agg.method(), RankingMethod::RankedPreference);
        // Both voters list Red then Green; Blue is never rated.
        let top = agg.top_options(f.topic, 5).unwrap();
        assert_eq!(top, vec![f.items[1].clone(), f.items[2].clone()]);
        assert_eq!(agg.condorcet_winner(f.topic), Ok(Some(f.items[1].clone())));
    }
}
