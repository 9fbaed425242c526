//! Repository interface for items, topics, ratings and contests, and an
//! in-memory implementation.
//!
//! Every method of [`ContestStore`] is one transaction. The methods taking a
//! closure run it inside that transaction, so that reading the current
//! state, validating it and writing the result cannot interleave with
//! another writer.
//!
//! Deletions cascade: an item or a topic takes its candidate mappings with
//! it, a mapping takes its ratings, and a rating takes every contest it
//! takes part in.

use log::{debug, info};
use snafu::{ensure, OptionExt};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::*;

pub trait ContestStore: Send + Sync {
    fn create_topic(&self, label: &str) -> Topic;
    fn topic(&self, id: TopicId) -> EngineResult<Topic>;
    fn delete_topic(&self, id: TopicId) -> EngineResult<CascadeReport>;

    fn create_item(&self, label: &str) -> Item;
    fn item(&self, id: ItemId) -> EngineResult<Item>;
    fn rename_item(&self, id: ItemId, label: &str) -> EngineResult<Item>;
    fn delete_item(&self, id: ItemId) -> EngineResult<CascadeReport>;

    /// Registers `item` as a candidate of `topic`.
    fn map_item(&self, topic: TopicId, item: ItemId) -> EngineResult<CandidateMapping>;
    fn unmap_item(&self, topic: TopicId, item: ItemId) -> EngineResult<CascadeReport>;
    fn mapping(&self, id: MappingId) -> EngineResult<CandidateMapping>;
    /// All the candidates of a topic, by ascending id.
    fn mappings(&self, topic: TopicId) -> EngineResult<Vec<CandidateMapping>>;

    fn rating(&self, id: RatingId) -> EngineResult<Rating>;
    /// Returns the rating of `voter` for `mapping`, creating it with the
    /// default score if needed.
    fn get_or_create_rating(&self, mapping: MappingId, voter: VoterId) -> EngineResult<Rating>;
    /// All the ratings of all the voters for the candidates of a topic.
    fn ratings_for_topic(&self, topic: TopicId) -> EngineResult<Vec<Rating>>;
    fn delete_rating(&self, id: RatingId) -> EngineResult<CascadeReport>;

    fn contest(&self, id: ContestId) -> EngineResult<Contest>;
    fn contests_for_topic(&self, topic: TopicId) -> EngineResult<Vec<Contest>>;
    /// Returns the open contest of `voter` in `topic`. If there is none,
    /// `pick` chooses two candidates among the mappings of the topic and a
    /// new contest is created between them, with their ratings created as
    /// needed. The boolean is true if the contest was created.
    fn open_or_create_contest<F>(
        &self,
        topic: TopicId,
        voter: VoterId,
        pick: F,
    ) -> EngineResult<(Contest, bool)>
    where
        F: FnOnce(&[CandidateMapping]) -> EngineResult<(MappingId, MappingId)>;
    /// Loads the contest and its two contestants, lets `settle` compute the
    /// new scores (in contestant order) and stores them together with
    /// `winner`. Nothing is written if `settle` fails.
    fn settle_contest<F>(
        &self,
        contest: ContestId,
        winner: RatingId,
        settle: F,
    ) -> EngineResult<Settlement>
    where
        F: FnOnce(&Contest, &Rating, &Rating) -> EngineResult<[f64; 2]>;
    fn delete_contest(&self, id: ContestId) -> EngineResult<()>;
}

#[derive(Debug, Default)]
struct Tables {
    last_id: u64,
    topics: BTreeMap<TopicId, Topic>,
    items: BTreeMap<ItemId, Item>,
    mappings: BTreeMap<MappingId, CandidateMapping>,
    ratings: BTreeMap<RatingId, Rating>,
    contests: BTreeMap<ContestId, Contest>,
}

impl Tables {
    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    fn topic_mappings(&self, topic: TopicId) -> Vec<CandidateMapping> {
        self.mappings
            .values()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    fn get_or_create_rating(
        &mut self,
        mapping: MappingId,
        voter: VoterId,
        default_score: f64,
    ) -> Rating {
        if let Some(r) = self
            .ratings
            .values()
            .find(|r| r.mapping == mapping && r.voter == voter)
        {
            return *r;
        }
        let rating = Rating {
            id: RatingId(self.next_id()),
            mapping,
            voter,
            score: default_score,
        };
        debug!("get_or_create_rating: created {:?}", rating);
        self.ratings.insert(rating.id, rating);
        rating
    }

    fn remove_contests(&mut self, ratings: &BTreeSet<RatingId>) -> usize {
        let before = self.contests.len();
        self.contests
            .retain(|_, c| !c.contestants.iter().any(|r| ratings.contains(r)));
        before - self.contests.len()
    }

    fn remove_ratings(&mut self, ratings: BTreeSet<RatingId>, report: &mut CascadeReport) {
        report.contests += self.remove_contests(&ratings);
        let before = self.ratings.len();
        self.ratings.retain(|id, _| !ratings.contains(id));
        report.ratings += before - self.ratings.len();
    }

    fn remove_mappings(&mut self, mappings: BTreeSet<MappingId>) -> CascadeReport {
        let mut report = CascadeReport::default();
        let ratings: BTreeSet<RatingId> = self
            .ratings
            .values()
            .filter(|r| mappings.contains(&r.mapping))
            .map(|r| r.id)
            .collect();
        self.remove_ratings(ratings, &mut report);
        let before = self.mappings.len();
        self.mappings.retain(|id, _| !mappings.contains(id));
        report.mappings = before - self.mappings.len();
        report
    }
}

/// A [`ContestStore`] held in memory behind a single lock.
#[derive(Debug)]
pub struct MemoryStore {
    default_score: f64,
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new(rules: &EngineRules) -> MemoryStore {
        MemoryStore {
            default_score: rules.default_score,
            tables: Mutex::new(Tables::default()),
        }
    }

    // Every transaction validates before it mutates, so the tables are
    // consistent even if a previous holder of the lock panicked.
    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new(&EngineRules::DEFAULT_RULES)
    }
}

fn ensure_topic(t: &Tables, topic: TopicId) -> EngineResult<()> {
    ensure!(t.topics.contains_key(&topic), UnknownTopicSnafu { id: topic });
    Ok(())
}

impl ContestStore for MemoryStore {
    fn create_topic(&self, label: &str) -> Topic {
        let mut t = self.lock();
        let topic = Topic {
            id: TopicId(t.next_id()),
            label: label.to_string(),
        };
        t.topics.insert(topic.id, topic.clone());
        topic
    }

    fn topic(&self, id: TopicId) -> EngineResult<Topic> {
        self.lock()
            .topics
            .get(&id)
            .cloned()
            .context(UnknownTopicSnafu { id })
    }

    fn delete_topic(&self, id: TopicId) -> EngineResult<CascadeReport> {
        let mut t = self.lock();
        t.topics.remove(&id).context(UnknownTopicSnafu { id })?;
        let mappings = t.topic_mappings(id).iter().map(|m| m.id).collect();
        let mut report = t.remove_mappings(mappings);
        // Contests keep a reference to their topic as well.
        let before = t.contests.len();
        t.contests.retain(|_, c| c.topic != id);
        report.contests += before - t.contests.len();
        info!("Deleted topic {}: {:?}", id, report);
        Ok(report)
    }

    fn create_item(&self, label: &str) -> Item {
        let mut t = self.lock();
        let item = Item {
            id: ItemId(t.next_id()),
            label: label.to_string(),
        };
        t.items.insert(item.id, item.clone());
        item
    }

    fn item(&self, id: ItemId) -> EngineResult<Item> {
        self.lock()
            .items
            .get(&id)
            .cloned()
            .context(UnknownItemSnafu { id })
    }

    fn rename_item(&self, id: ItemId, label: &str) -> EngineResult<Item> {
        let mut t = self.lock();
        let item = t.items.get_mut(&id).context(UnknownItemSnafu { id })?;
        item.label = label.to_string();
        Ok(item.clone())
    }

    fn delete_item(&self, id: ItemId) -> EngineResult<CascadeReport> {
        let mut t = self.lock();
        t.items.remove(&id).context(UnknownItemSnafu { id })?;
        let mappings = t
            .mappings
            .values()
            .filter(|m| m.item == id)
            .map(|m| m.id)
            .collect();
        let report = t.remove_mappings(mappings);
        info!("Deleted item {}: {:?}", id, report);
        Ok(report)
    }

    fn map_item(&self, topic: TopicId, item: ItemId) -> EngineResult<CandidateMapping> {
        let mut t = self.lock();
        ensure_topic(&t, topic)?;
        ensure!(t.items.contains_key(&item), UnknownItemSnafu { id: item });
        ensure!(
            !t.mappings
                .values()
                .any(|m| m.topic == topic && m.item == item),
            DuplicateMappingSnafu { topic, item }
        );
        let mapping = CandidateMapping {
            id: MappingId(t.next_id()),
            topic,
            item,
        };
        t.mappings.insert(mapping.id, mapping);
        Ok(mapping)
    }

    fn unmap_item(&self, topic: TopicId, item: ItemId) -> EngineResult<CascadeReport> {
        let mut t = self.lock();
        ensure_topic(&t, topic)?;
        let mapping = t
            .mappings
            .values()
            .find(|m| m.topic == topic && m.item == item)
            .map(|m| m.id)
            .context(UnknownItemSnafu { id: item })?;
        let report = t.remove_mappings(BTreeSet::from([mapping]));
        info!("Removed item {} from topic {}: {:?}", item, topic, report);
        Ok(report)
    }

    fn mapping(&self, id: MappingId) -> EngineResult<CandidateMapping> {
        self.lock()
            .mappings
            .get(&id)
            .cloned()
            .context(UnknownMappingSnafu { id })
    }

    fn mappings(&self, topic: TopicId) -> EngineResult<Vec<CandidateMapping>> {
        let t = self.lock();
        ensure_topic(&t, topic)?;
        Ok(t.topic_mappings(topic))
    }

    fn rating(&self, id: RatingId) -> EngineResult<Rating> {
        self.lock()
            .ratings
            .get(&id)
            .cloned()
            .context(UnknownRatingSnafu { id })
    }

    fn get_or_create_rating(&self, mapping: MappingId, voter: VoterId) -> EngineResult<Rating> {
        let mut t = self.lock();
        ensure!(
            t.mappings.contains_key(&mapping),
            UnknownMappingSnafu { id: mapping }
        );
        Ok(t.get_or_create_rating(mapping, voter, self.default_score))
    }

    fn ratings_for_topic(&self, topic: TopicId) -> EngineResult<Vec<Rating>> {
        let t = self.lock();
        ensure_topic(&t, topic)?;
        let mappings: BTreeSet<MappingId> = t.topic_mappings(topic).iter().map(|m| m.id).collect();
        Ok(t.ratings
            .values()
            .filter(|r| mappings.contains(&r.mapping))
            .cloned()
            .collect())
    }

    fn delete_rating(&self, id: RatingId) -> EngineResult<CascadeReport> {
        let mut t = self.lock();
        ensure!(t.ratings.contains_key(&id), UnknownRatingSnafu { id });
        let mut report = CascadeReport::default();
        t.remove_ratings(BTreeSet::from([id]), &mut report);
        // The rating itself is not part of the cascade.
        report.ratings -= 1;
        info!("Deleted rating {}: {:?}", id, report);
        Ok(report)
    }

    fn contest(&self, id: ContestId) -> EngineResult<Contest> {
        self.lock()
            .contests
            .get(&id)
            .cloned()
            .context(UnknownContestSnafu { id })
    }

    fn contests_for_topic(&self, topic: TopicId) -> EngineResult<Vec<Contest>> {
        let t = self.lock();
        ensure_topic(&t, topic)?;
        Ok(t.contests
            .values()
            .filter(|c| c.topic == topic)
            .cloned()
            .collect())
    }

    fn open_or_create_contest<F>(
        &self,
        topic: TopicId,
        voter: VoterId,
        pick: F,
    ) -> EngineResult<(Contest, bool)>
    where
        F: FnOnce(&[CandidateMapping]) -> EngineResult<(MappingId, MappingId)>,
    {
        let mut t = self.lock();
        ensure_topic(&t, topic)?;
        if let Some(c) = t
            .contests
            .values()
            .find(|c| c.topic == topic && c.voter == voter && c.is_open())
        {
            return Ok((*c, false));
        }

        let mappings = t.topic_mappings(topic);
        let (first, second) = pick(&mappings)?;
        for m in [first, second] {
            ensure!(
                mappings.iter().any(|tm| tm.id == m),
                UnknownMappingSnafu { id: m }
            );
        }
        ensure!(
            first != second,
            InsufficientCandidatesSnafu {
                topic,
                available: mappings.len()
            }
        );

        let a = t.get_or_create_rating(first, voter, self.default_score);
        let b = t.get_or_create_rating(second, voter, self.default_score);
        let contest = Contest {
            id: ContestId(t.next_id()),
            topic,
            voter,
            contestants: [a.id, b.id],
            winner: None,
        };
        t.contests.insert(contest.id, contest);
        Ok((contest, true))
    }

    fn settle_contest<F>(
        &self,
        contest: ContestId,
        winner: RatingId,
        settle: F,
    ) -> EngineResult<Settlement>
    where
        F: FnOnce(&Contest, &Rating, &Rating) -> EngineResult<[f64; 2]>,
    {
        let mut t = self.lock();
        let c = *t
            .contests
            .get(&contest)
            .context(UnknownContestSnafu { id: contest })?;
        let [a_id, b_id] = c.contestants;
        let a = *t.ratings.get(&a_id).context(UnknownRatingSnafu { id: a_id })?;
        let b = *t.ratings.get(&b_id).context(UnknownRatingSnafu { id: b_id })?;

        let scores = settle(&c, &a, &b)?;
        ensure!(c.has_contestant(winner), InvalidWinnerSnafu { contest, winner });

        // Everything is validated, write all of it.
        for (rid, score) in c.contestants.iter().zip(scores) {
            if let Some(r) = t.ratings.get_mut(rid) {
                r.score = score;
            }
        }
        if let Some(stored) = t.contests.get_mut(&contest) {
            stored.winner = Some(winner);
        }
        let loser = if winner == a_id { b_id } else { a_id };
        Ok(Settlement {
            contest,
            winner,
            loser,
            scores,
        })
    }

    fn delete_contest(&self, id: ContestId) -> EngineResult<()> {
        let mut t = self.lock();
        t.contests.remove(&id).context(UnknownContestSnafu { id })?;
        info!("Deleted contest {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        store: MemoryStore,
        topic: Topic,
        blue: Item,
        red: Item,
        blue_map: CandidateMapping,
        red_map: CandidateMapping,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::default();
        let topic = store.create_topic("Favorite color");
        let blue = store.create_item("Blue");
        let red = store.create_item("Red");
        let blue_map = store.map_item(topic.id, blue.id).unwrap();
        let red_map = store.map_item(topic.id, red.id).unwrap();
        Fixture {
            store,
            topic,
            blue,
            red,
            blue_map,
            red_map,
        }
    }

    fn pick_both(f: &Fixture) -> impl FnOnce(&[CandidateMapping]) -> EngineResult<(MappingId, MappingId)> {
        let pair = (f.blue_map.id, f.red_map.id);
        move |_| Ok(pair)
    }

    #[test]
    fn mappings_are_unique() {
        let f = fixture();
        let res = f.store.map_item(f.topic.id, f.blue.id);
        assert_eq!(
            res,
            Err(EngineError::DuplicateMapping {
                topic: f.topic.id,
                item: f.blue.id
            })
        );
        assert_eq!(f.store.mappings(f.topic.id).unwrap().len(), 2);
        assert!(f.store.map_item(TopicId(999), f.blue.id).is_err());
    }

    #[test]
    fn ratings_are_created_once() {
        let f = fixture();
        let voter = VoterId(6);
        let r1 = f.store.get_or_create_rating(f.blue_map.id, voter).unwrap();
        let r2 = f.store.get_or_create_rating(f.blue_map.id, voter).unwrap();
        assert_eq!(r1, r2);
        assert_eq!(r1.score, 1000.0);
        let other = f.store.get_or_create_rating(f.blue_map.id, VoterId(7)).unwrap();
        assert_ne!(other.id, r1.id);
        assert_eq!(f.store.ratings_for_topic(f.topic.id).unwrap().len(), 2);
    }

    #[test]
    fn open_contest_is_reused() {
        let f = fixture();
        let voter = VoterId(6);
        let (c1, created) = f
            .store
            .open_or_create_contest(f.topic.id, voter, pick_both(&f))
            .unwrap();
        assert!(created);
        let (c2, created) = f
            .store
            .open_or_create_contest(f.topic.id, voter, |_| panic!("should not pick"))
            .unwrap();
        assert!(!created);
        assert_eq!(c1, c2);
    }

    #[test]
    fn picking_the_same_candidate_twice_fails() {
        let f = fixture();
        let m = f.blue_map.id;
        let res = f
            .store
            .open_or_create_contest(f.topic.id, VoterId(1), move |_| Ok((m, m)));
        assert_eq!(
            res,
            Err(EngineError::InsufficientCandidates {
                topic: f.topic.id,
                available: 2
            })
        );
        // Nothing was created.
        assert!(f.store.contests_for_topic(f.topic.id).unwrap().is_empty());
        assert!(f.store.ratings_for_topic(f.topic.id).unwrap().is_empty());
    }

    #[test]
    fn failed_settlement_writes_nothing() {
        let f = fixture();
        let (c, _) = f
            .store
            .open_or_create_contest(f.topic.id, VoterId(1), pick_both(&f))
            .unwrap();
        let res = f.store.settle_contest(c.id, c.contestants[0], |_, _, _| {
            NoVotesSnafu { remaining: 0usize }.fail()
        });
        assert!(res.is_err());
        assert!(f.store.contest(c.id).unwrap().is_open());
        for r in c.contestants {
            assert_eq!(f.store.rating(r).unwrap().score, 1000.0);
        }
        // A winner outside of the contest is rejected even if `settle` accepts it.
        let res = f.store.settle_contest(c.id, RatingId(12345), |_, _, _| Ok([1.0, 2.0]));
        assert_eq!(
            res,
            Err(EngineError::InvalidWinner {
                contest: c.id,
                winner: RatingId(12345)
            })
        );
        assert_eq!(f.store.rating(c.contestants[0]).unwrap().score, 1000.0);
    }

    #[test]
    fn deleting_an_item_cascades() {
        let f = fixture();
        let voter = VoterId(6);
        let (c, _) = f
            .store
            .open_or_create_contest(f.topic.id, voter, pick_both(&f))
            .unwrap();
        let report = f.store.delete_item(f.red.id).unwrap();
        assert_eq!(
            report,
            CascadeReport {
                mappings: 1,
                ratings: 1,
                contests: 1
            }
        );
        assert_eq!(
            f.store.contest(c.id),
            Err(EngineError::UnknownContest { id: c.id })
        );
        // The other side of the contest keeps its rating.
        let remaining = f.store.ratings_for_topic(f.topic.id).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].mapping, f.blue_map.id);
        assert!(f.store.item(f.red.id).is_err());
    }

    #[test]
    fn deleting_a_rating_cascades() {
        let f = fixture();
        let (c, _) = f
            .store
            .open_or_create_contest(f.topic.id, VoterId(2), pick_both(&f))
            .unwrap();
        let report = f.store.delete_rating(c.contestants[1]).unwrap();
        assert_eq!(report.contests, 1);
        assert_eq!(report.ratings, 0);
        assert!(f.store.contests_for_topic(f.topic.id).unwrap().is_empty());
    }

    #[test]
    fn deleting_a_topic_cascades() {
        let f = fixture();
        f.store
            .open_or_create_contest(f.topic.id, VoterId(2), pick_both(&f))
            .unwrap();
        let report = f.store.delete_topic(f.topic.id).unwrap();
        assert_eq!(
            report,
            CascadeReport {
                mappings: 2,
                ratings: 2,
                contests: 1
            }
        );
        // Items survive their topics.
        assert!(f.store.item(f.blue.id).is_ok());
        assert!(f.store.mappings(f.topic.id).is_err());
    }

    #[test]
    fn unmapping_and_renaming() {
        let f = fixture();
        let renamed = f.store.rename_item(f.blue.id, "Navy").unwrap();
        assert_eq!(renamed.label, "Navy");
        assert_eq!(f.store.item(f.blue.id).unwrap().label, "Navy");

        f.store.unmap_item(f.topic.id, f.blue.id).unwrap();
        assert_eq!(f.store.mappings(f.topic.id).unwrap(), vec![f.red_map]);
        assert!(f.store.unmap_item(f.topic.id, f.blue.id).is_err());
    }
}
