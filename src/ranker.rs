use log::{debug, info, warn};

use contest_engine::*;
use snafu::prelude::*;

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::sync::Arc;

use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::ranker::config_reader::*;

pub mod config_reader;

#[derive(Debug, Snafu)]
pub enum RankerError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing the JSON content of {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error writing the summary"))]
    WritingJson { source: serde_json::Error },
    #[snafu(display("Error writing file {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Expected a non-negative integer"))]
    ParsingJsonNumber {},

    #[snafu(display("Unknown topic {label:?}"))]
    UnknownTopicLabel { label: String },
    #[snafu(display("Unknown item {label:?}"))]
    UnknownItemLabel { label: String },

    #[snafu(display("Contest #{index}: {source}"))]
    Engine { source: EngineError, index: usize },
    #[snafu(display("{source}"))]
    Store { source: EngineError },

    #[snafu(display("Difference detected between calculated summary and reference summary"))]
    ReferenceMismatch {},

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type RankerResult<T> = Result<T, RankerError>;

/// Plays back the recorded pairs first, then draws at random.
struct ReplaySampler {
    scripted: ScriptedSampler,
    random: RandomSampler,
}

impl CandidateSampler for ReplaySampler {
    fn pick_pair(&mut self, mappings: &[CandidateMapping]) -> Option<(MappingId, MappingId)> {
        if self.scripted.pending() > 0 {
            self.scripted.pick_pair(mappings)
        } else {
            self.random.pick_pair(mappings)
        }
    }
}

/// The state of a replayed session: the engine and the labels used in the
/// session file.
struct Session {
    store: Arc<MemoryStore>,
    orchestrator: ContestOrchestrator<MemoryStore, ReplaySampler>,
    aggregator: RankingAggregator<MemoryStore>,
    topics: Vec<Topic>,
    topic_ids: HashMap<String, TopicId>,
    item_ids: HashMap<String, ItemId>,
}

impl Session {
    fn new(config: &SessionConfig, rules: &EngineRules, seed: Option<u64>) -> RankerResult<Session> {
        let store = Arc::new(MemoryStore::new(rules));
        let random = match seed {
            Some(s) => RandomSampler::from_seed(s),
            None => RandomSampler::from_entropy(),
        };
        let sampler = ReplaySampler {
            scripted: ScriptedSampler::default(),
            random,
        };

        let mut topics: Vec<Topic> = Vec::new();
        let mut topic_ids: HashMap<String, TopicId> = HashMap::new();
        let mut item_ids: HashMap<String, ItemId> = HashMap::new();
        for t in config.topics.iter() {
            if topic_ids.contains_key(&t.label) {
                whatever!("Topic {:?} is defined twice", t.label);
            }
            let topic = store.create_topic(&t.label);
            for label in t.items.iter() {
                let item = match item_ids.get(label) {
                    Some(id) => *id,
                    None => {
                        let id = store.create_item(label).id;
                        item_ids.insert(label.clone(), id);
                        id
                    }
                };
                store.map_item(topic.id, item).context(StoreSnafu {})?;
            }
            debug!("Session: topic {:?} with {} items", t.label, t.items.len());
            topic_ids.insert(t.label.clone(), topic.id);
            topics.push(topic);
        }

        Ok(Session {
            orchestrator: ContestOrchestrator::new(store.clone(), rules, sampler),
            aggregator: RankingAggregator::new(store.clone(), rules),
            store,
            topics,
            topic_ids,
            item_ids,
        })
    }

    fn topic_id(&self, label: &str) -> RankerResult<TopicId> {
        self.topic_ids
            .get(label)
            .cloned()
            .context(UnknownTopicLabelSnafu { label })
    }

    fn item_id(&self, label: &str) -> RankerResult<ItemId> {
        self.item_ids
            .get(label)
            .cloned()
            .context(UnknownItemLabelSnafu { label })
    }

    fn label(&self, id: ItemId) -> RankerResult<String> {
        let item = self.store.item(id).context(StoreSnafu {})?;
        Ok(item.label)
    }

    fn has_open_contest(&self, topic: TopicId, voter: VoterId) -> RankerResult<bool> {
        let contests = self
            .store
            .contests_for_topic(topic)
            .context(StoreSnafu {})?;
        Ok(contests.iter().any(|c| c.voter == voter && c.is_open()))
    }

    /// Replays one contest of the session. `index` starts at 1.
    fn play(&self, index: usize, c: &SessionContest) -> RankerResult<()> {
        let topic = self.topic_id(&c.topic)?;
        let voter = VoterId(c.voter);
        let requested = match &c.items {
            Some(items) if items.len() == 2 => {
                let pair = (self.item_id(&items[0])?, self.item_id(&items[1])?);
                // An open contest is returned as is: queueing the pair would
                // leave it for the next contest drawn at random.
                if !self.has_open_contest(topic, voter)? {
                    self.orchestrator.sampler().scripted.push(pair.0, pair.1);
                }
                Some(pair)
            }
            Some(items) => whatever!(
                "Contest #{}: expected two items, found {}",
                index,
                items.len()
            ),
            None => None,
        };

        let contest = self
            .orchestrator
            .get_or_create(topic, voter)
            .context(EngineSnafu { index })?;
        let [a, b] = self
            .orchestrator
            .contestants(contest.id)
            .context(EngineSnafu { index })?;
        if let Some((x, y)) = requested {
            if [a.id, b.id] != [x, y] {
                whatever!(
                    "Contest #{}: voter {} already has an open contest in topic {:?} ({} vs {})",
                    index,
                    c.voter,
                    c.topic,
                    a.label,
                    b.label
                );
            }
        }
        debug!("Contest #{}: {} vs {}", index, a.label, b.label);

        let winner = match (&c.winner, c.pick) {
            (Some(label), _) => Some(self.item_id(label)?),
            (None, Some(0)) => Some(a.id),
            (None, Some(1)) => Some(b.id),
            (None, Some(x)) => whatever!("Contest #{}: pick must be 0 or 1, found {}", index, x),
            (None, None) => None,
        };
        if let Some(item) = winner {
            self.orchestrator
                .record_winner(contest.id, item)
                .context(EngineSnafu { index })?;
        }
        Ok(())
    }

    fn placement_js(&self, p: &Placement<ItemId>) -> RankerResult<JSValue> {
        let labels: Vec<String> = p
            .members()
            .into_iter()
            .map(|id| self.label(id))
            .collect::<RankerResult<_>>()?;
        let res = match p {
            Placement::Single(_) => json!(labels[0]),
            Placement::Tied(_) => json!(labels),
        };
        Ok(res)
    }

    fn topic_summary_js(&self, topic: &Topic, count: usize) -> RankerResult<JSValue> {
        let mappings: HashMap<MappingId, ItemId> = self
            .store
            .mappings(topic.id)
            .context(StoreSnafu {})?
            .iter()
            .map(|m| (m.id, m.item))
            .collect();

        let mut ratings: BTreeMap<String, JSMap<String, JSValue>> = BTreeMap::new();
        for r in self
            .store
            .ratings_for_topic(topic.id)
            .context(StoreSnafu {})?
        {
            let item = match mappings.get(&r.mapping) {
                Some(i) => *i,
                None => whatever!("Rating {} has no candidate in topic {:?}", r.id, topic.label),
            };
            ratings
                .entry(r.voter.to_string())
                .or_default()
                .insert(self.label(item)?, json!(round_score(r.score)));
        }

        let mut ranking: Vec<JSValue> = Vec::new();
        for p in self
            .aggregator
            .placements(topic.id)
            .context(StoreSnafu {})?
        {
            ranking.push(self.placement_js(&p)?);
        }

        let top: Vec<String> = self
            .aggregator
            .top_options(topic.id, count)
            .context(StoreSnafu {})?
            .into_iter()
            .map(|i| i.label)
            .collect();
        let condorcet = self
            .aggregator
            .condorcet_winner(topic.id)
            .context(StoreSnafu {})?
            .map(|i| i.label);
        let open_contests = self
            .store
            .contests_for_topic(topic.id)
            .context(StoreSnafu {})?
            .iter()
            .filter(|c| c.is_open())
            .count();

        Ok(json!({
            "topic": topic.label,
            "ratings": ratings,
            "ranking": ranking,
            "top": top,
            "condorcetWinner": condorcet,
            "openContests": open_contests,
        }))
    }

    fn build_summary_js(&self, count: usize) -> RankerResult<JSValue> {
        let mut topics: Vec<JSValue> = Vec::new();
        for t in self.topics.iter() {
            topics.push(self.topic_summary_js(t, count)?);
        }
        Ok(json!({ "topics": topics }))
    }
}

fn round_score(score: f64) -> f64 {
    (score * 100.0).round() / 100.0
}

/// Replays the session in `config_path` and writes its summary to `out`
/// (the standard output by default). If `check_summary_path` is provided,
/// fails when the summary differs from the reference.
pub fn run_session(
    config_path: &str,
    check_summary_path: Option<&str>,
    out: Option<&str>,
    count: usize,
    method: Option<&str>,
) -> RankerResult<()> {
    let config = read_config(config_path)?;
    info!("config: {:?}", config);

    // Validate the rules:
    let mut rules = validate_rules(&config.rules)?;
    if let Some(m) = method {
        rules.ranking_method = parse_method(m)?;
    }
    let seed = config.rules.random_seed()?;
    info!("rules: {:?}, seed: {:?}", rules, seed);

    let session = Session::new(&config, &rules, seed)?;
    for (idx, c) in config.contests.iter().enumerate() {
        session.play(idx + 1, c)?;
    }
    for label in config.deleted_items.iter() {
        let id = session.item_id(label)?;
        let report = session
            .store
            .delete_item(id)
            .context(StoreSnafu {})?;
        info!("Deleted item {:?}: {:?}", label, report);
    }

    // Assemble the final json
    let result_js = session.build_summary_js(count)?;
    let pretty_js_stats = serde_json::to_string_pretty(&result_js).context(WritingJsonSnafu {})?;

    match out {
        None | Some("stdout") => println!("{}", pretty_js_stats),
        Some(path) => {
            info!("Writing summary to {:?}", path);
            fs::write(path, &pretty_js_stats).context(WritingFileSnafu { path })?;
        }
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = check_summary_path {
        let summary_ref = read_summary(summary_p)?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(WritingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference string");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            return ReferenceMismatchSnafu {}.fail();
        }
        info!("The summary matches the reference {:?}", summary_p);
    }
    Ok(())
}

#[cfg(test)]
fn session_dir(test_name: &str) -> String {
    let test_dir = option_env!("RANKER_TEST_DIR")
        .unwrap_or(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/sessions"));
    format!("{}/{}", test_dir, test_name)
}

#[cfg(test)]
fn run_session_test(test_name: &str, config_lpath: &str, summary_lpath: &str) -> RankerResult<()> {
    let dir = session_dir(test_name);
    info!("Running test {}", test_name);
    let out = std::env::temp_dir().join(format!("ranker_{}_summary.json", test_name));
    let reference = format!("{}/{}", dir, summary_lpath);
    run_session(
        &format!("{}/{}", dir, config_lpath),
        Some(reference.as_str()),
        out.to_str(),
        5,
        None,
    )
}

#[cfg(test)]
pub fn test_wrapper(test_name: &str) {
    let res = run_session_test(
        test_name,
        format!("{}_config.json", test_name).as_str(),
        format!("{}_expected_summary.json", test_name).as_str(),
    );
    if let Err(e) = res {
        warn!("Error occured {:?}", e);
        panic!("Session {} failed: {}", test_name, e);
    }
}
