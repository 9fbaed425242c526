use std::sync::Arc;
use std::thread;

use contest_engine::*;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Session {
    store: Arc<MemoryStore>,
    orchestrator: ContestOrchestrator<MemoryStore, ScriptedSampler>,
    aggregator: RankingAggregator<MemoryStore>,
    topic: TopicId,
    items: Vec<Item>,
}

fn session(labels: &[&str], rules: &EngineRules) -> Session {
    init();
    let store = Arc::new(MemoryStore::new(rules));
    let topic = store.create_topic("Favorite color").id;
    let items: Vec<Item> = labels.iter().map(|l| store.create_item(l)).collect();
    for i in items.iter() {
        store.map_item(topic, i.id).unwrap();
    }
    Session {
        orchestrator: ContestOrchestrator::new(store.clone(), rules, ScriptedSampler::default()),
        aggregator: RankingAggregator::new(store.clone(), rules),
        store,
        topic,
        items,
    }
}

impl Session {
    /// Opens a contest between items `a` and `b` for `voter` and decides it
    /// in favour of `a`.
    fn play(&self, voter: u64, a: usize, b: usize) -> Settlement {
        self.orchestrator
            .sampler()
            .push(self.items[a].id, self.items[b].id);
        let c = self
            .orchestrator
            .get_or_create(self.topic, VoterId(voter))
            .unwrap();
        self.orchestrator
            .record_winner(c.id, self.items[a].id)
            .unwrap()
    }

    fn labels(&self, items: &[Item]) -> Vec<String> {
        items.iter().map(|i| i.label.clone()).collect()
    }

    fn top(&self, count: usize) -> Vec<String> {
        self.labels(&self.aggregator.top_options(self.topic, count).unwrap())
    }
}

#[test]
fn single_contest_sets_the_ranking() {
    let s = session(&["Blue", "Red"], &EngineRules::DEFAULT_RULES);
    let settlement = s.play(6, 1, 0);
    assert_eq!(settlement.scores, [1008.0, 992.0]);
    assert_eq!(s.top(2), vec!["Red", "Blue"]);
    assert_eq!(
        s.aggregator
            .condorcet_winner(s.topic)
            .unwrap()
            .map(|i| i.label),
        Some("Red".to_string())
    );
}

#[test]
fn several_voters_agree_on_a_winner() {
    let s = session(&["Blue", "Red", "Green"], &EngineRules::DEFAULT_RULES);
    // Every voter puts Green first. Voters 1 and 2 put Blue before Red.
    for voter in 1..=3 {
        s.play(voter, 2, 0);
        s.play(voter, 2, 1);
    }
    s.play(1, 0, 1);
    s.play(2, 0, 1);
    s.play(3, 1, 0);
    assert_eq!(s.top(5), vec!["Green", "Blue", "Red"]);
    assert_eq!(s.top(1), vec!["Green"]);

    let rules = EngineRules {
        ranking_method: RankingMethod::RankedPreference,
        ..EngineRules::DEFAULT_RULES
    };
    let irv = RankingAggregator::new(s.store.clone(), &rules);
    let top = irv.top_options(s.topic, 5).unwrap();
    assert_eq!(s.labels(&top), vec!["Green", "Blue", "Red"]);
}

#[test]
fn deleting_an_item_removes_it_everywhere() {
    let s = session(&["Blue", "Red", "Green"], &EngineRules::DEFAULT_RULES);
    s.play(1, 1, 0);
    s.play(1, 2, 1);
    assert_eq!(s.top(5), vec!["Green", "Red", "Blue"]);

    // Leave a contest open with Green in it.
    s.orchestrator
        .sampler()
        .push(s.items[0].id, s.items[2].id);
    let open = s.orchestrator.get_or_create(s.topic, VoterId(1)).unwrap();
    assert!(open.is_open());

    let report = s.store.delete_item(s.items[2].id).unwrap();
    assert_eq!(
        report,
        CascadeReport {
            mappings: 1,
            ratings: 1,
            contests: 2
        }
    );
    assert_eq!(
        s.store.contest(open.id),
        Err(EngineError::UnknownContest { id: open.id })
    );
    assert_eq!(s.top(5), vec!["Red", "Blue"]);
    // The voter can get a new contest right away.
    s.orchestrator
        .sampler()
        .push(s.items[0].id, s.items[1].id);
    let next = s.orchestrator.get_or_create(s.topic, VoterId(1)).unwrap();
    assert_ne!(next.id, open.id);
}

#[test]
fn concurrent_decisions_apply_once() {
    let s = Arc::new(session(&["Blue", "Red"], &EngineRules::DEFAULT_RULES));
    s.orchestrator
        .sampler()
        .push(s.items[0].id, s.items[1].id);
    let contest = s.orchestrator.get_or_create(s.topic, VoterId(1)).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let s = s.clone();
            thread::spawn(move || {
                let winner = s.items[i % 2].id;
                s.orchestrator.record_winner(contest.id, winner)
            })
        })
        .collect();
    let results: Vec<EngineResult<Settlement>> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    let won: Vec<&Settlement> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(won.len(), 1);
    for r in results.iter() {
        if let Err(e) = r {
            assert!(matches!(e, EngineError::AlreadyDecided { .. }));
            assert!(e.is_conflict());
        }
    }
    // Exactly one update went through.
    let mut scores: Vec<f64> = contest
        .contestants
        .iter()
        .map(|r| s.store.rating(*r).unwrap().score)
        .collect();
    scores.sort_by(f64::total_cmp);
    assert_eq!(scores, vec![992.0, 1008.0]);
}

#[test]
fn concurrent_requests_share_the_open_contest() {
    init();
    let store = Arc::new(MemoryStore::default());
    let topic = store.create_topic("Numbers").id;
    for n in 0..10 {
        let item = store.create_item(&n.to_string());
        store.map_item(topic, item.id).unwrap();
    }
    let orchestrator = Arc::new(ContestOrchestrator::new(
        store.clone(),
        &EngineRules::DEFAULT_RULES,
        RandomSampler::from_seed(11),
    ));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let o = orchestrator.clone();
            thread::spawn(move || o.get_or_create(topic, VoterId(4)).unwrap())
        })
        .collect();
    let contests: Vec<Contest> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(contests.iter().all(|c| *c == contests[0]));
    assert_eq!(store.contests_for_topic(topic).unwrap().len(), 1);
    assert_eq!(store.ratings_for_topic(topic).unwrap().len(), 2);
}

#[test]
fn errors_leave_state_untouched() {
    let s = session(&["Blue", "Red", "Green"], &EngineRules::DEFAULT_RULES);
    s.orchestrator
        .sampler()
        .push(s.items[0].id, s.items[1].id);
    let c = s.orchestrator.get_or_create(s.topic, VoterId(2)).unwrap();

    let err = s
        .orchestrator
        .record_winner(c.id, s.items[2].id)
        .unwrap_err();
    assert!(err.is_client_error());
    let err = s
        .orchestrator
        .record_winner(ContestId(4242), s.items[0].id)
        .unwrap_err();
    assert_eq!(err, EngineError::UnknownContest { id: ContestId(4242) });

    assert!(s.store.contest(c.id).unwrap().is_open());
    for r in c.contestants {
        assert_eq!(s.store.rating(r).unwrap().score, 1000.0);
    }
}

#[test]
fn custom_rules_flow_through() {
    let rules = EngineRules {
        default_score: 1500.0,
        k_factor: 32.0,
        ..EngineRules::DEFAULT_RULES
    };
    let s = session(&["Blue", "Red"], &rules);
    let settlement = s.play(1, 0, 1);
    assert_eq!(settlement.scores, [1516.0, 1484.0]);
}

#[test]
fn deleting_the_topic_clears_everything() {
    let s = session(&["Blue", "Red", "Green"], &EngineRules::DEFAULT_RULES);
    s.play(1, 0, 1);
    s.play(2, 1, 2);
    let report = s.store.delete_topic(s.topic).unwrap();
    assert_eq!(
        report,
        CascadeReport {
            mappings: 3,
            ratings: 4,
            contests: 2
        }
    );
    assert_eq!(
        s.aggregator.top_options(s.topic, 5),
        Err(EngineError::UnknownTopic { id: s.topic })
    );
    for i in s.items.iter() {
        assert!(s.store.item(i.id).is_ok());
    }
}
