/*!

This is the long-form manual for `contest_engine` and `ranker`.

## Concepts

* A **topic** is a question ("Favorite color"). An **item** is a possible
  answer ("Blue"). Items exist independently of topics and are registered
  as candidates of a topic through a **candidate mapping**.
* A **rating** is the score of one candidate for one voter. It is created
  with the default score (1000) the first time the candidate shows up in a
  contest for that voter.
* A **contest** is one matchup between two candidates shown to one voter.
  A voter has at most one open contest per topic. Once the voter picks a
  winner, the contest is decided and both ratings move.
* A **ballot** is the list of the candidates a voter has rated, best score
  first. The ballots of all the voters are combined into the global ranking
  of the topic.

## Complete flow

```
use std::sync::Arc;
use contest_engine::*;

let rules = EngineRules::DEFAULT_RULES;
let store = Arc::new(MemoryStore::new(&rules));

let topic = store.create_topic("Favorite color");
let blue = store.create_item("Blue");
let red = store.create_item("Red");
store.map_item(topic.id, blue.id)?;
store.map_item(topic.id, red.id)?;

// Seeded so that runs are reproducible. `RandomSampler::from_entropy`
// is the usual choice in a service.
let orchestrator = ContestOrchestrator::new(store.clone(), &rules, RandomSampler::from_seed(3));
let voter = VoterId(6);
let contest = orchestrator.get_or_create(topic.id, voter)?;
// Until it is decided, the same contest is returned.
assert_eq!(orchestrator.get_or_create(topic.id, voter)?, contest);

let settlement = orchestrator.record_winner(contest.id, red.id)?;
assert_eq!(store.rating(settlement.winner)?.score, 1008.0);
assert_eq!(store.rating(settlement.loser)?.score, 992.0);

let aggregator = RankingAggregator::new(store.clone(), &rules);
let top = aggregator.top_options(topic.id, 5)?;
assert_eq!(top, vec![red.clone(), blue.clone()]);
assert_eq!(aggregator.condorcet_winner(topic.id)?, Some(red));
# Ok::<(), EngineError>(())
```

## Scores

After a contest between `a` and `b`, both scores are updated at once from
their values before the contest:

```text
expected_a = 1 / (1 + 10 ^ ((b - a) / rating_scale))
a' = a + k_factor * (actual_a - expected_a)
```

where `actual_a` is 1 for the winner and 0 for the loser. The defaults
are a `k_factor` of 16 and a `rating_scale` of 400. A contest can only be
decided once: a second decision fails with
[`EngineError::AlreadyDecided`](crate::EngineError::AlreadyDecided) and
leaves the scores untouched, including when two decisions race.

## Rankings

Two methods are available, selected with
[`EngineRules::ranking_method`](crate::EngineRules):

* `Pairwise` (default): every pair of candidates is compared over all the
  ballots. A candidate wins a matchup when more ballots list it before the
  other one. Candidates are ranked by number of matchups won. Candidates
  with the same number of wins share a position.
* `RankedPreference`: instant-runoff is run repeatedly, removing the winner
  of each run. Candidates that no ballot lists are left out.

In both cases, [`RankingAggregator::top_options`](crate::RankingAggregator::top_options)
flattens shared positions by ascending item id.

## Deletions

Deleting an item removes its candidate mappings. Removing a mapping
removes its ratings, and removing a rating removes every contest it was
part of, decided or not. The store reports what went away:

```
use std::sync::Arc;
use contest_engine::*;

let store = Arc::new(MemoryStore::default());
let topic = store.create_topic("Pets");
let cat = store.create_item("Cat");
let dog = store.create_item("Dog");
store.map_item(topic.id, cat.id)?;
store.map_item(topic.id, dog.id)?;

let orchestrator = ContestOrchestrator::new(
    store.clone(),
    &EngineRules::DEFAULT_RULES,
    ScriptedSampler::new(&[(cat.id, dog.id)]),
);
orchestrator.get_or_create(topic.id, VoterId(1))?;

let report = store.delete_item(dog.id)?;
assert_eq!(report, CascadeReport { mappings: 1, ratings: 1, contests: 1 });
assert!(store.contests_for_topic(topic.id)?.is_empty());
# Ok::<(), EngineError>(())
```

## Session files

The `ranker` program replays a recorded session and prints the resulting
rankings. A session is a JSON file:

```text
{
  "rules": { "kFactor": 16, "rankingMethod": "pairwise" },
  "topics": [ { "label": "Favorite color", "items": ["Blue", "Red", "Green"] } ],
  "contests": [
    { "topic": "Favorite color", "voter": 6, "items": ["Blue", "Red"], "winner": "Red" }
  ],
  "deletedItems": []
}
```

All the fields of `rules` are optional: `defaultScore`, `kFactor`,
`ratingScale`, `rankingMethod` (`pairwise` or `ranked_preference`) and
`randomSeed`. A contest without `items` is drawn at random, using
`randomSeed` when provided. The winner is given by label with `winner`, or
by side with `pick` (0 or 1) when the items are not known in advance. A
contest with neither stays open.

```bash
ranker --config session.json --count 3
ranker --config session.json --reference expected_summary.json
```

With `--reference`, the program exits with an error and prints a line diff
if its summary differs from the reference.

 */
