// ********* Identifiers ***********

use snafu::Snafu;
use std::collections::BTreeSet;
use std::fmt::Display;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
        pub struct $name(pub u64);

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// An item that can be placed in topics and compared.
    ItemId
);
define_id!(TopicId);
define_id!(
    /// The association of one item with one topic.
    MappingId
);
define_id!(RatingId);
define_id!(ContestId);
define_id!(
    /// The person casting votes. Identity is owned by the caller.
    VoterId
);

// ********* Stored records ***********

#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct Item {
    pub id: ItemId,
    pub label: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct Topic {
    pub id: TopicId,
    pub label: String,
}

/// An item registered as a candidate of a topic. Unique per (topic, item).
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub struct CandidateMapping {
    pub id: MappingId,
    pub topic: TopicId,
    pub item: ItemId,
}

/// The skill score of one candidate, as seen by one voter.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct Rating {
    pub id: RatingId,
    pub mapping: MappingId,
    pub voter: VoterId,
    pub score: f64,
}

/// A two-way comparison presented to a voter.
///
/// Invariant: if `winner` is set, it is one of the `contestants`.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub struct Contest {
    pub id: ContestId,
    pub topic: TopicId,
    pub voter: VoterId,
    pub contestants: [RatingId; 2],
    pub winner: Option<RatingId>,
}

impl Contest {
    pub fn is_open(&self) -> bool {
        self.winner.is_none()
    }

    pub fn has_contestant(&self, rating: RatingId) -> bool {
        self.contestants.contains(&rating)
    }
}

/// The outcome of deciding a contest.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct Settlement {
    pub contest: ContestId,
    pub winner: RatingId,
    pub loser: RatingId,
    /// New scores, in the order of `Contest::contestants`.
    pub scores: [f64; 2],
}

/// What a cascading deletion removed besides the record itself.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub struct CascadeReport {
    pub mappings: usize,
    pub ratings: usize,
    pub contests: usize,
}

// ********* Ballots and results ***********

/// A ballot, possibly standing for several identical ballots.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Vote<C> {
    /// Most preferred first. Does not need to list every candidate.
    pub candidates: Vec<C>,
    pub count: u64,
}

/// One position in a ranking: either a single candidate or a group of
/// candidates that could not be separated.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum Placement<C: Ord> {
    Single(C),
    Tied(BTreeSet<C>),
}

impl<C: Ord + Clone> Placement<C> {
    /// Builds a placement out of a group, collapsing groups of one.
    ///
    /// The group must not be empty.
    pub(crate) fn from_group(mut group: BTreeSet<C>) -> Placement<C> {
        debug_assert!(!group.is_empty(), "a placement needs at least one candidate");
        if group.len() == 1 {
            if let Some(c) = group.pop_first() {
                return Placement::Single(c);
            }
        }
        Placement::Tied(group)
    }

    /// The candidates at this position, in ascending order for ties.
    pub fn members(&self) -> Vec<C> {
        match self {
            Placement::Single(c) => vec![c.clone()],
            Placement::Tied(cs) => cs.iter().cloned().collect(),
        }
    }

    pub fn contains(&self, candidate: &C) -> bool {
        match self {
            Placement::Single(c) => c == candidate,
            Placement::Tied(cs) => cs.contains(candidate),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Placement::Single(_) => 1,
            Placement::Tied(cs) => cs.len(),
        }
    }

    pub fn is_tie(&self) -> bool {
        matches!(self, Placement::Tied(_))
    }

    pub fn map<D: Ord + Clone, F: FnMut(&C) -> D>(&self, mut f: F) -> Placement<D> {
        match self {
            Placement::Single(c) => Placement::Single(f(c)),
            Placement::Tied(cs) if cs.is_empty() => Placement::Tied(BTreeSet::new()),
            Placement::Tied(cs) => Placement::from_group(cs.iter().map(f).collect()),
        }
    }
}

// ********* Errors **********

/// Errors returned by the engine and by the store.
///
/// All of them are local validation failures. None of them is retried.
#[derive(Eq, PartialEq, Debug, Clone, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EngineError {
    #[snafu(display("Rating {winner} is not a contestant of contest {contest}"))]
    InvalidWinner { contest: ContestId, winner: RatingId },

    #[snafu(display("Contest {contest} already has a winner ({winner})"))]
    AlreadyDecided { contest: ContestId, winner: RatingId },

    #[snafu(display("Topic {topic} has {available} candidates, at least 2 are needed"))]
    InsufficientCandidates { topic: TopicId, available: usize },

    #[snafu(display("The sampler drew no pair out of the {available} candidates of topic {topic}"))]
    NoPairDrawn { topic: TopicId, available: usize },

    #[snafu(display("No ballot references any of the {remaining} remaining candidates"))]
    NoVotes { remaining: usize },

    #[snafu(display("Item {item} is not one of the contestants of contest {contest}"))]
    UnknownWinner { contest: ContestId, item: ItemId },

    #[snafu(display("Unknown topic {id}"))]
    UnknownTopic { id: TopicId },

    #[snafu(display("Unknown item {id}"))]
    UnknownItem { id: ItemId },

    #[snafu(display("Unknown candidate mapping {id}"))]
    UnknownMapping { id: MappingId },

    #[snafu(display("Unknown rating {id}"))]
    UnknownRating { id: RatingId },

    #[snafu(display("Unknown contest {id}"))]
    UnknownContest { id: ContestId },

    #[snafu(display("Item {item} is already a candidate of topic {topic}"))]
    DuplicateMapping { topic: TopicId, item: ItemId },
}

impl EngineError {
    /// True when the caller sent something invalid, as opposed to an
    /// internal invariant failing.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            EngineError::NoVotes { .. } | EngineError::NoPairDrawn { .. }
        )
    }

    /// True for conflicts with the current state of a record.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            EngineError::AlreadyDecided { .. } | EngineError::DuplicateMapping { .. }
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

// ********* Configuration **********

/// The algorithm used to turn ballots into a global ranking.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum RankingMethod {
    /// Copeland-style: ranked by number of head-to-head matchups won.
    Pairwise,
    /// Repeated instant-runoff, removing the winners after each run.
    RankedPreference,
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub struct EngineRules {
    /// Score given to a rating when it is first created.
    pub default_score: f64,
    /// Maximum adjustment of a score after one contest.
    pub k_factor: f64,
    /// A difference of `rating_scale` points means 10:1 odds of winning.
    pub rating_scale: f64,
    pub ranking_method: RankingMethod,
}

impl EngineRules {
    pub const DEFAULT_RULES: EngineRules = EngineRules {
        default_score: 1000.0,
        k_factor: 16.0,
        rating_scale: 400.0,
        ranking_method: RankingMethod::Pairwise,
    };
}

impl Default for EngineRules {
    fn default() -> Self {
        EngineRules::DEFAULT_RULES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement_from_group_collapses_singletons() {
        let single = Placement::from_group(BTreeSet::from(["Red"]));
        assert_eq!(single, Placement::Single("Red"));
        assert!(!single.is_tie());

        let tied = Placement::from_group(BTreeSet::from(["Red", "Blue"]));
        assert!(tied.is_tie());
        assert_eq!(tied.len(), 2);
        assert_eq!(tied.members(), vec!["Blue", "Red"]);
        assert!(tied.contains(&"Red"));
        assert!(!tied.contains(&"Green"));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "a placement needs at least one candidate")]
    fn placement_from_empty_group() {
        Placement::<u64>::from_group(BTreeSet::new());
    }

    #[test]
    fn placement_map_keeps_shape() {
        let tied = Placement::Tied(BTreeSet::from([1u64, 2]));
        assert_eq!(
            tied.map(|x| ItemId(*x)),
            Placement::Tied(BTreeSet::from([ItemId(1), ItemId(2)]))
        );
        // Mapping two members onto the same value leaves a single candidate.
        assert_eq!(tied.map(|_| 7u64), Placement::Single(7));
    }

    #[test]
    fn error_classification() {
        let e = EngineError::AlreadyDecided {
            contest: ContestId(1),
            winner: RatingId(2),
        };
        assert!(e.is_conflict());
        assert!(e.is_client_error());
        assert_eq!(e.to_string(), "Contest 1 already has a winner (2)");
        assert!(!EngineError::NoVotes { remaining: 3 }.is_client_error());
        assert!(!EngineError::NoPairDrawn {
            topic: TopicId(1),
            available: 2
        }
        .is_client_error());
    }
}
