//! Elo-style score updates after a contest.

use log::info;
use snafu::ensure;

use crate::config::*;
use crate::store::ContestStore;

/// Probability that a player with score `own` beats a player with score
/// `opponent`. The two expectations of a matchup always sum to 1.
pub fn expected_score(own: f64, opponent: f64, rating_scale: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent - own) / rating_scale))
}

/// Applies the outcome of a contest to the scores of both contestants.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct RatingUpdater {
    k_factor: f64,
    rating_scale: f64,
}

impl RatingUpdater {
    pub fn new(rules: &EngineRules) -> RatingUpdater {
        RatingUpdater {
            k_factor: rules.k_factor,
            rating_scale: rules.rating_scale,
        }
    }

    /// New scores for `a` and `b`. Both expectations are computed from the
    /// scores before the update.
    pub fn compute(&self, a: f64, b: f64, a_won: bool) -> (f64, f64) {
        let (actual_a, actual_b) = if a_won { (1.0, 0.0) } else { (0.0, 1.0) };
        let expected_a = expected_score(a, b, self.rating_scale);
        let expected_b = expected_score(b, a, self.rating_scale);
        (
            a + self.k_factor * (actual_a - expected_a),
            b + self.k_factor * (actual_b - expected_b),
        )
    }

    /// Decides `contest` in favour of the contestant rating `winner` and
    /// stores both new scores.
    ///
    /// Runs as a single store transaction: a contest can only be decided
    /// once, and a failure leaves both scores untouched.
    pub fn update<S: ContestStore>(
        &self,
        store: &S,
        contest: ContestId,
        winner: RatingId,
    ) -> EngineResult<Settlement> {
        let settlement = store.settle_contest(contest, winner, |c, a, b| {
            if let Some(previous) = c.winner {
                return AlreadyDecidedSnafu {
                    contest: c.id,
                    winner: previous,
                }
                .fail();
            }
            ensure!(
                c.has_contestant(winner),
                InvalidWinnerSnafu {
                    contest: c.id,
                    winner
                }
            );
            let (score_a, score_b) = self.compute(a.score, b.score, a.id == winner);
            Ok([score_a, score_b])
        })?;
        info!(
            "Contest {}: rating {} beat rating {}, new scores {:?}",
            settlement.contest, settlement.winner, settlement.loser, settlement.scores
        );
        Ok(settlement)
    }
}

impl Default for RatingUpdater {
    fn default() -> Self {
        RatingUpdater::new(&EngineRules::DEFAULT_RULES)
    }
}
