use crate::ranker::*;

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionRules {
    #[serde(rename = "defaultScore")]
    pub default_score: Option<f64>,
    #[serde(rename = "kFactor")]
    pub k_factor: Option<f64>,
    #[serde(rename = "ratingScale")]
    pub rating_scale: Option<f64>,
    #[serde(rename = "rankingMethod")]
    pub ranking_method: Option<String>,
    #[serde(rename = "randomSeed")]
    _random_seed: Option<JSValue>,
}

impl SessionRules {
    /// The seed of the sampler, given either as a number or as a string.
    pub fn random_seed(&self) -> RankerResult<Option<u64>> {
        if self._random_seed.is_some() {
            read_js_int(&self._random_seed).map(Some)
        } else {
            Ok(None)
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SessionTopic {
    pub label: String,
    pub items: Vec<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SessionContest {
    pub topic: String,
    pub voter: u64,
    /// The two items shown to the voter. Drawn at random if missing.
    pub items: Option<Vec<String>>,
    /// The item picked by the voter.
    pub winner: Option<String>,
    /// The side picked by the voter (0 or 1), for contests drawn at random.
    /// The contest stays open if neither `winner` nor `pick` is given.
    pub pick: Option<usize>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub rules: SessionRules,
    pub topics: Vec<SessionTopic>,
    #[serde(default)]
    pub contests: Vec<SessionContest>,
    #[serde(rename = "deletedItems", default)]
    pub deleted_items: Vec<String>,
}

pub fn read_config(path: &str) -> RankerResult<SessionConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    serde_json::from_str(&contents).context(ParsingJsonSnafu { path })
}

pub fn read_summary(path: &str) -> RankerResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    debug!("read content: {:?}", contents);
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    Ok(js)
}

fn read_js_int(x: &Option<JSValue>) -> RankerResult<u64> {
    match x {
        Some(JSValue::Number(n)) => n.as_u64().context(ParsingJsonNumberSnafu {}),
        Some(JSValue::String(s)) => s.parse::<u64>().ok().context(ParsingJsonNumberSnafu {}),
        _ => None.context(ParsingJsonNumberSnafu {}),
    }
}

pub fn parse_method(method: &str) -> RankerResult<RankingMethod> {
    match method {
        "pairwise" => Ok(RankingMethod::Pairwise),
        "ranked_preference" => Ok(RankingMethod::RankedPreference),
        x => whatever!("Unknown ranking method {:?}: expected pairwise or ranked_preference", x),
    }
}

pub fn validate_rules(rules: &SessionRules) -> RankerResult<EngineRules> {
    let defaults = EngineRules::DEFAULT_RULES;
    let res = EngineRules {
        default_score: match rules.default_score {
            None => defaults.default_score,
            Some(x) if x.is_finite() => x,
            x => whatever!("Cannot use defaultScore {:?}: not a finite number", x),
        },
        k_factor: match rules.k_factor {
            None => defaults.k_factor,
            Some(x) if x.is_finite() && x > 0.0 => x,
            x => whatever!("Cannot use kFactor {:?}: expected a positive number", x),
        },
        rating_scale: match rules.rating_scale {
            None => defaults.rating_scale,
            Some(x) if x.is_finite() && x > 0.0 => x,
            x => whatever!("Cannot use ratingScale {:?}: expected a positive number", x),
        },
        ranking_method: match rules.ranking_method.as_deref() {
            None => defaults.ranking_method,
            Some(m) => parse_method(m)?,
        },
    };
    Ok(res)
}
