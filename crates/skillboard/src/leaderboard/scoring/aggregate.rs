use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::super::domain::{Platform, PlatformScore};
use super::config::ScoringConfig;

/// How a user's per-platform scores fold into one composite score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPolicy {
    /// Sum of weighted normalized scores; every connection adds to the total.
    WeightedSum,
    /// Unweighted mean of normalized scores, used for full leaderboard assembly.
    #[default]
    NormalizedMean,
}

impl AggregationPolicy {
    pub fn label(&self) -> &'static str {
        match self {
            AggregationPolicy::WeightedSum => "weighted_sum",
            AggregationPolicy::NormalizedMean => "normalized_mean",
        }
    }

    pub fn apply(&self, config: &ScoringConfig, scores: &[PlatformScore]) -> f64 {
        match self {
            AggregationPolicy::WeightedSum => aggregate_scores(config, scores),
            AggregationPolicy::NormalizedMean => mean_normalized(scores),
        }
    }
}

impl fmt::Display for AggregationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for AggregationPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "weighted_sum" | "sum" => Ok(AggregationPolicy::WeightedSum),
            "normalized_mean" | "mean" => Ok(AggregationPolicy::NormalizedMean),
            other => Err(format!(
                "unknown aggregation policy '{other}' (expected 'weighted_sum' or 'normalized_mean')"
            )),
        }
    }
}

pub fn weighted_score(config: &ScoringConfig, platform: &Platform, normalized: f64) -> f64 {
    normalized * config.weight(platform)
}

/// Additive composite: `Σ normalized × weight(platform)`. Empty input scores 0.
pub fn aggregate_scores(config: &ScoringConfig, scores: &[PlatformScore]) -> f64 {
    scores
        .iter()
        .map(|entry| weighted_score(config, &entry.platform, entry.score))
        .sum()
}

/// Mean of the normalized scores, ignoring weights. Empty input scores 0.
pub fn mean_normalized(scores: &[PlatformScore]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let total: f64 = scores.iter().map(|entry| entry.score).sum();
    total / scores.len() as f64
}
