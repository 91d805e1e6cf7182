mod aggregate;
mod config;
mod extractor;
mod normalizer;

pub use aggregate::{aggregate_scores, mean_normalized, weighted_score, AggregationPolicy};
pub use config::{MetricRange, ScoringConfig, ScoringConfigError, DEFAULT_PLATFORM_WEIGHT};
pub use extractor::{extract, extract_field, ExtractedMetric, ScorableField};
pub use normalizer::{normalize, SCALE_MAX};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::domain::{
    MetricSnapshot, Platform, PlatformScore, RankedEntry, UserId, UserScore, UserSnapshots,
};
use super::ranker::rank;

/// Stateless scorer applying one immutable [`ScoringConfig`] to snapshots.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    config: Arc<ScoringConfig>,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Result<Self, ScoringConfigError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// 0-100 score derived from the raw metrics of `snapshot`, ignoring any stored
    /// `metric_score`. This is the value collectors persist alongside a snapshot.
    pub fn metric_score(&self, snapshot: &MetricSnapshot) -> Option<f64> {
        let metric = extract_field(&snapshot.metrics)?;
        let range = match metric.field {
            ScorableField::Score => MetricRange::scale(),
            ScorableField::Rating | ScorableField::ProblemsSolved => {
                self.config.range(&snapshot.platform)
            }
        };
        Some(normalize(metric.value, range.min, range.max))
    }

    fn platform_score(
        &self,
        snapshot: &MetricSnapshot,
    ) -> Result<Option<PlatformScore>, UserScoreError> {
        let score = match snapshot.metric_score {
            Some(stored) if stored.is_finite() && (0.0..=SCALE_MAX).contains(&stored) => {
                Some(stored)
            }
            Some(stored) => {
                return Err(UserScoreError::InvalidMetricScore {
                    platform: snapshot.platform.clone(),
                    value: stored,
                })
            }
            None => self.metric_score(snapshot),
        };

        if score.is_none() {
            debug!(
                user_id = %snapshot.user_id,
                platform = %snapshot.platform,
                "snapshot carries no scorable metric"
            );
        }

        Ok(score.map(|score| PlatformScore {
            platform: snapshot.platform.clone(),
            score,
        }))
    }

    /// Normalized scores of the latest snapshot per platform connection.
    ///
    /// Snapshots captured before `since` are ignored. Snapshots without a scorable field are
    /// dropped rather than treated as errors.
    pub fn platform_scores(
        &self,
        user: &UserSnapshots,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<PlatformScore>, UserScoreError> {
        if user.user_id.0.trim().is_empty() {
            return Err(UserScoreError::MissingUserId);
        }

        let mut latest: BTreeMap<(&Platform, Option<&str>), &MetricSnapshot> = BTreeMap::new();
        for snapshot in &user.snapshots {
            if snapshot.user_id != user.user_id {
                return Err(UserScoreError::ForeignSnapshot {
                    owner: snapshot.user_id.clone(),
                });
            }
            if since.is_some_and(|cutoff| snapshot.captured_at < cutoff) {
                continue;
            }

            let key = (&snapshot.platform, snapshot.account_handle.as_deref());
            let newer = latest
                .get(&key)
                .map_or(true, |current| snapshot.captured_at >= current.captured_at);
            if newer {
                latest.insert(key, snapshot);
            }
        }

        let mut scores = Vec::with_capacity(latest.len());
        for snapshot in latest.into_values() {
            if let Some(score) = self.platform_score(snapshot)? {
                scores.push(score);
            }
        }
        Ok(scores)
    }

    /// Composite score for one user under `policy`.
    pub fn score_user(
        &self,
        user: &UserSnapshots,
        policy: AggregationPolicy,
        since: Option<DateTime<Utc>>,
    ) -> Result<UserScore, UserScoreError> {
        let scores = self.platform_scores(user, since)?;
        Ok(UserScore {
            user_id: user.user_id.clone(),
            score: policy.apply(&self.config, &scores),
        })
    }

    /// Score and rank every user with the configured aggregation policy.
    pub fn build(
        &self,
        users: &[UserSnapshots],
        since: Option<DateTime<Utc>>,
    ) -> LeaderboardBuild {
        self.build_with(users, self.config.policy, since)
    }

    /// Score and rank every user. A user whose data cannot be scored is skipped and
    /// reported instead of failing the batch.
    pub fn build_with(
        &self,
        users: &[UserSnapshots],
        policy: AggregationPolicy,
        since: Option<DateTime<Utc>>,
    ) -> LeaderboardBuild {
        let mut scored = Vec::with_capacity(users.len());
        let mut skipped = Vec::new();
        let mut seen = BTreeSet::new();

        for user in users {
            match self.platform_scores(user, since) {
                Ok(scores) => {
                    seen.extend(scores.iter().map(|entry| entry.platform.clone()));
                    scored.push(UserScore {
                        user_id: user.user_id.clone(),
                        score: policy.apply(&self.config, &scores),
                    });
                }
                Err(err) => {
                    warn!(
                        user_id = %user.user_id,
                        error = %err,
                        "skipping user during leaderboard build"
                    );
                    skipped.push(SkippedUser {
                        user_id: user.user_id.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        let unweighted: Vec<Platform> = seen
            .into_iter()
            .filter(|platform| !self.config.is_weighted(platform))
            .collect();
        for platform in &unweighted {
            warn!(
                %platform,
                default_weight = self.config.default_weight(),
                "no weight configured for platform, applying default"
            );
        }

        LeaderboardBuild {
            entries: rank(scored),
            skipped,
            unweighted,
        }
    }
}

/// Result of scoring and ranking one batch of users.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardBuild {
    pub entries: Vec<RankedEntry>,
    pub skipped: Vec<SkippedUser>,
    /// Scored platforms with no configured weight, in name order.
    pub unweighted: Vec<Platform>,
}

/// A user left out of a build, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedUser {
    pub user_id: UserId,
    pub reason: String,
}

/// Malformed per-user input. Isolated to that user during a build.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UserScoreError {
    #[error("user id is empty")]
    MissingUserId,
    #[error("snapshot belongs to user {owner}")]
    ForeignSnapshot { owner: UserId },
    #[error("stored metric score {value} for {platform} is outside 0-100")]
    InvalidMetricScore { platform: Platform, value: f64 },
}
