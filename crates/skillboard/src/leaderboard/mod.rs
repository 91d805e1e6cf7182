//! Scoring and ranking of heterogeneous per-platform activity metrics.
//!
//! Snapshots flow through extraction, normalization, weighting and aggregation per user,
//! are ranked across users, and are published into a per-scope cache that readers access
//! without waiting for rebuilds.

pub mod cache;
pub mod domain;
pub mod export;
pub mod ranker;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod service;

#[cfg(test)]
mod tests;

pub use cache::{CacheState, CachedLeaderboard, LeaderboardCache, RebuildGuard};
pub use domain::{
    group_by_user, LeaderboardScope, MetricRecord, MetricSnapshot, MetricValue, Platform,
    PlatformScore, RankedEntry, UnknownScope, UserId, UserScore, UserSnapshots,
};
pub use ranker::rank;
pub use repository::{LeaderboardRepository, RepositoryError, SnapshotSource, SourceError};
pub use router::{leaderboard_router, LeaderboardQuery, LeaderboardView};
pub use scoring::{
    aggregate_scores, extract, mean_normalized, normalize, weighted_score, AggregationPolicy,
    LeaderboardBuild, MetricRange, ScoringConfig, ScoringConfigError, ScoringEngine,
    SkippedUser, UserScoreError,
};
pub use service::{
    LeaderboardService, LeaderboardServiceError, RebuildReport, DEFAULT_REBUILD_TIMEOUT,
};
