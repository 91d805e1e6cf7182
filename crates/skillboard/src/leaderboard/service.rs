use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::cache::{CacheState, CachedLeaderboard, LeaderboardCache, RebuildGuard};
use super::domain::{LeaderboardScope, RankedEntry, UserId, UserSnapshots};
use super::repository::{LeaderboardRepository, RepositoryError, SnapshotSource, SourceError};
use super::scoring::{
    AggregationPolicy, ScoringConfig, ScoringConfigError, ScoringEngine, SkippedUser,
};

/// Upper bound on one rebuild unless overridden with
/// [`LeaderboardService::with_rebuild_timeout`].
pub const DEFAULT_REBUILD_TIMEOUT: Duration = Duration::from_secs(30);

/// Service composing the snapshot source, scoring engine, per-scope caches, and repository.
pub struct LeaderboardService<S, R> {
    source: Arc<S>,
    repository: Arc<R>,
    engine: ScoringEngine,
    policy: AggregationPolicy,
    rebuild_timeout: Duration,
    caches: BTreeMap<LeaderboardScope, LeaderboardCache>,
}

impl<S, R> LeaderboardService<S, R>
where
    S: SnapshotSource + 'static,
    R: LeaderboardRepository + 'static,
{
    pub fn new(
        source: Arc<S>,
        repository: Arc<R>,
        config: ScoringConfig,
    ) -> Result<Self, ScoringConfigError> {
        let policy = config.policy;
        let engine = ScoringEngine::new(config)?;
        let caches = LeaderboardScope::ordered()
            .into_iter()
            .map(|scope| (scope, LeaderboardCache::new(scope)))
            .collect();

        Ok(Self {
            source,
            repository,
            engine,
            policy,
            rebuild_timeout: DEFAULT_REBUILD_TIMEOUT,
            caches,
        })
    }

    /// Override the aggregation policy used for leaderboard assembly.
    pub fn with_policy(mut self, policy: AggregationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Bound applied to rebuilds that are not given an explicit timeout.
    pub fn with_rebuild_timeout(mut self, timeout: Duration) -> Self {
        self.rebuild_timeout = timeout;
        self
    }

    pub fn engine(&self) -> &ScoringEngine {
        &self.engine
    }

    pub fn policy(&self) -> AggregationPolicy {
        self.policy
    }

    fn cache(&self, scope: LeaderboardScope) -> &LeaderboardCache {
        &self.caches[&scope]
    }

    /// Load persisted leaderboards into memory, returning how many scopes were restored.
    pub fn hydrate(&self) -> Result<usize, LeaderboardServiceError> {
        let mut restored = 0;
        for (scope, cache) in &self.caches {
            if let Some(board) = self.repository.load(*scope)? {
                if cache.restore(board) {
                    restored += 1;
                }
            }
        }
        info!(restored, "hydrated leaderboard caches");
        Ok(restored)
    }

    /// Rebuild `scope` from the snapshot source as of now, waiting for any rebuild already
    /// running on that scope.
    pub fn rebuild(
        &self,
        scope: LeaderboardScope,
    ) -> Result<RebuildReport, LeaderboardServiceError> {
        self.rebuild_at(scope, Utc::now())
    }

    /// Rebuild `scope` from the snapshot source as of `now`.
    pub fn rebuild_at(
        &self,
        scope: LeaderboardScope,
        now: DateTime<Utc>,
    ) -> Result<RebuildReport, LeaderboardServiceError> {
        let deadline = Instant::now() + self.rebuild_timeout;
        let guard = self.cache(scope).begin_rebuild();
        self.fetch_and_publish(guard, scope, now, deadline)
    }

    /// Rebuild `scope` unless a rebuild of it is already running, giving up once `timeout`
    /// has elapsed. The deadline is handed to the source and repository; a rebuild that
    /// misses it publishes nothing.
    pub fn try_rebuild(
        &self,
        scope: LeaderboardScope,
        timeout: Duration,
    ) -> Result<RebuildReport, LeaderboardServiceError> {
        let deadline = Instant::now() + timeout;
        let Some(guard) = self.cache(scope).try_begin_rebuild() else {
            debug!(%scope, "rebuild already running, not queueing another");
            return Err(LeaderboardServiceError::RebuildInProgress { scope });
        };
        self.fetch_and_publish(guard, scope, Utc::now(), deadline)
    }

    /// Rebuild `scope` from snapshots supplied directly by the caller.
    pub fn rebuild_from(
        &self,
        scope: LeaderboardScope,
        users: &[UserSnapshots],
        now: DateTime<Utc>,
    ) -> Result<RebuildReport, LeaderboardServiceError> {
        let deadline = Instant::now() + self.rebuild_timeout;
        let guard = self.cache(scope).begin_rebuild();
        self.publish(guard, scope, users, now, deadline)
    }

    fn fetch_and_publish(
        &self,
        guard: RebuildGuard<'_>,
        scope: LeaderboardScope,
        now: DateTime<Utc>,
        deadline: Instant,
    ) -> Result<RebuildReport, LeaderboardServiceError> {
        let users = self.source.snapshots(scope, deadline).map_err(|err| {
            warn!(%scope, error = %err, "snapshot source failed, keeping previous leaderboard");
            LeaderboardServiceError::from(err)
        })?;
        self.publish(guard, scope, &users, now, deadline)
    }

    fn publish(
        &self,
        guard: RebuildGuard<'_>,
        scope: LeaderboardScope,
        users: &[UserSnapshots],
        now: DateTime<Utc>,
        deadline: Instant,
    ) -> Result<RebuildReport, LeaderboardServiceError> {
        let since = scope.window().map(|window| now - window);
        let build = self.engine.build_with(users, self.policy, since);

        if build.entries.is_empty() && !build.skipped.is_empty() {
            warn!(
                %scope,
                skipped = build.skipped.len(),
                "no user could be scored, keeping previous leaderboard"
            );
            return Err(LeaderboardServiceError::NoScorableUsers {
                skipped: build.skipped.len(),
            });
        }

        ensure_before(scope, deadline)?;
        let board = guard.prepare(build.entries, now);
        self.repository.store(&board, deadline).map_err(|err| {
            warn!(%scope, error = %err, "failed to persist leaderboard, keeping previous");
            LeaderboardServiceError::from(err)
        })?;
        ensure_before(scope, deadline)?;
        let board = guard.publish(board);

        info!(
            %scope,
            version = board.version,
            entries = board.entries.len(),
            skipped = build.skipped.len(),
            policy = %self.policy,
            "leaderboard rebuilt"
        );

        Ok(RebuildReport {
            scope,
            version: board.version,
            computed_at: board.computed_at,
            entries: board.entries.len(),
            skipped: build.skipped,
        })
    }

    /// Last fully built leaderboard for `scope`; never waits on a rebuild in progress.
    pub fn read(&self, scope: LeaderboardScope) -> Option<Arc<CachedLeaderboard>> {
        self.cache(scope).read()
    }

    pub fn state(&self, scope: LeaderboardScope) -> CacheState {
        self.cache(scope).state()
    }

    pub fn entry(&self, scope: LeaderboardScope, user_id: &UserId) -> Option<RankedEntry> {
        self.read(scope).and_then(|board| board.entry(user_id).cloned())
    }
}

fn ensure_before(
    scope: LeaderboardScope,
    deadline: Instant,
) -> Result<(), LeaderboardServiceError> {
    if Instant::now() >= deadline {
        warn!(%scope, "rebuild missed its deadline, keeping previous leaderboard");
        return Err(LeaderboardServiceError::DeadlineExceeded { scope });
    }
    Ok(())
}

/// Outcome of a successful rebuild.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebuildReport {
    pub scope: LeaderboardScope,
    pub version: u64,
    pub computed_at: DateTime<Utc>,
    pub entries: usize,
    pub skipped: Vec<SkippedUser>,
}

/// Error raised by the leaderboard service. The previous leaderboard stays published.
#[derive(Debug, thiserror::Error)]
pub enum LeaderboardServiceError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("no user could be scored ({skipped} skipped)")]
    NoScorableUsers { skipped: usize },
    #[error("a rebuild of the {scope} leaderboard is already running")]
    RebuildInProgress { scope: LeaderboardScope },
    #[error("rebuild of the {scope} leaderboard missed its deadline")]
    DeadlineExceeded { scope: LeaderboardScope },
}
