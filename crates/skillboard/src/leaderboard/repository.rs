use std::time::Instant;

use super::cache::CachedLeaderboard;
use super::domain::{LeaderboardScope, UserSnapshots};

/// Supplies already-collected snapshots. Implemented by the data-collection subsystem.
///
/// Implementations that block should give up with [`SourceError::DeadlineExceeded`] once
/// `deadline` has passed.
pub trait SnapshotSource: Send + Sync {
    fn snapshots(
        &self,
        scope: LeaderboardScope,
        deadline: Instant,
    ) -> Result<Vec<UserSnapshots>, SourceError>;
}

/// Failure to obtain any snapshots; aborts the rebuild.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("snapshot source unavailable: {0}")]
    Unavailable(String),
    #[error("snapshot data malformed: {0}")]
    Malformed(String),
    #[error("snapshot source did not answer before the rebuild deadline")]
    DeadlineExceeded,
}

/// Storage abstraction for published leaderboards so the service can warm-start.
pub trait LeaderboardRepository: Send + Sync {
    fn load(&self, scope: LeaderboardScope) -> Result<Option<CachedLeaderboard>, RepositoryError>;
    /// Persist `board`, giving up with [`RepositoryError::DeadlineExceeded`] past `deadline`.
    fn store(&self, board: &CachedLeaderboard, deadline: Instant) -> Result<(), RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("repository unavailable: {0}")]
    Unavailable(String),
    #[error("stored leaderboard is corrupt: {0}")]
    Corrupt(String),
    #[error("leaderboard was not persisted before the rebuild deadline")]
    DeadlineExceeded,
}
