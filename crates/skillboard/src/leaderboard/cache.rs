use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, TryLockError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{LeaderboardScope, RankedEntry, UserId};

/// Published, immutable leaderboard for one scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedLeaderboard {
    pub scope: LeaderboardScope,
    pub version: u64,
    pub computed_at: DateTime<Utc>,
    pub entries: Vec<RankedEntry>,
}

impl CachedLeaderboard {
    pub fn entry(&self, user_id: &UserId) -> Option<&RankedEntry> {
        self.entries.iter().find(|entry| &entry.user_id == user_id)
    }

    pub fn page(&self, offset: usize, limit: Option<usize>) -> &[RankedEntry] {
        let start = offset.min(self.entries.len());
        let end = match limit {
            Some(limit) => start.saturating_add(limit).min(self.entries.len()),
            None => self.entries.len(),
        };
        &self.entries[start..end]
    }
}

/// Lifecycle of a scope's cache as seen by operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheState {
    Empty,
    Computing,
    Ready,
}

/// Holds the current leaderboard for one scope behind an atomically swapped `Arc`.
///
/// Readers clone the pointer and never wait on score computation. Rebuilds are serialized
/// through [`LeaderboardCache::begin_rebuild`]; the later rebuild publishes last and wins.
#[derive(Debug)]
pub struct LeaderboardCache {
    scope: LeaderboardScope,
    current: RwLock<Option<Arc<CachedLeaderboard>>>,
    rebuild_lock: Mutex<()>,
    computing: AtomicBool,
}

impl LeaderboardCache {
    pub fn new(scope: LeaderboardScope) -> Self {
        Self {
            scope,
            current: RwLock::new(None),
            rebuild_lock: Mutex::new(()),
            computing: AtomicBool::new(false),
        }
    }

    pub fn scope(&self) -> LeaderboardScope {
        self.scope
    }

    /// Last fully built leaderboard, if any.
    pub fn read(&self) -> Option<Arc<CachedLeaderboard>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn state(&self) -> CacheState {
        if self.computing.load(Ordering::Acquire) {
            CacheState::Computing
        } else if self.read().is_some() {
            CacheState::Ready
        } else {
            CacheState::Empty
        }
    }

    /// Wait for any in-flight rebuild, then take exclusive rebuild rights for this scope.
    pub fn begin_rebuild(&self) -> RebuildGuard<'_> {
        let lock = self
            .rebuild_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.computing.store(true, Ordering::Release);
        RebuildGuard {
            cache: self,
            _lock: lock,
        }
    }

    /// Take rebuild rights only if no other rebuild of this scope is running.
    pub fn try_begin_rebuild(&self) -> Option<RebuildGuard<'_>> {
        let lock = match self.rebuild_lock.try_lock() {
            Ok(lock) => lock,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        self.computing.store(true, Ordering::Release);
        Some(RebuildGuard {
            cache: self,
            _lock: lock,
        })
    }

    /// Install a leaderboard loaded from persistence unless a newer one is already present.
    pub fn restore(&self, board: CachedLeaderboard) -> bool {
        if board.scope != self.scope {
            return false;
        }
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let newer = current
            .as_ref()
            .map_or(true, |existing| board.version > existing.version);
        if newer {
            *current = Some(Arc::new(board));
        }
        newer
    }

    fn swap(&self, board: Arc<CachedLeaderboard>) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = Some(board);
    }
}

/// Exclusive right to publish the next version of a scope.
///
/// Dropping the guard without publishing leaves the previous leaderboard in place.
#[derive(Debug)]
pub struct RebuildGuard<'a> {
    cache: &'a LeaderboardCache,
    _lock: MutexGuard<'a, ()>,
}

impl RebuildGuard<'_> {
    pub fn previous(&self) -> Option<Arc<CachedLeaderboard>> {
        self.cache.read()
    }

    /// Stamp `entries` as the next version. The timestamp is forced strictly past the
    /// previous version's so readers can order published results.
    pub fn prepare(
        &self,
        entries: Vec<RankedEntry>,
        computed_at: DateTime<Utc>,
    ) -> CachedLeaderboard {
        let previous = self.previous();
        let (version, computed_at) = match previous.as_deref() {
            Some(previous) => {
                let computed_at = if computed_at > previous.computed_at {
                    computed_at
                } else {
                    previous.computed_at + Duration::milliseconds(1)
                };
                (previous.version + 1, computed_at)
            }
            None => (1, computed_at),
        };

        CachedLeaderboard {
            scope: self.cache.scope,
            version,
            computed_at,
            entries,
        }
    }

    /// Make `board` the value every subsequent reader sees.
    pub fn publish(self, board: CachedLeaderboard) -> Arc<CachedLeaderboard> {
        let board = Arc::new(board);
        self.cache.swap(board.clone());
        board
    }
}

impl Drop for RebuildGuard<'_> {
    fn drop(&mut self) {
        self.cache.computing.store(false, Ordering::Release);
    }
}
