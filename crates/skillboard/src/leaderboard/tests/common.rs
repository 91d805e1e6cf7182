use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::leaderboard::cache::CachedLeaderboard;
use crate::leaderboard::domain::{
    group_by_user, LeaderboardScope, MetricRecord, MetricSnapshot, Platform, UserId,
    UserSnapshots,
};
use crate::leaderboard::repository::{
    LeaderboardRepository, RepositoryError, SnapshotSource, SourceError,
};
use crate::leaderboard::scoring::ScoringConfig;
use crate::leaderboard::service::LeaderboardService;

pub(super) fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn snapshot(
    user: &str,
    platform: &str,
    metrics: MetricRecord,
    captured_at: DateTime<Utc>,
) -> MetricSnapshot {
    MetricSnapshot {
        user_id: UserId(user.to_string()),
        platform: Platform::new(platform),
        account_handle: None,
        metrics,
        metric_score: None,
        captured_at,
    }
}

pub(super) fn rating(user: &str, platform: &str, value: f64, day: u32) -> MetricSnapshot {
    snapshot(
        user,
        platform,
        MetricRecord::new().with("rating", value),
        at(day, 12),
    )
}

pub(super) fn user(id: &str, snapshots: Vec<MetricSnapshot>) -> UserSnapshots {
    UserSnapshots {
        user_id: UserId(id.to_string()),
        snapshots,
    }
}

/// Ratings chosen so the mean-normalized composites are distinct and easy to read:
/// ada 75, grace 50, linus 25.
pub(super) fn roster() -> Vec<UserSnapshots> {
    group_by_user(vec![
        rating("ada", "codeforces", 3000.0, 10),
        rating("grace", "leetcode", 1750.0, 10),
        rating("linus", "codeforces", 1000.0, 10),
    ])
}

pub(super) fn scoring_config() -> ScoringConfig {
    ScoringConfig::standard()
}

#[derive(Default)]
pub(super) struct MemorySource {
    pub(super) users: Mutex<Vec<UserSnapshots>>,
    pub(super) unavailable: AtomicBool,
}

impl MemorySource {
    pub(super) fn with_users(users: Vec<UserSnapshots>) -> Self {
        Self {
            users: Mutex::new(users),
            unavailable: AtomicBool::new(false),
        }
    }

    pub(super) fn replace(&self, users: Vec<UserSnapshots>) {
        *self.users.lock().expect("source mutex poisoned") = users;
    }

    pub(super) fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

impl SnapshotSource for MemorySource {
    fn snapshots(
        &self,
        _scope: LeaderboardScope,
        _deadline: Instant,
    ) -> Result<Vec<UserSnapshots>, SourceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("collector offline".to_string()));
        }
        Ok(self.users.lock().expect("source mutex poisoned").clone())
    }
}

/// Source that stalls inside `snapshots` until released, ignoring its deadline like a hung
/// collector would.
pub(super) struct GatedSource {
    users: Vec<UserSnapshots>,
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl GatedSource {
    /// Returns the source, a receiver signalled each time a fetch starts, and the sender that
    /// lets one fetch complete.
    pub(super) fn new(users: Vec<UserSnapshots>) -> (Arc<Self>, Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let source = Arc::new(Self {
            users,
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        (source, entered_rx, release_tx)
    }
}

impl SnapshotSource for GatedSource {
    fn snapshots(
        &self,
        _scope: LeaderboardScope,
        _deadline: Instant,
    ) -> Result<Vec<UserSnapshots>, SourceError> {
        let _ = self.entered.lock().expect("gate mutex poisoned").send(());
        self.release
            .lock()
            .expect("gate mutex poisoned")
            .recv()
            .map_err(|_| SourceError::Unavailable("gate closed".to_string()))?;
        Ok(self.users.clone())
    }
}

#[derive(Default)]
pub(super) struct MemoryRepository {
    pub(super) boards: Mutex<HashMap<LeaderboardScope, CachedLeaderboard>>,
    pub(super) failing: AtomicBool,
}

impl MemoryRepository {
    pub(super) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(super) fn stored(&self, scope: LeaderboardScope) -> Option<CachedLeaderboard> {
        self.boards
            .lock()
            .expect("repository mutex poisoned")
            .get(&scope)
            .cloned()
    }
}

impl LeaderboardRepository for MemoryRepository {
    fn load(&self, scope: LeaderboardScope) -> Result<Option<CachedLeaderboard>, RepositoryError> {
        Ok(self.stored(scope))
    }

    fn store(
        &self,
        board: &CachedLeaderboard,
        _deadline: Instant,
    ) -> Result<(), RepositoryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("disk full".to_string()));
        }
        self.boards
            .lock()
            .expect("repository mutex poisoned")
            .insert(board.scope, board.clone());
        Ok(())
    }
}

pub(super) fn build_service(
    users: Vec<UserSnapshots>,
) -> (
    LeaderboardService<MemorySource, MemoryRepository>,
    Arc<MemorySource>,
    Arc<MemoryRepository>,
) {
    let source = Arc::new(MemorySource::with_users(users));
    let repository = Arc::new(MemoryRepository::default());
    let service = LeaderboardService::new(source.clone(), repository.clone(), scoring_config())
        .expect("standard config is valid");
    (service, source, repository)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
