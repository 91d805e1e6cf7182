use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use skillboard::leaderboard::{
    group_by_user, CachedLeaderboard, LeaderboardRepository, LeaderboardScope, MetricSnapshot,
    Platform, RepositoryError, SnapshotSource, SourceError, UserId, UserSnapshots,
};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) source: Arc<InMemorySnapshotSource>,
}

/// Snapshot payloads are accepted either flat, as collectors emit them, or already grouped
/// per user. Grouped input may list users with no connected platforms.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum SnapshotBatch {
    Flat(Vec<MetricSnapshot>),
    Grouped(Vec<UserSnapshots>),
}

impl SnapshotBatch {
    pub(crate) fn into_users(self) -> Vec<UserSnapshots> {
        match self {
            SnapshotBatch::Flat(snapshots) => group_by_user(snapshots),
            SnapshotBatch::Grouped(users) => users,
        }
    }
}

pub(crate) fn load_snapshots(path: &Path) -> Result<Vec<UserSnapshots>, SourceError> {
    let raw = fs::read_to_string(path).map_err(|err| {
        SourceError::Unavailable(format!("failed to read {}: {err}", path.display()))
    })?;
    let batch: SnapshotBatch = serde_json::from_str(&raw).map_err(|err| {
        SourceError::Malformed(format!("failed to parse {}: {err}", path.display()))
    })?;
    Ok(batch.into_users())
}

/// One platform account of a user.
type ConnectionKey = (Platform, Option<String>);

/// Snapshot store fed by ingestion and the startup seed file. Only the newest snapshot per
/// platform account is retained, which is the only one scoring reads.
#[derive(Default)]
pub(crate) struct InMemorySnapshotSource {
    users: RwLock<BTreeMap<UserId, BTreeMap<ConnectionKey, MetricSnapshot>>>,
}

impl InMemorySnapshotSource {
    /// Merge `users` into the store, returning how many snapshots were accepted. A batch
    /// with a blank user id or a snapshot filed under another user is rejected whole.
    pub(crate) fn register(&self, users: Vec<UserSnapshots>) -> Result<usize, SourceError> {
        for user in &users {
            if user.user_id.0.trim().is_empty() {
                return Err(SourceError::Malformed("snapshot without user_id".to_string()));
            }
            if let Some(foreign) = user
                .snapshots
                .iter()
                .find(|snapshot| snapshot.user_id != user.user_id)
            {
                return Err(SourceError::Malformed(format!(
                    "snapshot for user {} filed under user {}",
                    foreign.user_id, user.user_id
                )));
            }
        }

        let mut guard = self
            .users
            .write()
            .map_err(|_| SourceError::Unavailable("snapshot store poisoned".to_string()))?;

        let mut accepted = 0;
        for user in users {
            let connections = guard.entry(user.user_id).or_default();
            for snapshot in user.snapshots {
                accepted += 1;
                let key = (snapshot.platform.clone(), snapshot.account_handle.clone());
                let newer = connections
                    .get(&key)
                    .map_or(true, |current| snapshot.captured_at >= current.captured_at);
                if newer {
                    connections.insert(key, snapshot);
                }
            }
        }
        Ok(accepted)
    }

    pub(crate) fn user_count(&self) -> usize {
        self.users.read().map(|guard| guard.len()).unwrap_or_default()
    }
}

impl SnapshotSource for InMemorySnapshotSource {
    fn snapshots(
        &self,
        _scope: LeaderboardScope,
        _deadline: Instant,
    ) -> Result<Vec<UserSnapshots>, SourceError> {
        let guard = self
            .users
            .read()
            .map_err(|_| SourceError::Unavailable("snapshot store poisoned".to_string()))?;
        Ok(guard
            .iter()
            .map(|(user_id, connections)| UserSnapshots {
                user_id: user_id.clone(),
                snapshots: connections.values().cloned().collect(),
            })
            .collect())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryLeaderboardRepository {
    boards: Arc<Mutex<HashMap<LeaderboardScope, CachedLeaderboard>>>,
}

impl LeaderboardRepository for InMemoryLeaderboardRepository {
    fn load(&self, scope: LeaderboardScope) -> Result<Option<CachedLeaderboard>, RepositoryError> {
        let guard = self
            .boards
            .lock()
            .map_err(|_| RepositoryError::Unavailable("repository mutex poisoned".to_string()))?;
        Ok(guard.get(&scope).cloned())
    }

    fn store(&self, board: &CachedLeaderboard, _deadline: Instant) -> Result<(), RepositoryError> {
        let mut guard = self
            .boards
            .lock()
            .map_err(|_| RepositoryError::Unavailable("repository mutex poisoned".to_string()))?;
        guard.insert(board.scope, board.clone());
        Ok(())
    }
}

/// One `<scope>.json` file per leaderboard under `dir`.
#[derive(Debug, Clone)]
pub(crate) struct JsonFileLeaderboardRepository {
    dir: PathBuf,
}

impl JsonFileLeaderboardRepository {
    pub(crate) fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, scope: LeaderboardScope) -> PathBuf {
        self.dir.join(format!("{}.json", scope.label()))
    }
}

impl LeaderboardRepository for JsonFileLeaderboardRepository {
    fn load(&self, scope: LeaderboardScope) -> Result<Option<CachedLeaderboard>, RepositoryError> {
        let path = self.path(scope);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .map_err(|err| RepositoryError::Unavailable(format!("{}: {err}", path.display())))?;
        let board: CachedLeaderboard = serde_json::from_str(&raw)
            .map_err(|err| RepositoryError::Corrupt(format!("{}: {err}", path.display())))?;
        if board.scope != scope {
            return Err(RepositoryError::Corrupt(format!(
                "{} holds the {} leaderboard",
                path.display(),
                board.scope
            )));
        }
        Ok(Some(board))
    }

    fn store(&self, board: &CachedLeaderboard, deadline: Instant) -> Result<(), RepositoryError> {
        let unavailable =
            |err: std::io::Error| RepositoryError::Unavailable(format!("{}: {err}", self.dir.display()));

        fs::create_dir_all(&self.dir).map_err(unavailable)?;
        let payload = serde_json::to_vec_pretty(board)
            .map_err(|err| RepositoryError::Corrupt(err.to_string()))?;

        // Readers of the directory only ever see a complete file.
        let path = self.path(board.scope);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, payload).map_err(unavailable)?;
        if Instant::now() >= deadline {
            let _ = fs::remove_file(&staging);
            return Err(RepositoryError::DeadlineExceeded);
        }
        fs::rename(&staging, &path).map_err(unavailable)?;
        Ok(())
    }
}

/// Repository selected at startup from `APP_CACHE_PATH`.
#[derive(Clone)]
pub(crate) enum LeaderboardStore {
    Memory(InMemoryLeaderboardRepository),
    File(JsonFileLeaderboardRepository),
}

impl LeaderboardStore {
    pub(crate) fn from_path(path: Option<&Path>) -> Self {
        match path {
            Some(dir) => Self::File(JsonFileLeaderboardRepository::new(dir)),
            None => Self::Memory(InMemoryLeaderboardRepository::default()),
        }
    }
}

impl LeaderboardRepository for LeaderboardStore {
    fn load(&self, scope: LeaderboardScope) -> Result<Option<CachedLeaderboard>, RepositoryError> {
        match self {
            Self::Memory(repository) => repository.load(scope),
            Self::File(repository) => repository.load(scope),
        }
    }

    fn store(&self, board: &CachedLeaderboard, deadline: Instant) -> Result<(), RepositoryError> {
        match self {
            Self::Memory(repository) => repository.store(board, deadline),
            Self::File(repository) => repository.store(board, deadline),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use skillboard::leaderboard::{MetricRecord, RankedEntry};
    use std::time::Duration;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "skillboard-api-{name}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn board(scope: LeaderboardScope, version: u64) -> CachedLeaderboard {
        CachedLeaderboard {
            scope,
            version,
            computed_at: Utc
                .with_ymd_and_hms(2025, 3, 10, 12, 0, 0)
                .single()
                .expect("valid timestamp"),
            entries: vec![RankedEntry {
                user_id: UserId("ada".to_string()),
                score: 75.0,
                rank: 1,
            }],
        }
    }

    #[test]
    fn flat_and_grouped_batches_both_parse() {
        let flat: SnapshotBatch = serde_json::from_str(
            r#"[{"user_id": "ada", "platform": "codeforces", "metrics": {"rating": 3000},
                 "captured_at": "2025-03-10T12:00:00Z"}]"#,
        )
        .expect("flat batch parses");
        let users = flat.into_users();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].snapshots.len(), 1);

        let grouped: SnapshotBatch =
            serde_json::from_str(r#"[{"user_id": "newcomer"}]"#).expect("grouped batch parses");
        let users = grouped.into_users();
        assert_eq!(users[0].user_id, UserId("newcomer".to_string()));
        assert!(users[0].snapshots.is_empty());
    }

    #[test]
    fn register_merges_users_and_rejects_blank_ids() {
        let source = InMemorySnapshotSource::default();
        let users = vec![
            UserSnapshots::new(UserId("ada".to_string())),
            UserSnapshots::new(UserId("grace".to_string())),
        ];
        assert_eq!(source.register(users).expect("registers"), 0);
        assert_eq!(source.user_count(), 2);

        let blank = vec![UserSnapshots::new(UserId("  ".to_string()))];
        assert!(matches!(
            source.register(blank),
            Err(SourceError::Malformed(_))
        ));
        assert_eq!(source.user_count(), 2);
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn rating(user: &str, handle: Option<&str>, value: f64, hour: u32) -> MetricSnapshot {
        MetricSnapshot {
            user_id: UserId(user.to_string()),
            platform: Platform::new("codeforces"),
            account_handle: handle.map(str::to_string),
            metrics: MetricRecord::new().with("rating", value),
            metric_score: None,
            captured_at: at(hour),
        }
    }

    fn stored_ratings(source: &InMemorySnapshotSource) -> Vec<(Option<String>, f64)> {
        let users = source
            .snapshots(LeaderboardScope::Global, Instant::now() + Duration::from_secs(5))
            .expect("snapshots readable");
        users
            .into_iter()
            .flat_map(|user| user.snapshots)
            .map(|snapshot| {
                let value = snapshot
                    .metrics
                    .get("rating")
                    .and_then(|value| value.as_number())
                    .unwrap_or_default();
                (snapshot.account_handle, value)
            })
            .collect()
    }

    #[test]
    fn register_rejects_snapshots_filed_under_another_user() {
        let source = InMemorySnapshotSource::default();
        let mixed = vec![UserSnapshots {
            user_id: UserId("ada".to_string()),
            snapshots: vec![rating("grace", None, 1200.0, 8)],
        }];
        assert!(matches!(
            source.register(mixed),
            Err(SourceError::Malformed(_))
        ));
        assert_eq!(source.user_count(), 0);

        let valid = vec![UserSnapshots {
            user_id: UserId("ada".to_string()),
            snapshots: vec![rating("ada", None, 3000.0, 9)],
        }];
        assert_eq!(source.register(valid).expect("registers"), 1);
        assert_eq!(stored_ratings(&source), vec![(None, 3000.0)]);
    }

    #[test]
    fn register_keeps_only_latest_snapshot_per_account() {
        let source = InMemorySnapshotSource::default();
        let users = vec![UserSnapshots {
            user_id: UserId("ada".to_string()),
            snapshots: vec![
                rating("ada", None, 2900.0, 10),
                rating("ada", None, 2500.0, 8),
                rating("ada", Some("ada_alt"), 1800.0, 9),
            ],
        }];
        assert_eq!(source.register(users).expect("registers"), 3);

        let stale = vec![UserSnapshots {
            user_id: UserId("ada".to_string()),
            snapshots: vec![rating("ada", None, 1000.0, 7)],
        }];
        assert_eq!(source.register(stale).expect("registers"), 1);

        assert_eq!(
            stored_ratings(&source),
            vec![(None, 2900.0), (Some("ada_alt".to_string()), 1800.0)]
        );
    }

    #[test]
    fn file_repository_discards_write_past_deadline() {
        let dir = scratch_dir("deadline");
        let repository = JsonFileLeaderboardRepository::new(&dir);

        let result = repository.store(&board(LeaderboardScope::Global, 1), Instant::now());
        assert!(matches!(result, Err(RepositoryError::DeadlineExceeded)));
        assert!(!dir.join("global.json").exists());
        assert!(!dir.join("global.json.tmp").exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn file_repository_round_trips_and_checks_scope() {
        let dir = scratch_dir("repository");
        let repository = JsonFileLeaderboardRepository::new(&dir);
        assert_eq!(
            repository
                .load(LeaderboardScope::Global)
                .expect("missing file is empty"),
            None
        );

        let stored = board(LeaderboardScope::Global, 4);
        repository
            .store(&stored, Instant::now() + Duration::from_secs(5))
            .expect("stores");
        assert_eq!(
            repository.load(LeaderboardScope::Global).expect("loads"),
            Some(stored)
        );
        assert!(!dir.join("global.json.tmp").exists());

        fs::copy(dir.join("global.json"), dir.join("weekly.json")).expect("copies");
        assert!(matches!(
            repository.load(LeaderboardScope::Weekly),
            Err(RepositoryError::Corrupt(_))
        ));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_seed_file_is_unavailable() {
        let result = load_snapshots(Path::new("/nonexistent/skillboard-snapshots.json"));
        assert!(matches!(result, Err(SourceError::Unavailable(_))));
    }
}
