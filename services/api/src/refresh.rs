use skillboard::leaderboard::{
    LeaderboardRepository, LeaderboardScope, LeaderboardService, LeaderboardServiceError,
    RebuildReport, SnapshotSource,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Rebuild every scope on a fixed cadence. The first tick fires immediately so a fresh
/// process publishes without waiting a full interval.
pub(crate) fn spawn_refresh<S, R>(
    service: Arc<LeaderboardService<S, R>>,
    every: Duration,
    timeout: Duration,
) -> JoinHandle<()>
where
    S: SnapshotSource + 'static,
    R: LeaderboardRepository + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            for scope in LeaderboardScope::ordered() {
                refresh_scope(&service, scope, timeout).await;
            }
        }
    })
}

/// One bounded rebuild. The timeout doubles as the rebuild's deadline; failures are logged
/// and the previous leaderboard stays published.
pub(crate) async fn refresh_scope<S, R>(
    service: &Arc<LeaderboardService<S, R>>,
    scope: LeaderboardScope,
    timeout: Duration,
) -> Option<RebuildReport>
where
    S: SnapshotSource + 'static,
    R: LeaderboardRepository + 'static,
{
    let worker = service.clone();
    let task = tokio::task::spawn_blocking(move || worker.try_rebuild(scope, timeout));

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(report))) => {
            info!(%scope, version = report.version, "scheduled rebuild finished");
            Some(report)
        }
        Ok(Ok(Err(LeaderboardServiceError::RebuildInProgress { .. }))) => {
            debug!(%scope, "rebuild already running, skipping scheduled tick");
            None
        }
        Ok(Ok(Err(err))) => {
            warn!(%scope, error = %err, "scheduled rebuild failed");
            None
        }
        Ok(Err(join_error)) => {
            warn!(%scope, error = %join_error, "scheduled rebuild task aborted");
            None
        }
        Err(_) => {
            warn!(
                %scope,
                timeout_secs = timeout.as_secs_f64(),
                "scheduled rebuild still running after timeout"
            );
            None
        }
    }
}
