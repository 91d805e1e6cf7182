use crate::cli::ServeArgs;
use crate::infra::{load_snapshots, AppState, InMemorySnapshotSource, LeaderboardStore};
use crate::refresh::spawn_refresh;
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use skillboard::config::AppConfig;
use skillboard::error::AppError;
use skillboard::leaderboard::LeaderboardService;
use skillboard::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let source = Arc::new(InMemorySnapshotSource::default());
    if let Some(path) = config.leaderboard.snapshot_path.as_deref() {
        let snapshots = source.register(load_snapshots(path)?)?;
        info!(
            path = %path.display(),
            users = source.user_count(),
            snapshots,
            "seeded snapshot source"
        );
    }

    let repository = Arc::new(LeaderboardStore::from_path(
        config.leaderboard.cache_path.as_deref(),
    ));
    let service = Arc::new(
        LeaderboardService::new(source.clone(), repository, config.scoring.clone())?
            .with_rebuild_timeout(config.leaderboard.rebuild_timeout),
    );

    // A corrupt or unreachable cache only costs the warm start.
    if let Err(err) = service.hydrate() {
        warn!(error = %err, "failed to hydrate leaderboards from storage");
    }

    match config.leaderboard.refresh_interval {
        Some(every) => {
            spawn_refresh(service.clone(), every, config.leaderboard.rebuild_timeout);
            info!(every_secs = every.as_secs(), "periodic leaderboard refresh enabled");
        }
        None => info!("periodic leaderboard refresh disabled"),
    }

    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        source,
    };

    let app = with_service_routes(service, config.leaderboard.rebuild_timeout)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, policy = %config.scoring.policy, "skillboard ready");

    axum::serve(listener, app).await?;
    Ok(())
}
