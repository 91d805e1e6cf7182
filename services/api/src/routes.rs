use crate::infra::{AppState, SnapshotBatch};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use serde::Serialize;
use serde_json::json;
use skillboard::error::AppError;
use skillboard::leaderboard::{
    leaderboard_router, LeaderboardRepository, LeaderboardService, SnapshotSource,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Serialize)]
pub(crate) struct IngestResponse {
    pub(crate) users: usize,
    pub(crate) snapshots: usize,
}

pub(crate) fn with_service_routes<S, R>(
    service: Arc<LeaderboardService<S, R>>,
    rebuild_timeout: Duration,
) -> axum::Router
where
    S: SnapshotSource + 'static,
    R: LeaderboardRepository + 'static,
{
    leaderboard_router(service, rebuild_timeout)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/snapshots",
            axum::routing::post(ingest_snapshots_endpoint),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Accept collector output. Ingested snapshots are picked up by the next rebuild.
pub(crate) async fn ingest_snapshots_endpoint(
    Extension(state): Extension<AppState>,
    Json(batch): Json<SnapshotBatch>,
) -> Result<(StatusCode, Json<IngestResponse>), AppError> {
    let users = batch.into_users();
    let user_count = users.len();
    let snapshots = state.source.register(users)?;
    info!(users = user_count, snapshots, "ingested snapshots");

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse {
            users: user_count,
            snapshots,
        }),
    ))
}
