use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::domain::{LeaderboardScope, RankedEntry, UserId};
use super::repository::{LeaderboardRepository, SnapshotSource};
use super::service::{LeaderboardService, LeaderboardServiceError};

/// Shared state for the leaderboard routes.
pub struct LeaderboardRouterState<S, R> {
    pub service: Arc<LeaderboardService<S, R>>,
    /// Upper bound a rebuild request waits before answering `504`.
    pub rebuild_timeout: Duration,
}

impl<S, R> Clone for LeaderboardRouterState<S, R> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            rebuild_timeout: self.rebuild_timeout,
        }
    }
}

/// Pagination for leaderboard reads.
#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Serialized view of a published leaderboard page.
#[derive(Debug, Serialize)]
pub struct LeaderboardView {
    pub scope: LeaderboardScope,
    pub version: u64,
    pub computed_at: DateTime<Utc>,
    pub total: usize,
    pub entries: Vec<RankedEntry>,
}

/// Router builder exposing the read and rebuild endpoints.
pub fn leaderboard_router<S, R>(
    service: Arc<LeaderboardService<S, R>>,
    rebuild_timeout: Duration,
) -> Router
where
    S: SnapshotSource + 'static,
    R: LeaderboardRepository + 'static,
{
    Router::new()
        .route("/api/v1/leaderboard/:scope", get(read_handler::<S, R>))
        .route(
            "/api/v1/leaderboard/:scope/users/:user_id",
            get(entry_handler::<S, R>),
        )
        .route(
            "/api/v1/leaderboard/:scope/rebuild",
            post(rebuild_handler::<S, R>),
        )
        .with_state(LeaderboardRouterState {
            service,
            rebuild_timeout,
        })
}

fn parse_scope(raw: &str) -> Result<LeaderboardScope, Response> {
    raw.parse::<LeaderboardScope>().map_err(|err| {
        let payload = json!({ "error": err.to_string() });
        (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
    })
}

fn not_computed(scope: LeaderboardScope) -> Response {
    let payload = json!({
        "scope": scope.label(),
        "status": "empty",
        "error": "leaderboard has not been computed yet",
    });
    (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
}

pub(crate) async fn read_handler<S, R>(
    State(state): State<LeaderboardRouterState<S, R>>,
    Path(scope): Path<String>,
    Query(query): Query<LeaderboardQuery>,
) -> Response
where
    S: SnapshotSource + 'static,
    R: LeaderboardRepository + 'static,
{
    let scope = match parse_scope(&scope) {
        Ok(scope) => scope,
        Err(response) => return response,
    };

    match state.service.read(scope) {
        Some(board) => {
            let view = LeaderboardView {
                scope,
                version: board.version,
                computed_at: board.computed_at,
                total: board.entries.len(),
                entries: board.page(query.offset, query.limit).to_vec(),
            };
            (StatusCode::OK, axum::Json(view)).into_response()
        }
        None => not_computed(scope),
    }
}

pub(crate) async fn entry_handler<S, R>(
    State(state): State<LeaderboardRouterState<S, R>>,
    Path((scope, user_id)): Path<(String, String)>,
) -> Response
where
    S: SnapshotSource + 'static,
    R: LeaderboardRepository + 'static,
{
    let scope = match parse_scope(&scope) {
        Ok(scope) => scope,
        Err(response) => return response,
    };

    let Some(board) = state.service.read(scope) else {
        return not_computed(scope);
    };

    let user_id = UserId(user_id);
    match board.entry(&user_id) {
        Some(entry) => (StatusCode::OK, axum::Json(entry.clone())).into_response(),
        None => {
            let payload = json!({
                "scope": scope.label(),
                "user_id": user_id.0,
                "error": "user is not ranked on this leaderboard",
            });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
    }
}

/// Runs the rebuild on the blocking pool. The timeout is passed down as the rebuild's
/// deadline, so a rebuild that overruns it publishes nothing. A request arriving while the
/// scope is already rebuilding is answered `409` instead of queueing.
pub(crate) async fn rebuild_handler<S, R>(
    State(state): State<LeaderboardRouterState<S, R>>,
    Path(scope): Path<String>,
) -> Response
where
    S: SnapshotSource + 'static,
    R: LeaderboardRepository + 'static,
{
    let scope = match parse_scope(&scope) {
        Ok(scope) => scope,
        Err(response) => return response,
    };

    let service = state.service.clone();
    let timeout = state.rebuild_timeout;
    let task = tokio::task::spawn_blocking(move || service.try_rebuild(scope, timeout));

    match tokio::time::timeout(state.rebuild_timeout, task).await {
        Ok(Ok(Ok(report))) => (StatusCode::OK, axum::Json(report)).into_response(),
        Ok(Ok(Err(err))) => rebuild_error_response(scope, err),
        Ok(Err(join_error)) => {
            error!(%scope, error = %join_error, "rebuild task failed");
            let payload = json!({ "error": "rebuild task failed" });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
        Err(_) => {
            let payload = json!({
                "scope": scope.label(),
                "error": format!(
                    "rebuild did not finish within {}s",
                    state.rebuild_timeout.as_secs_f64()
                ),
            });
            (StatusCode::GATEWAY_TIMEOUT, axum::Json(payload)).into_response()
        }
    }
}

fn rebuild_error_response(scope: LeaderboardScope, err: LeaderboardServiceError) -> Response {
    let status = match err {
        LeaderboardServiceError::Source(_) => StatusCode::BAD_GATEWAY,
        LeaderboardServiceError::NoScorableUsers { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        LeaderboardServiceError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        LeaderboardServiceError::RebuildInProgress { .. } => StatusCode::CONFLICT,
        LeaderboardServiceError::DeadlineExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
    };
    let payload = json!({
        "scope": scope.label(),
        "error": err.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}
