use crate::config::ConfigError;
use crate::leaderboard::{LeaderboardServiceError, ScoringConfigError, SourceError};
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Scoring(ScoringConfigError),
    Snapshots(SourceError),
    Leaderboard(LeaderboardServiceError),
    Export(csv::Error),
    Json(serde_json::Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Scoring(err) => write!(f, "scoring configuration error: {}", err),
            AppError::Snapshots(err) => write!(f, "snapshot error: {}", err),
            AppError::Leaderboard(err) => write!(f, "leaderboard error: {}", err),
            AppError::Export(err) => write!(f, "export error: {}", err),
            AppError::Json(err) => write!(f, "json error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Scoring(err) => Some(err),
            AppError::Snapshots(err) => Some(err),
            AppError::Leaderboard(err) => Some(err),
            AppError::Export(err) => Some(err),
            AppError::Json(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Snapshots(_) | AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::Leaderboard(LeaderboardServiceError::Source(_)) => StatusCode::BAD_GATEWAY,
            AppError::Leaderboard(LeaderboardServiceError::NoScorableUsers { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Leaderboard(LeaderboardServiceError::RebuildInProgress { .. }) => {
                StatusCode::CONFLICT
            }
            AppError::Leaderboard(LeaderboardServiceError::DeadlineExceeded { .. }) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Scoring(_)
            | AppError::Leaderboard(LeaderboardServiceError::Repository(_))
            | AppError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ScoringConfigError> for AppError {
    fn from(value: ScoringConfigError) -> Self {
        Self::Scoring(value)
    }
}

impl From<SourceError> for AppError {
    fn from(value: SourceError) -> Self {
        Self::Snapshots(value)
    }
}

impl From<LeaderboardServiceError> for AppError {
    fn from(value: LeaderboardServiceError) -> Self {
        Self::Leaderboard(value)
    }
}

impl From<csv::Error> for AppError {
    fn from(value: csv::Error) -> Self {
        Self::Export(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_failures_map_to_bad_gateway() {
        let err = AppError::from(LeaderboardServiceError::Source(SourceError::Unavailable(
            "collector offline".to_string(),
        )));
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn malformed_snapshots_map_to_bad_request() {
        let err = AppError::from(SourceError::Malformed("missing user_id".to_string()));
        assert!(err.to_string().contains("missing user_id"));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
