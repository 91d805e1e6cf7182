use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use super::common::*;
use crate::leaderboard::domain::LeaderboardScope;
use crate::leaderboard::router::leaderboard_router;
use crate::leaderboard::service::LeaderboardService;

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("request builds")
}

fn post(uri: &str) -> Request<Body> {
    Request::post(uri).body(Body::empty()).expect("request builds")
}

#[tokio::test]
async fn read_returns_not_found_before_first_rebuild() {
    let (service, _, _) = build_service(roster());
    let router = leaderboard_router(Arc::new(service), Duration::from_secs(5));

    let response = router
        .oneshot(get("/api/v1/leaderboard/global"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "empty");
}

#[tokio::test]
async fn read_rejects_unknown_scope() {
    let (service, _, _) = build_service(roster());
    let router = leaderboard_router(Arc::new(service), Duration::from_secs(5));

    let response = router
        .oneshot(get("/api/v1/leaderboard/monthly"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rebuild_then_read_serves_ranked_page() {
    let (service, _, _) = build_service(roster());
    let router = leaderboard_router(Arc::new(service), Duration::from_secs(5));

    let response = router
        .clone()
        .oneshot(post("/api/v1/leaderboard/global/rebuild"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let report = read_json_body(response).await;
    assert_eq!(report["entries"], 3);
    assert_eq!(report["scope"], "global");

    let response = router
        .oneshot(get("/api/v1/leaderboard/global?offset=1&limit=1"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["total"], 3);
    assert_eq!(payload["version"], 1);
    let entries = payload["entries"].as_array().expect("entries array");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["user_id"], "grace");
    assert_eq!(entries[0]["rank"], 2);
}

#[tokio::test]
async fn entry_lookup_finds_ranked_user() {
    let (service, _, _) = build_service(roster());
    service
        .rebuild_at(LeaderboardScope::Global, at(12, 0))
        .expect("rebuild");
    let router = leaderboard_router(Arc::new(service), Duration::from_secs(5));

    let response = router
        .clone()
        .oneshot(get("/api/v1/leaderboard/global/users/linus"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["rank"], 3);
    assert_eq!(payload["score"], 25.0);

    let response = router
        .oneshot(get("/api/v1/leaderboard/global/users/nobody"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rebuild_failure_maps_to_bad_gateway_and_keeps_board() {
    let (service, source, _) = build_service(roster());
    service
        .rebuild_at(LeaderboardScope::Global, at(12, 0))
        .expect("rebuild");
    source.set_unavailable(true);
    let router = leaderboard_router(Arc::new(service), Duration::from_secs(5));

    let response = router
        .clone()
        .oneshot(post("/api/v1/leaderboard/global/rebuild"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let response = router
        .oneshot(get("/api/v1/leaderboard/global"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["entries"].as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn rebuild_request_during_running_rebuild_is_a_conflict() {
    let (source, entered, release) = GatedSource::new(roster());
    let service = Arc::new(
        LeaderboardService::new(source, Arc::new(MemoryRepository::default()), scoring_config())
            .expect("valid config"),
    );
    let worker = service.clone();
    let running = std::thread::spawn(move || worker.rebuild(LeaderboardScope::Global));
    entered
        .recv_timeout(Duration::from_secs(5))
        .expect("rebuild reached the source");

    let router = leaderboard_router(service.clone(), Duration::from_secs(5));
    let response = router
        .oneshot(post("/api/v1/leaderboard/global/rebuild"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    release.send(()).expect("release fetch");
    running
        .join()
        .expect("rebuild thread")
        .expect("running rebuild completes");
    assert!(service.read(LeaderboardScope::Global).is_some());
}
