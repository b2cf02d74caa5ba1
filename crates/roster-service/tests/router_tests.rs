//! Integration tests for routing and bearer authentication.
//!
//! Exercises the full router (auth middleware, error mapping, handlers)
//! through `tower::ServiceExt::oneshot`. The matchmake endpoint runs
//! end-to-end since it needs no live backing store; store-coupled handlers
//! are covered by unit tests at their seams.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use roster_service::config::Config;
use roster_service::errors::RosterError;
use roster_service::models::Candidate;
use roster_service::observability::BackfillTrail;
use roster_service::repositories::{CandidateQuery, CandidateSource};
use roster_service::routes::{build_routes, AppState};
use roster_service::services::TimelinePublisher;
use roster_service::tasks::FanoutHandle;
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const TEST_SECRET: &str = "router-test-secret";

/// Candidate source that always comes back empty; the matchmake path never
/// touches it.
struct EmptyPool;

#[async_trait]
impl CandidateSource for EmptyPool {
    async fn fetch_candidates(
        &self,
        _query: &CandidateQuery,
    ) -> Result<Vec<Candidate>, RosterError> {
        Ok(vec![])
    }
}

fn test_state() -> Arc<AppState> {
    let vars = HashMap::from([
        (
            "DATABASE_URL".to_string(),
            "postgresql://localhost/roster_router_test".to_string(),
        ),
        ("JWT_SECRET".to_string(), TEST_SECRET.to_string()),
    ]);
    let config = Config::from_vars(&vars).expect("test config should load");

    // Lazy pool: no connection is made until a query runs, and none of the
    // routes under test touch the store.
    let pool = sqlx::PgPool::connect_lazy("postgresql://localhost/roster_router_test")
        .expect("lazy pool");

    let (fanout, _rx) = FanoutHandle::channel(4);

    Arc::new(AppState {
        pool: pool.clone(),
        config,
        candidates: Arc::new(EmptyPool),
        timeline: TimelinePublisher::new(pool, fanout),
        backfill_trail: Arc::new(BackfillTrail::new(16)),
    })
}

fn test_app() -> Router {
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .build_recorder()
        .handle();
    build_routes(test_state(), metrics_handle)
}

#[derive(serde::Serialize)]
struct TestClaims {
    sub: String,
    exp: i64,
    iat: i64,
}

fn sign_token(secret: &str) -> String {
    let now = Utc::now().timestamp();
    let claims = TestClaims {
        sub: format!("player:{}", Uuid::new_v4()),
        exp: now + 600,
        iat: now,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("token signing should succeed")
}

async fn body_json(body: Body) -> serde_json::Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn matchmake_body() -> String {
    serde_json::json!({
        "roles": [
            {"name": "tank", "slot_count": 1},
            {"name": "dps", "slot_count": 2}
        ],
        "queue": [
            {"owner_id": Uuid::new_v4(), "role": "tank", "score": 1500},
            {"owner_id": Uuid::new_v4(), "role": "dps", "score": 1510},
            {"owner_id": Uuid::new_v4(), "role": "dps", "score": 1490}
        ]
    })
    .to_string()
}

#[tokio::test]
async fn test_health_endpoint_is_public() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.as_ref(), b"OK");
}

#[tokio::test]
async fn test_metrics_endpoint_is_public() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_protected_route_requires_token() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/matchmake")
                .header("content-type", "application/json")
                .body(Body::from(matchmake_body()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get("WWW-Authenticate").is_some());

    let json = body_json(response.into_body()).await;
    assert_eq!(json["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn test_protected_route_rejects_wrong_secret() {
    let token = sign_token("some-other-secret");

    let response = test_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/matchmake")
                .header("authorization", format!("Bearer {token}"))
                .header("content-type", "application/json")
                .body(Body::from(matchmake_body()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_matchmake_end_to_end_ready() {
    let token = sign_token(TEST_SECRET);

    let response = test_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/matchmake")
                .header("authorization", format!("Bearer {token}"))
                .header("content-type", "application/json")
                .body(Body::from(matchmake_body()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response.into_body()).await;
    assert_eq!(json["ready"], true);
    assert_eq!(json["rooms"].as_array().unwrap().len(), 1);
    assert_eq!(json["rooms"][0]["assignments"][0]["role"], "tank");
}

#[tokio::test]
async fn test_matchmake_end_to_end_starved() {
    let token = sign_token(TEST_SECRET);
    let body = serde_json::json!({
        "roles": [{"name": "tank", "slot_count": 1}],
        "queue": []
    })
    .to_string();

    let response = test_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/matchmake")
                .header("authorization", format!("Bearer {token}"))
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response.into_body()).await;
    assert_eq!(json["ready"], false);
    assert_eq!(json["starved_roles"][0], "tank");
}

#[tokio::test]
async fn test_malformed_body_maps_to_invalid_payload() {
    let token = sign_token(TEST_SECRET);

    let response = test_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/matchmake")
                .header("authorization", format!("Bearer {token}"))
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response.into_body()).await;
    assert_eq!(json["error"]["code"], "invalid_payload");
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .uri("/api/v1/unknown")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
