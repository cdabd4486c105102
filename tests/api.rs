use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use flagpole::application::flags::FlagService;
use flagpole::application::repos::{FlagsRepo, RepoError};
use flagpole::cache::{CacheConfig, CachedFlagsRepo, FlagCache};
use flagpole::domain::flags::FeatureFlag;
use flagpole::infra::http::{ApiState, build_router};
use flagpole::infra::memory::InMemoryFlagStore;
use flagpole_api_types::{EvaluateResponse, FlagView};

fn app() -> Router {
    let store = Arc::new(InMemoryFlagStore::new());
    let cache = Arc::new(FlagCache::new(&CacheConfig::default()));
    let repo = Arc::new(CachedFlagsRepo::new(store, cache));
    build_router(ApiState::new(FlagService::new(repo)))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let (status, _, bytes) = send_full(app, method, uri, body).await;
    (status, bytes)
}

async fn send_full(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let request = builder.body(body).expect("request should build");

    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes()
        .to_vec();
    (status, headers, bytes)
}

async fn create(app: &Router, name: &str, is_enabled: bool) {
    let (status, _) = send(
        app,
        Method::POST,
        "/flags",
        Some(json!({ "name": name, "isEnabled": is_enabled })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

async fn evaluate(app: &Router, name: &str, context: Value) -> bool {
    let (status, body) = send(
        app,
        Method::POST,
        &format!("/flags/{name}/evaluate"),
        Some(context),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let response: EvaluateResponse = serde_json::from_slice(&body).expect("evaluate response");
    assert_eq!(response.flag_name, name);
    response.is_enabled
}

fn error_code(body: &[u8]) -> String {
    let value: Value = serde_json::from_slice(body).expect("error body");
    value["error"]["code"]
        .as_str()
        .expect("error code")
        .to_string()
}

#[tokio::test]
async fn create_returns_view_and_location() {
    let app = app();
    let (status, headers, body) = send_full(
        &app,
        Method::POST,
        "/flags",
        Some(json!({ "name": "dark-mode", "isEnabled": false, "description": "Dark theme" })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        headers.get(header::LOCATION).and_then(|v| v.to_str().ok()),
        Some("/flags/dark-mode")
    );
    let view: FlagView = serde_json::from_slice(&body).expect("flag view");
    assert_eq!(view.name, "dark-mode");
    assert!(!view.is_enabled);
    assert_eq!(view.description.as_deref(), Some("Dark theme"));
    assert!(view.user_overrides.is_empty());

    let (status, body) = send(&app, Method::GET, "/flags/dark-mode", None).await;
    assert_eq!(status, StatusCode::OK);
    let fetched: FlagView = serde_json::from_slice(&body).expect("flag view");
    assert_eq!(fetched, view);
}

#[tokio::test]
async fn create_rejects_duplicates_and_blank_names() {
    let app = app();
    create(&app, "x", true).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/flags",
        Some(json!({ "name": "x", "isEnabled": false })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "already_exists");

    let (status, body) = send(
        &app,
        Method::POST,
        "/flags",
        Some(json!({ "name": "   ", "isEnabled": true })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "invalid_argument");

    let (_, body) = send(&app, Method::GET, "/flags", None).await;
    let flags: Vec<FlagView> = serde_json::from_slice(&body).expect("list");
    assert_eq!(flags.len(), 1);
    assert!(flags[0].is_enabled);
}

#[tokio::test]
async fn list_is_ordered_by_name() {
    let app = app();
    create(&app, "zeta", true).await;
    create(&app, "alpha", false).await;

    let (status, body) = send(&app, Method::GET, "/flags", None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<String> = serde_json::from_slice::<Vec<FlagView>>(&body)
        .expect("list")
        .into_iter()
        .map(|flag| flag.name)
        .collect();
    assert_eq!(names, vec!["alpha", "zeta"]);
}

#[tokio::test]
async fn missing_flag_routes_return_not_found() {
    let app = app();
    let override_body = Some(json!({ "isEnabled": true }));

    let cases = [
        (Method::GET, "/flags/ghost", None),
        (Method::PUT, "/flags/ghost", Some(json!({ "isEnabled": true }))),
        (Method::DELETE, "/flags/ghost", None),
        (Method::POST, "/flags/ghost/evaluate", Some(json!({}))),
        (Method::PUT, "/flags/ghost/users/alice", override_body.clone()),
        (Method::PUT, "/flags/ghost/groups/beta", override_body.clone()),
        (Method::PUT, "/flags/ghost/regions/eu", override_body),
        (Method::DELETE, "/flags/ghost/users/alice", None),
        (Method::DELETE, "/flags/ghost/groups/beta", None),
        (Method::DELETE, "/flags/ghost/regions/eu", None),
    ];

    for (method, uri, body) in cases {
        let (status, bytes) = send(&app, method.clone(), uri, body).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
        assert_eq!(error_code(&bytes), "not_found", "{method} {uri}");
    }
}

#[tokio::test]
async fn update_global_state_is_visible_through_cache() {
    let app = app();
    create(&app, "toggle-me", false).await;
    assert!(!evaluate(&app, "toggle-me", json!({})).await);

    let (status, _) = send(
        &app,
        Method::PUT,
        "/flags/toggle-me",
        Some(json!({ "isEnabled": true })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert!(evaluate(&app, "toggle-me", json!({})).await);
    let (_, body) = send(&app, Method::GET, "/flags/toggle-me", None).await;
    let view: FlagView = serde_json::from_slice(&body).expect("view");
    assert!(view.is_enabled);
}

#[tokio::test]
async fn checkout_v2_scenario() {
    let app = app();
    create(&app, "checkout-v2", false).await;

    let (status, _) = send(
        &app,
        Method::PUT,
        "/flags/checkout-v2/groups/beta",
        Some(json!({ "isEnabled": true })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(
        &app,
        Method::PUT,
        "/flags/checkout-v2/users/alice",
        Some(json!({ "isEnabled": false })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert!(!evaluate(&app, "checkout-v2", json!({ "userId": "alice", "groupIds": ["beta"] })).await);
    assert!(evaluate(&app, "checkout-v2", json!({ "userId": "bob", "groupIds": ["beta"] })).await);
    assert!(!evaluate(&app, "checkout-v2", json!({ "userId": "charlie" })).await);
}

#[tokio::test]
async fn group_order_decides_between_conflicting_overrides() {
    let app = app();
    create(&app, "ordered", false).await;
    for (group, enabled) in [("alpha", true), ("beta", false)] {
        let (status, _) = send(
            &app,
            Method::PUT,
            &format!("/flags/ordered/groups/{group}"),
            Some(json!({ "isEnabled": enabled })),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    assert!(evaluate(&app, "ordered", json!({ "groupIds": ["alpha", "beta"] })).await);
    assert!(!evaluate(&app, "ordered", json!({ "groupIds": ["beta", "alpha"] })).await);
}

#[tokio::test]
async fn region_override_can_be_set_and_removed() {
    let app = app();
    create(&app, "regional", false).await;

    let (status, _) = send(
        &app,
        Method::PUT,
        "/flags/regional/regions/eu-west",
        Some(json!({ "isEnabled": true })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(evaluate(&app, "regional", json!({ "regionId": "eu-west" })).await);

    let (status, _) = send(&app, Method::DELETE, "/flags/regional/regions/eu-west", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!evaluate(&app, "regional", json!({ "regionId": "eu-west" })).await);

    let (status, _) = send(&app, Method::DELETE, "/flags/regional/regions/eu-west", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn override_upsert_keeps_single_entry() {
    let app = app();
    create(&app, "upsert", true).await;

    for enabled in [true, false] {
        let (status, _) = send(
            &app,
            Method::PUT,
            "/flags/upsert/users/u",
            Some(json!({ "isEnabled": enabled })),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    let (_, body) = send(&app, Method::GET, "/flags/upsert", None).await;
    let view: FlagView = serde_json::from_slice(&body).expect("view");
    assert_eq!(view.user_overrides.len(), 1);
    assert_eq!(view.user_overrides[0].user_id, "u");
    assert!(!view.user_overrides[0].is_enabled);
}

#[tokio::test]
async fn delete_cascades_overrides() {
    let app = app();
    create(&app, "short-lived", false).await;
    let (status, _) = send(
        &app,
        Method::PUT,
        "/flags/short-lived/users/alice",
        Some(json!({ "isEnabled": true })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::DELETE, "/flags/short-lived", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, Method::GET, "/flags/short-lived", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    create(&app, "short-lived", false).await;
    let (_, body) = send(&app, Method::GET, "/flags/short-lived", None).await;
    let view: FlagView = serde_json::from_slice(&body).expect("view");
    assert!(view.user_overrides.is_empty());
    assert!(!evaluate(&app, "short-lived", json!({ "userId": "alice" })).await);
}

#[tokio::test]
async fn evaluate_accepts_empty_body() {
    let app = app();
    create(&app, "defaulted", true).await;

    let (status, body) = send(&app, Method::POST, "/flags/defaulted/evaluate", None).await;
    assert_eq!(status, StatusCode::OK);
    let response: EvaluateResponse = serde_json::from_slice(&body).expect("response");
    assert!(response.is_enabled);
}

async fn send_raw(app: &Router, method: Method, uri: &str, body: &'static str) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .expect("request should build");
    let response = app.clone().oneshot(request).await.expect("respond");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes()
        .to_vec();
    (status, bytes)
}

#[tokio::test]
async fn malformed_bodies_return_error_payload() {
    let app = app();
    create(&app, "strict", true).await;

    let (status, body) = send_raw(&app, Method::POST, "/flags/strict/evaluate", "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "bad_request");

    let (status, body) = send_raw(&app, Method::POST, "/flags", r#"{"name":"x"}"#).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_code(&body), "invalid_body");

    let (status, body) = send_raw(&app, Method::PUT, "/flags/strict", r#"{"enabled":"yes"}"#).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_code(&body), "invalid_body");

    let (status, body) = send_raw(&app, Method::PUT, "/flags/strict/users/alice", "{oops").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "bad_request");

    let (status, body) = send(&app, Method::POST, "/flags", None).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(error_code(&body), "bad_request");
}

#[tokio::test]
async fn evaluate_accepts_null_body() {
    let app = app();
    create(&app, "nullable", true).await;

    let (status, body) = send_raw(&app, Method::POST, "/flags/nullable/evaluate", "null").await;
    assert_eq!(status, StatusCode::OK);
    let response: EvaluateResponse = serde_json::from_slice(&body).expect("response");
    assert!(response.is_enabled);
}

#[tokio::test]
async fn control_characters_in_names_are_rejected() {
    let app = app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/flags",
        Some(json!({ "name": "a\u{0000}b", "isEnabled": true })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "invalid_argument");

    let (_, body) = send(&app, Method::GET, "/flags", None).await;
    let flags: Vec<FlagView> = serde_json::from_slice(&body).expect("list");
    assert!(flags.is_empty());
}

#[tokio::test]
async fn location_header_escapes_name() {
    let app = app();
    let (status, headers, _) = send_full(
        &app,
        Method::POST,
        "/flags",
        Some(json!({ "name": "new checkout/v2", "isEnabled": false })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        headers.get(header::LOCATION).and_then(|v| v.to_str().ok()),
        Some("/flags/new%20checkout%2Fv2")
    );
}

#[tokio::test]
async fn blank_override_target_is_bad_request() {
    let app = app();
    create(&app, "targets", true).await;

    let (status, body) = send(
        &app,
        Method::PUT,
        "/flags/targets/users/%20",
        Some(json!({ "isEnabled": true })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "invalid_argument");
}

#[tokio::test]
async fn health_reports_store_state() {
    let (status, _) = send(&app(), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let broken = build_router(ApiState::new(FlagService::new(Arc::new(UnreachableStore))));
    let (status, body) = send(&broken, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error_code(&body), "unavailable");

    let (status, body) = send(&broken, Method::GET, "/flags", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_code(&body), "repo_error");
}

struct UnreachableStore;

#[async_trait]
impl FlagsRepo for UnreachableStore {
    async fn get_by_name(&self, _name: &str) -> Result<Option<FeatureFlag>, RepoError> {
        Err(RepoError::from_persistence("connection refused"))
    }

    async fn get_all(&self) -> Result<Vec<FeatureFlag>, RepoError> {
        Err(RepoError::from_persistence("connection refused"))
    }

    async fn add(&self, _flag: &FeatureFlag) -> Result<(), RepoError> {
        Err(RepoError::from_persistence("connection refused"))
    }

    async fn update(&self, _flag: &FeatureFlag) -> Result<(), RepoError> {
        Err(RepoError::from_persistence("connection refused"))
    }

    async fn delete(&self, _name: &str) -> Result<(), RepoError> {
        Err(RepoError::from_persistence("connection refused"))
    }

    async fn exists(&self, _name: &str) -> Result<bool, RepoError> {
        Err(RepoError::from_persistence("connection refused"))
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        Err(RepoError::from_persistence("connection refused"))
    }
}
