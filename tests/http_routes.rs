//! Integration tests for the HTTP surface
//!
//! Requests are dispatched through `routes::route` against an in-memory
//! store, without binding a socket.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{AUTHORIZATION, COOKIE, ETAG, IF_NONE_MATCH, SET_COOKIE};
use hyper::{Method, Response, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;

use vestibule::auth::{AuthProvider, JwtValidator};
use vestibule::clock::ManualClock;
use vestibule::config::Args;
use vestibule::identity::RequestContext;
use vestibule::kv::{MemoryKvStore, SharedKv};
use vestibule::routes::{self, ApiRequest};
use vestibule::{AppState, VestibuleError};

struct TestApp {
    state: AppState,
    clock: Arc<ManualClock>,
}

fn app() -> TestApp {
    let clock = ManualClock::at_epoch();
    let kv: SharedKv = Arc::new(MemoryKvStore::with_clock(clock.clone()));
    let state = AppState::new(Args::dev(), kv, clock.clone()).unwrap();
    TestApp { state, clock }
}

impl TestApp {
    async fn send(&self, req: ApiRequest) -> (StatusCode, Option<String>, Value) {
        let response = routes::route(&self.state, req).await;
        split(response).await
    }
}

async fn split(response: Response<Full<Bytes>>) -> (StatusCode, Option<String>, Value) {
    let status = response.status();
    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, cookie, body)
}

/// `sid=<id>` pair from a Set-Cookie value
fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap_or_default().to_string()
}

fn bearer(auth_id: &str) -> String {
    let token = JwtValidator::new_dev().generate_token(auth_id, None).unwrap();
    format!("Bearer {}", token)
}

#[tokio::test]
async fn test_guest_init_idempotent_and_conflict() {
    let app = app();

    let req = || {
        ApiRequest::new(Method::POST, "/identity/guest")
            .with_header("x-device-id", "dev1")
            .with_json(&json!({"name": "Rosie"}))
    };
    let (status, cookie, first) = app.send(req()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(cookie.unwrap().contains("HttpOnly; SameSite=Lax"));
    assert_eq!(first["name"], "Rosie");

    let (status, _, second) = app.send(req()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["id"], second["id"]);

    let other = ApiRequest::new(Method::POST, "/identity/guest")
        .with_json(&json!({"name": "Rosie", "deviceId": "dev2"}));
    let (status, _, body) = app.send(other).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn test_guest_init_validation() {
    let app = app();

    let long = ApiRequest::new(Method::POST, "/identity/guest")
        .with_json(&json!({"name": "x".repeat(21), "deviceId": "dev1"}));
    let (status, _, body) = app.send(long).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let empty = ApiRequest::new(Method::POST, "/identity/guest");
    let (status, _, _) = app.send(empty).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_moment_merges_into_session() {
    let app = app();

    let (_, cookie, _) = app.send(ApiRequest::new(Method::GET, "/identity")).await;
    let sid = cookie_pair(&cookie.unwrap());

    let save = ApiRequest::new(Method::POST, "/identity/moment")
        .with_header("cookie", &sid)
        .with_json(&json!({"moment": "first light", "mood": "calm"}));
    let (status, cookie, _) = app.send(save).await;
    assert_eq!(status, StatusCode::OK);
    assert!(cookie.is_none());

    let read = ApiRequest::new(Method::GET, "/identity/session").with_header("cookie", &sid);
    let (status, _, body) = app.send(read).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payload"]["moment"], "first light");
    assert_eq!(body["payload"]["mood"], "calm");

    let missing = ApiRequest::new(Method::POST, "/identity/moment")
        .with_header("cookie", &sid)
        .with_json(&json!({"mood": "calm"}));
    let (status, _, _) = app.send(missing).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_expired_session_is_replaced() {
    let app = app();
    let (_, cookie, _) = app.send(ApiRequest::new(Method::GET, "/identity")).await;
    let sid = cookie_pair(&cookie.unwrap());

    app.clock.advance_secs(181);
    let req = ApiRequest::new(Method::GET, "/identity").with_header("cookie", &sid);
    let (status, cookie, body) = app.send(req).await;

    assert_eq!(status, StatusCode::OK);
    let fresh = cookie_pair(&cookie.unwrap());
    assert_ne!(fresh, sid);
    assert_eq!(body["effectiveScope"], "guest");
    assert!(body.get("sessionId").is_none());
}

#[tokio::test]
async fn test_pending_artifact_statuses() {
    let app = app();
    let with_device = |req: ApiRequest| req.with_header("x-device-id", "dev1");

    let (status, _, _) = app
        .send(with_device(ApiRequest::new(Method::GET, "/artifact/pending")))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = app
        .send(with_device(ApiRequest::new(Method::GET, "/artifact/pending?sid=abc")))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let put = with_device(ApiRequest::new(Method::POST, "/artifact/pending"))
        .with_json(&json!({"scriptId": "abc", "payload": {"lines": 2}, "ttlSeconds": 5}));
    let (status, _, body) = app.send(put).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scriptId"], "abc");

    let (status, _, body) = app
        .send(with_device(ApiRequest::new(Method::GET, "/artifact/pending?sid=abc")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"lines": 2}));

    let (status, _, _) = app
        .send(with_device(ApiRequest::new(Method::GET, "/artifact/pending?sid=old")))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.clock.advance_secs(6);
    let (status, _, body) = app
        .send(with_device(ApiRequest::new(Method::GET, "/artifact/pending?sid=abc")))
        .await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["code"], "EXPIRED");

    let (status, _, _) = app
        .send(with_device(ApiRequest::new(Method::GET, "/artifact/pending?sid=abc")))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_pending_fetch_on_fresh_session_is_unauthenticated() {
    let app = app();
    let (status, cookie, body) = app
        .send(ApiRequest::new(Method::GET, "/artifact/pending?sid=abc"))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "AUTH_ERROR");
    // The minted session is still announced
    assert!(cookie.is_some());
}

#[tokio::test]
async fn test_profile_and_claim() {
    let app = app();

    let (status, _, _) = app
        .send(ApiRequest::new(Method::GET, "/identity/profile").with_header("x-device-id", "dev1"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let init = ApiRequest::new(Method::POST, "/identity/guest")
        .with_json(&json!({"name": "Rosie", "deviceId": "dev1"}));
    let (_, _, created) = app.send(init).await;

    let (status, _, profile) = app
        .send(ApiRequest::new(Method::GET, "/identity/profile").with_header("x-device-id", "dev1"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["id"], created["id"]);
    assert_eq!(profile["status"], "guest");
    assert!(profile.get("ownerKey").is_none());

    // Claim requires authentication
    let anonymous = ApiRequest::new(Method::POST, "/identity/claim").with_header("x-device-id", "dev1");
    let (status, _, _) = app.send(anonymous).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let claim = ApiRequest::new(Method::POST, "/identity/claim")
        .with_header(AUTHORIZATION.as_str(), &bearer("u9"))
        .with_header("x-device-id", "dev1");
    let (status, cookie, claimed) = app.send(claim).await;
    assert_eq!(status, StatusCode::OK);
    assert!(cookie.is_none());
    assert_eq!(claimed["id"], created["id"]);
    assert_eq!(claimed["status"], "claimed");

    let mine = ApiRequest::new(Method::GET, "/identity/profile")
        .with_header(AUTHORIZATION.as_str(), &bearer("u9"));
    let (status, _, body) = app.send(mine).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Rosie");

    let identity = ApiRequest::new(Method::GET, "/identity")
        .with_header(AUTHORIZATION.as_str(), &bearer("u9"))
        .with_header("x-device-id", "dev1");
    let (_, _, body) = app.send(identity).await;
    assert_eq!(body["effectiveScope"], "authenticated");
    assert_eq!(body["authId"], "u9");
    assert_eq!(body["profileName"], "Rosie");
}

/// A guest presenting an account id as its device id gets nothing of the account
#[tokio::test]
async fn test_device_id_cannot_pose_as_account() {
    let app = app();
    app.send(
        ApiRequest::new(Method::POST, "/identity/guest")
            .with_header("x-device-id", "dev1")
            .with_json(&json!({"name": "Rosie"})),
    )
    .await;
    let (status, _, _) = app
        .send(
            ApiRequest::new(Method::POST, "/identity/claim")
                .with_header(AUTHORIZATION.as_str(), &bearer("u9"))
                .with_header("x-device-id", "dev1"),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let stage = ApiRequest::new(Method::POST, "/artifact/pending")
        .with_header(AUTHORIZATION.as_str(), &bearer("u9"))
        .with_json(&json!({"scriptId": "abc", "payload": {"secret": "mine"}, "ttlSeconds": 60}));
    assert_eq!(app.send(stage).await.0, StatusCode::OK);

    let (status, _, _) = app
        .send(ApiRequest::new(Method::GET, "/identity/profile").with_header("x-device-id", "u9"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, body) = app
        .send(ApiRequest::new(Method::GET, "/artifact/pending?sid=abc").with_header("x-device-id", "u9"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.get("secret").is_none());

    let (status, _, body) = app
        .send(
            ApiRequest::new(Method::GET, "/artifact/pending?sid=abc")
                .with_header(AUTHORIZATION.as_str(), &bearer("u9")),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["secret"], "mine");
}

/// Claim moves only the profile of the credentials sent with the request
#[tokio::test]
async fn test_claim_ignores_device_named_in_body() {
    let app = app();
    app.send(
        ApiRequest::new(Method::POST, "/identity/guest")
            .with_header("x-device-id", "dev2")
            .with_json(&json!({"name": "Jules"})),
    )
    .await;

    let claim = ApiRequest::new(Method::POST, "/identity/claim")
        .with_header(AUTHORIZATION.as_str(), &bearer("u10"))
        .with_json(&json!({"deviceId": "dev2"}));
    let (status, _, body) = app.send(claim).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (_, _, profile) = app
        .send(ApiRequest::new(Method::GET, "/identity/profile").with_header("x-device-id", "dev2"))
        .await;
    assert_eq!(profile["status"], "guest");
}

/// A guest cannot reserve an account's owner slot ahead of its claim
#[tokio::test]
async fn test_guest_cannot_block_account_claim() {
    let app = app();
    let squat = ApiRequest::new(Method::POST, "/identity/guest")
        .with_json(&json!({"name": "Mallory", "deviceId": "u9"}));
    assert_eq!(app.send(squat).await.0, StatusCode::OK);

    app.send(
        ApiRequest::new(Method::POST, "/identity/guest")
            .with_header("x-device-id", "dev1")
            .with_json(&json!({"name": "Rosie"})),
    )
    .await;
    let claim = ApiRequest::new(Method::POST, "/identity/claim")
        .with_header(AUTHORIZATION.as_str(), &bearer("u9"))
        .with_header("x-device-id", "dev1");
    let (status, _, claimed) = app.send(claim).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(claimed["name"], "Rosie");
}

#[tokio::test]
async fn test_invalid_token_is_guest() {
    let app = app();
    let req = ApiRequest::new(Method::GET, "/identity").with_header(AUTHORIZATION.as_str(), "Bearer nope");
    let (status, cookie, body) = app.send(req).await;

    assert_eq!(status, StatusCode::OK);
    assert!(cookie.is_some());
    assert_eq!(body["effectiveScope"], "guest");
}

struct FailingProvider;

#[async_trait]
impl AuthProvider for FailingProvider {
    async fn authenticate(&self, _ctx: &RequestContext) -> vestibule::Result<Option<String>> {
        Err(VestibuleError::Auth("Identity provider unavailable".into()))
    }
}

#[tokio::test]
async fn test_auth_provider_error_propagates() {
    let clock = ManualClock::at_epoch();
    let kv: SharedKv = Arc::new(MemoryKvStore::with_clock(clock.clone()));
    let state = AppState::with_auth(Args::dev(), kv, clock, Arc::new(FailingProvider));

    let response = routes::route(&state, ApiRequest::new(Method::GET, "/identity")).await;
    let (status, cookie, body) = split(response).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(cookie.is_none());
    assert_eq!(body["code"], "AUTH_ERROR");
}

#[tokio::test]
async fn test_share_projection_and_etag() {
    let app = app();

    let create = ApiRequest::new(Method::POST, "/artifact")
        .with_header("x-device-id", "dev1")
        .with_json(&json!({
            "displayName": "Rosie",
            "text": "hello",
            "finalized": {"narrative": "story", "fields": {"mood": "calm", "deviceId": "dev1"}}
        }));
    let (status, _, created) = app.send(create).await;
    assert_eq!(status, StatusCode::OK);
    let id = created["id"].as_str().unwrap().to_string();

    let response = routes::route(&app.state, ApiRequest::new(Method::GET, &format!("/share/{}", id))).await;
    let etag = response.headers().get(ETAG).unwrap().to_str().unwrap().to_string();
    let (status, cookie, body) = split(response).await;

    assert_eq!(status, StatusCode::OK);
    assert!(cookie.is_none());
    assert_eq!(body["text"], "hello");
    assert_eq!(body["fields"]["mood"], "calm");
    let text = body.to_string();
    assert!(!text.contains("dev1"));
    assert!(!text.contains("ownerKey"));
    assert!(!text.contains("sid_"));

    let again = ApiRequest::new(Method::GET, &format!("/share/{}", id)).with_header(IF_NONE_MATCH.as_str(), &etag);
    let (status, _, _) = app.send(again).await;
    assert_eq!(status, StatusCode::NOT_MODIFIED);
}

#[tokio::test]
async fn test_unfinalized_share_is_not_found() {
    let app = app();

    let create = ApiRequest::new(Method::POST, "/artifact")
        .with_header("x-device-id", "dev1")
        .with_json(&json!({"text": "draft"}));
    let (_, _, created) = app.send(create).await;
    let id = created["id"].as_str().unwrap();

    let (status, _, _) = app
        .send(ApiRequest::new(Method::GET, &format!("/share/{}", id)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = app.send(ApiRequest::new(Method::GET, "/share/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_preflight_and_unknown_routes() {
    let app = app();

    let (status, cookie, body) = app.send(ApiRequest::new(Method::GET, "/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(cookie.is_none());
    assert_eq!(body["healthy"], true);
    assert_eq!(body["kvBackend"], "memory");

    let (status, _, body) = app.send(ApiRequest::new(Method::GET, "/version")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["gitCommit"].is_string());

    let (status, _, _) = app.send(ApiRequest::new(Method::OPTIONS, "/identity/guest")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, _) = app.send(ApiRequest::new(Method::GET, "/nowhere")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cookie_header_parsing_through_route() {
    let app = app();
    let (_, cookie, _) = app.send(ApiRequest::new(Method::GET, "/identity")).await;
    let sid = cookie_pair(&cookie.unwrap());

    let req = ApiRequest::new(Method::GET, "/identity/session")
        .with_header(COOKIE.as_str(), &format!("theme=dark; {}", sid));
    let (status, cookie, body) = app.send(req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(cookie.is_none());
    assert_eq!(body["payload"], json!({}));
}
