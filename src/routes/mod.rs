//! HTTP route handlers
//!
//! Every identity-scoped route resolves the caller first; handlers receive
//! the resolved [`Identity`] and never look at raw credentials. A session
//! minted during resolution is announced with `Set-Cookie` on whatever
//! response the handler produces, errors included.

pub mod artifact;
pub mod health;
pub mod identity;
pub mod share;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, SET_COOKIE};
use hyper::http::request::Parts;
use hyper::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{error, warn};

use crate::identity::{Identity, RequestContext};
use crate::server::AppState;
use crate::types::{Result, VestibuleError};

/// A request with its body already collected
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiRequest {
    pub fn new(method: Method, path_and_query: &str) -> Self {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (path_and_query.to_string(), None),
        };
        Self {
            method,
            path,
            query,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn from_parts(parts: &Parts, body: Bytes) -> Self {
        Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers.clone(),
            body,
        }
    }

    /// Add a header (builder style)
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Set a JSON body (builder style)
    pub fn with_json<T: Serialize>(mut self, body: &T) -> Self {
        self.body = Bytes::from(serde_json::to_vec(body).unwrap_or_default());
        self
    }

    pub fn context(&self) -> RequestContext {
        RequestContext::from_headers(&self.headers)
    }

    /// A query string parameter, if present and non-empty
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.query.as_deref()?;
        let params: HashMap<String, String> = serde_urlencoded::from_str(query).ok()?;
        params.get(name).filter(|v| !v.trim().is_empty()).cloned()
    }

    /// Parse the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        if self.body.is_empty() {
            return Err(VestibuleError::Validation("Request body is required".into()));
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| VestibuleError::Validation(format!("Invalid JSON: {}", e)))
    }
}

/// Dispatch a request.
///
/// Preflight, health, version and public share routes are answered without
/// resolving the caller, an exception to resolve-first: they read nothing
/// owner-scoped, and a share link opened by a viewer or crawler must not
/// mint a guest session. Every other route resolves first.
pub async fn route(state: &AppState, req: ApiRequest) -> Response<Full<Bytes>> {
    match (&req.method, req.path.as_str()) {
        (&Method::OPTIONS, _) => return preflight_response(),
        (&Method::GET, "/health") | (&Method::GET, "/healthz") => {
            return health::health_check(state)
        }
        (&Method::GET, "/version") => return health::version_info(),
        (&Method::GET, p) if p.starts_with("/share/") => {
            let id = p.trim_start_matches("/share/");
            return into_response(share::get_share(state, &req, id).await);
        }
        _ => {}
    }

    let resolution = match state.resolver.resolve(&req.context()).await {
        Ok(resolution) => resolution,
        Err(e) => return error_response(e),
    };

    let result = dispatch_identity_scoped(state, &req, &resolution.identity).await;
    let mut response = into_response(result);

    if let Some(cookie) = resolution.set_cookie {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => error!("Invalid session cookie header: {}", e),
        }
    }
    response
}

async fn dispatch_identity_scoped(
    state: &AppState,
    req: &ApiRequest,
    caller: &Identity,
) -> Result<Response<Full<Bytes>>> {
    match (&req.method, req.path.as_str()) {
        (&Method::GET, "/identity") => identity::get_identity(caller),
        (&Method::POST, "/identity/guest") => identity::create_guest(state, req, caller).await,
        (&Method::POST, "/identity/moment") => identity::save_moment(state, req, caller).await,
        (&Method::GET, "/identity/session") => identity::get_session(state, caller).await,
        (&Method::GET, "/identity/profile") => identity::get_profile(state, caller).await,
        (&Method::POST, "/identity/claim") => identity::claim_profile(state, caller).await,
        (&Method::GET, "/artifact/pending") => artifact::fetch_pending(state, req, caller).await,
        (&Method::POST, "/artifact/pending") => artifact::put_pending(state, req, caller).await,
        (&Method::POST, "/artifact") => artifact::create_artifact(state, req, caller).await,
        (_, path) => Ok(not_found_response(path)),
    }
}

fn into_response(result: Result<Response<Full<Bytes>>>) -> Response<Full<Bytes>> {
    match result {
        Ok(response) => response,
        Err(e) => error_response(e),
    }
}

// =============================================================================
// Response Helpers
// =============================================================================

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization, X-Device-Id")
        .body(Full::new(Bytes::from(json)))
        .unwrap()
}

/// Error response with `{"error", "code"}` body
pub fn error_response(err: VestibuleError) -> Response<Full<Bytes>> {
    match &err {
        VestibuleError::Internal(_) | VestibuleError::Config(_) => error!("Request failed: {}", err),
        _ => warn!("Request rejected: {}", err),
    }
    json_response(err.status_code(), &err.to_body())
}

pub fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization, X-Device-Id")
        .header("Access-Control-Max-Age", "86400")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

pub fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Not Found",
        "code": "NOT_FOUND",
        "path": path,
    });
    json_response(StatusCode::NOT_FOUND, &body)
}
