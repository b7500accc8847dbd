//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Bodies are collected
//! here, under the configured size limit, and handed to [`routes::route`].

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::header::CONTENT_LENGTH;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::auth::{JwtAuthProvider, SharedAuth};
use crate::clock::SharedClock;
use crate::config::Args;
use crate::identity::{IdentityResolver, SessionCookie};
use crate::kv::SharedKv;
use crate::pending::{self, PendingArtifactStore};
use crate::registry::IdentityRegistry;
use crate::routes::{self, ApiRequest};
use crate::session::GuestSessionStore;
use crate::share::ArtifactRepository;
use crate::types::{Result, VestibuleError};

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub kv: SharedKv,
    pub clock: SharedClock,
    pub resolver: IdentityResolver,
    pub registry: IdentityRegistry,
    pub sessions: GuestSessionStore,
    pub pending: Arc<PendingArtifactStore>,
    pub artifacts: ArtifactRepository,
}

impl AppState {
    /// Wire every component over one store, verifying tokens with JWT
    pub fn new(args: Args, kv: SharedKv, clock: SharedClock) -> Result<Self> {
        let auth: SharedAuth = Arc::new(JwtAuthProvider::new(args.jwt_validator()?));
        Ok(Self::with_auth(args, kv, clock, auth))
    }

    /// Wire every component with a custom auth provider
    pub fn with_auth(args: Args, kv: SharedKv, clock: SharedClock, auth: SharedAuth) -> Self {
        let sessions = GuestSessionStore::new(kv.clone(), args.session_ttl());
        let registry = IdentityRegistry::new(kv.clone(), clock.clone());
        let resolver = IdentityResolver::new(
            auth,
            sessions.clone(),
            registry.clone(),
            SessionCookie::new(args.session_cookie.clone(), args.cookie_secure),
        );
        let pending = Arc::new(PendingArtifactStore::new(
            kv.clone(),
            clock.clone(),
            args.pending_retention(),
        ));
        let artifacts = ArtifactRepository::new(kv.clone(), clock.clone());

        Self {
            args,
            kv,
            clock,
            resolver,
            registry,
            sessions,
            pending,
            artifacts,
        }
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Vestibule listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - built-in JWT secret allowed");
    }

    pending::spawn_sweep_task(Arc::clone(&state.pending), state.args.sweep_interval());

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Collect the request and dispatch it
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let (parts, body) = req.into_parts();

    info!("[{}] {} {}", addr, parts.method, parts.uri.path());

    let limit = state.args.max_body_bytes;
    let declared = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Ok(routes::error_response(too_large()));
    }

    let bytes = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("[{}] Failed to read body: {}", addr, e);
            return Ok(routes::error_response(too_large()));
        }
    };

    let request = ApiRequest::from_parts(&parts, bytes);
    Ok(routes::route(&state, request).await)
}

fn too_large() -> VestibuleError {
    VestibuleError::Validation("Request body too large".into())
}
