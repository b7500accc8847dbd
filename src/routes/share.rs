//! Share route
//!
//! GET /share/<id> serves the public projection of a finalized artifact,
//! with a content ETag so repeat views can be answered with 304.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{CACHE_CONTROL, ETAG, IF_NONE_MATCH};
use hyper::{Response, StatusCode};
use sha2::{Digest, Sha256};

use super::{json_response, ApiRequest};
use crate::server::AppState;
use crate::share::ShareProjector;
use crate::types::{Result, VestibuleError};

/// GET /share/<id>
pub async fn get_share(state: &AppState, req: &ApiRequest, id: &str) -> Result<Response<Full<Bytes>>> {
    let record = state
        .artifacts
        .get(id)
        .await?
        .ok_or_else(|| VestibuleError::NotFound("Artifact not found".into()))?;
    let snapshot = ShareProjector::project(&record)?;

    let body = serde_json::to_vec(&snapshot)?;
    let etag = compute_etag(&body);

    let cached = req
        .headers
        .get(IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == etag);
    if cached {
        return Ok(Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .header(ETAG, etag)
            .body(Full::new(Bytes::new()))
            .unwrap());
    }

    let mut response = json_response(StatusCode::OK, &snapshot);
    if let Ok(value) = etag.parse() {
        response.headers_mut().insert(ETAG, value);
    }
    if let Ok(value) = "public, max-age=60".parse() {
        response.headers_mut().insert(CACHE_CONTROL, value);
    }
    Ok(response)
}

/// Quoted SHA256 prefix of the body
fn compute_etag(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let hash = hasher.finalize();
    format!("\"{}\"", hex::encode(&hash[..16]))
}
