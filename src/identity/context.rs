//! Request credentials
//!
//! The resolver sees a request only through [`RequestContext`]: readable
//! cookies and headers, nothing else.

use hyper::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, COOKIE};
use std::collections::HashMap;

/// Header carrying a client-generated device identifier
pub const DEVICE_ID_HEADER: &str = "x-device-id";
/// Cookie carrying a client-generated device identifier
pub const DEVICE_ID_COOKIE: &str = "device_id";
/// Cookie carrying a bearer token for clients that cannot set headers
pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// Readable cookies and headers of one request
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cookies: HashMap<String, String>,
    headers: HeaderMap,
}

impl RequestContext {
    /// Build from request headers, parsing every `Cookie` header
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut cookies = HashMap::new();
        for value in headers.get_all(COOKIE) {
            if let Ok(raw) = value.to_str() {
                for (name, value) in parse_cookie_header(raw) {
                    cookies.entry(name).or_insert(value);
                }
            }
        }

        Self {
            cookies,
            headers: headers.clone(),
        }
    }

    /// Context with explicit cookies and no headers
    pub fn with_cookies<I, K, V>(cookies: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            cookies: cookies
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            headers: HeaderMap::new(),
        }
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Insert a header (builder style, for callers constructing contexts)
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), value.parse::<HeaderValue>()) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Raw Authorization header, falling back to the token cookie
    pub fn authorization(&self) -> Option<&str> {
        self.header(AUTHORIZATION.as_str())
            .or_else(|| self.cookie(AUTH_TOKEN_COOKIE))
    }

    /// Device identifier from header or cookie, if non-empty
    pub fn device_id(&self) -> Option<&str> {
        self.header(DEVICE_ID_HEADER)
            .or_else(|| self.cookie(DEVICE_ID_COOKIE))
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Parse `name=value; name2=value2`, skipping malformed pairs
pub fn parse_cookie_header(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let value = value.trim().trim_matches('"');
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}
