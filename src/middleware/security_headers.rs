//! Hardening headers on every response, plus cache rules that keep API output
//! out of shared caches while uploaded images stay cacheable.

use axum::http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE, PRAGMA};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::config::{AppConfig, SecurityConfig};

const STATIC_HEADERS: [(&str, &str); 6] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("referrer-policy", "same-origin"),
    ("permissions-policy", "geolocation=(), microphone=(), camera=()"),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-site"),
];

const DEFAULT_HSTS_MAX_AGE: u64 = 31_536_000;
// Image file names are random and never reused
const IMAGE_MAX_AGE: &str = "public, max-age=2592000";

#[derive(Debug, PartialEq, Eq)]
enum CachePolicy {
    NoStore,
    Public,
    Untouched,
}

fn cache_policy(content_type: Option<&str>, is_download: bool) -> CachePolicy {
    match content_type {
        _ if is_download => CachePolicy::NoStore,
        Some(ct) if ct.starts_with("application/json") => CachePolicy::NoStore,
        Some(ct) if ct.starts_with("image/") => CachePolicy::Public,
        _ => CachePolicy::Untouched,
    }
}

fn hsts_value(sec: &SecurityConfig) -> Option<String> {
    if !sec.enable_hsts.unwrap_or(false) {
        return None;
    }
    let max_age = sec.hsts_max_age.unwrap_or(DEFAULT_HSTS_MAX_AGE);
    let suffix = if sec.hsts_include_subdomains.unwrap_or(false) { "; includeSubDomains" } else { "" };
    Some(format!("max-age={}{}", max_age, suffix))
}

fn apply_security_config(headers: &mut HeaderMap, sec: &SecurityConfig) {
    if let Some(value) = hsts_value(sec).and_then(|v| HeaderValue::from_str(&v).ok()) {
        headers.insert(HeaderName::from_static("strict-transport-security"), value);
    }
    let csp = sec.csp.as_deref().map(str::trim).filter(|csp| !csp.is_empty());
    if let Some(value) = csp.and_then(|csp| HeaderValue::from_str(csp).ok()) {
        headers.insert(HeaderName::from_static("content-security-policy"), value);
    }
}

/// Adds the fixed hardening headers, optional HSTS and CSP from the `security`
/// config section, and a `Cache-Control` chosen by [`cache_policy`].
pub async fn security_headers_middleware(
    State(cfg): State<Arc<AppConfig>>,
    req: Request,
    next: Next,
) -> Response {
    let mut res = next.run(req).await;
    let headers = res.headers_mut();

    for (name, value) in STATIC_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    if let Some(sec) = cfg.security.as_ref() {
        apply_security_config(headers, sec);
    }

    let content_type = headers.get(CONTENT_TYPE).and_then(|ct| ct.to_str().ok());
    match cache_policy(content_type, headers.contains_key(CONTENT_DISPOSITION)) {
        CachePolicy::NoStore => {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
            headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        }
        CachePolicy::Public => {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static(IMAGE_MAX_AGE));
            headers.remove(PRAGMA);
        }
        CachePolicy::Untouched => {}
    }

    res
}
