//! Page-number pagination with `page` and `limit` query parameters.
//!
//! Responses use the `{count, next, previous, results}` envelope; `next` and
//! `previous` are absolute URLs that keep every other query parameter intact.

use axum::{
    extract::{FromRequestParts, OriginalUri},
    http::{header, request::Parts, HeaderMap},
};
use serde::Serialize;

use crate::config::{AppConfig, PaginationConfig};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// Requested page plus what is needed to render neighbour links.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    base_url: String,
    path: String,
    pairs: Vec<(String, String)>,
}

impl Pagination {
    pub fn new(
        pairs: Vec<(String, String)>,
        cfg: &PaginationConfig,
        base_url: String,
        path: String,
    ) -> AppResult<Self> {
        let page = match lookup(&pairs, "page") {
            None => 1,
            Some(raw) if raw == "last" => u32::MAX,
            Some(raw) => match raw.parse::<u32>() {
                Ok(p) if p >= 1 => p,
                _ => return Err(AppError::NotFound("Invalid page".to_string())),
            },
        };
        // An unusable limit falls back to the default instead of failing the request
        let limit = lookup(&pairs, "limit")
            .and_then(|raw| raw.parse::<u32>().ok())
            .filter(|l| *l >= 1)
            .map(|l| l.min(cfg.max_page_size))
            .unwrap_or(cfg.default_page_size);
        Ok(Self { page, limit, base_url, path, pairs })
    }

    /// Resolves `page=last` against `count` and rejects pages past the end.
    pub fn resolve(&mut self, count: i64) -> AppResult<()> {
        let last = last_page(count, self.limit);
        if self.page == u32::MAX {
            self.page = last;
        }
        if self.page > last {
            return Err(AppError::NotFound("Invalid page".to_string()));
        }
        Ok(())
    }

    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.limit as i64
    }

    pub fn limit(&self) -> i64 {
        self.limit as i64
    }

    /// Every query parameter of the request, in order, repeats included.
    pub fn params(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn into_page<T>(self, count: i64, results: Vec<T>) -> Page<T> {
        let last = last_page(count, self.limit);
        let next = (self.page < last).then(|| self.link(self.page + 1));
        let previous = (self.page > 1).then(|| self.link(self.page - 1));
        Page { count, next, previous, results }
    }

    fn link(&self, page: u32) -> String {
        let mut pairs: Vec<(String, String)> = self.pairs.iter().filter(|(k, _)| k != "page").cloned().collect();
        if page > 1 {
            pairs.push(("page".to_string(), page.to_string()));
        }
        let query = serde_urlencoded::to_string(&pairs).unwrap_or_default();
        if query.is_empty() {
            format!("{}{}", self.base_url, self.path)
        } else {
            format!("{}{}?{}", self.base_url, self.path, query)
        }
    }
}

fn lookup<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

/// Page 1 always exists, even for an empty result set.
fn last_page(count: i64, limit: u32) -> u32 {
    if count <= 0 {
        return 1;
    }
    let pages = (count as u64).div_ceil(limit as u64);
    pages.min(u32::MAX as u64 - 1) as u32
}

/// `scheme://host` for absolute links: `server.public_url` when configured,
/// otherwise `X-Forwarded-Proto` and `Host` from the request.
pub fn base_url(headers: &HeaderMap, cfg: &AppConfig) -> String {
    if let Some(url) = cfg.server.public_url.as_deref() {
        return url.trim_end_matches('/').to_string();
    }
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .filter(|v| *v == "http" || *v == "https")
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}:{}", cfg.server.host, cfg.server.port));
    format!("{}://{}", scheme, host)
}

impl FromRequestParts<AppState> for Pagination {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let uri = parts.extensions.get::<OriginalUri>().map(|o| o.0.clone()).unwrap_or_else(|| parts.uri.clone());
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(uri.query().unwrap_or(""))
            .map_err(|e| AppError::InvalidInput(format!("Malformed query string: {}", e)))?;
        let base = base_url(&parts.headers, &state.config);
        Pagination::new(pairs, &state.config.pagination, base, uri.path().to_string())
    }
}
