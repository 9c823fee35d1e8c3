//! Cheap request screening that runs before routing.

use axum::{
    extract::Request,
    http::{header, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AppError;

/// Default request body ceiling; recipe payloads carry base64 images.
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

const ENCODED_TRAVERSAL: [&str; 8] = ["%2e%2e", "%252e%252e", "%2e/", "%252e%2f", "/%2e", "%2f%2e", "%5c", "%00"];
const SCANNER_AGENTS: [&str; 5] = ["scanner", "nikto", "sqlmap", "acunetix", "masscan"];

/// Body ceiling from `FOODGRAM_MAX_BODY_SIZE`, clamped to 1..=50 MiB.
pub fn max_body_size() -> usize {
    std::env::var("FOODGRAM_MAX_BODY_SIZE")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_MAX_BODY_SIZE)
        .clamp(1024 * 1024, 50 * 1024 * 1024)
}

/// Rejects traversal attempts against the media directory and bodies whose
/// `Content-Length` is already over the limit. Known scanner agents are logged.
pub async fn validate_request_middleware(req: Request, next: Next) -> Response {
    let path = req.uri().path();
    if contains_path_traversal(path) {
        tracing::warn!("Path traversal attempt: {}", sanitize_for_logging(path));
        return AppError::InvalidPath("Path traversal detected in request".to_string()).into_response();
    }

    if let Some(agent) = req.headers().get(header::USER_AGENT).and_then(|ua| ua.to_str().ok()) {
        if is_scanner_agent(agent) {
            tracing::warn!("Scanner user agent: {}", sanitize_for_logging(agent));
        }
    }

    // Chunked bodies carry no length and are caught by DefaultBodyLimit instead
    if matches!(*req.method(), Method::POST | Method::PUT | Method::PATCH) {
        let declared = req
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        let max = max_body_size();
        if declared.is_some_and(|len| len > max) {
            return AppError::PayloadTooLarge { max_bytes: max }.into_response();
        }
    }

    next.run(req).await
}

fn contains_path_traversal(path: &str) -> bool {
    if path.contains('\0') || path.starts_with("..") {
        return true;
    }
    if ["/..", "\\..", "/./", "\\.\\"].iter().any(|p| path.contains(p)) {
        return true;
    }
    let lower = path.to_ascii_lowercase();
    ENCODED_TRAVERSAL.iter().any(|p| lower.contains(p))
}

fn is_scanner_agent(agent: &str) -> bool {
    let lower = agent.to_ascii_lowercase();
    SCANNER_AGENTS.iter().any(|s| lower.contains(s))
}

/// Drops control characters, escapes quotes and caps the length of a value
/// headed for the log.
pub fn sanitize_for_logging(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .take(200)
        .collect::<String>()
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_traversal_detection() {
        assert!(contains_path_traversal("/media/../etc/passwd"));
        assert!(contains_path_traversal("../etc/passwd"));
        assert!(contains_path_traversal("/media/%2E%2E/secret"));
        assert!(contains_path_traversal("/media/a\0b"));

        assert!(!contains_path_traversal("/api/recipes/12/"));
        assert!(!contains_path_traversal("/media/recipes/images/a.png"));
    }

    #[test]
    fn test_scanner_agents() {
        assert!(is_scanner_agent("Nikto/2.1.5"));
        assert!(is_scanner_agent("sqlmap/1.0"));
        assert!(!is_scanner_agent("Mozilla/5.0 (X11; Linux x86_64)"));
        assert!(!is_scanner_agent("Googlebot/2.1"));
    }

    #[test]
    fn test_sanitize_for_logging() {
        assert_eq!(sanitize_for_logging("a\u{7}b\"c"), "ab\\\"c");
        assert_eq!(sanitize_for_logging(&"x".repeat(500)).len(), 200);
    }
}
