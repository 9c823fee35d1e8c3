use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Every failure a handler can return. The [`IntoResponse`] impl turns each
/// variant into the JSON error body with its status code.
#[derive(Debug, Error)]
pub enum AppError {
    /// Unexpected failures. Logged with an error id; the client only sees the id.
    #[error("Internal error: {0}")]
    Internal(anyhow::Error),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Missing or unknown token.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    /// Authenticated, but not the author (or not staff).
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Rate limited. Retry after {retry_after_seconds} seconds")]
    RateLimited { retry_after_seconds: u64 },
    /// A single request field was rejected; `field` is echoed in the body.
    #[error("Validation error on field '{field}': {message}")]
    ValidationError { field: String, message: String },
    #[error("I/O error: {0}")]
    IoError(String),
    /// Traversal sequences in the request path.
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("Payload too large: limit is {max_bytes} bytes")]
    PayloadTooLarge { max_bytes: usize },
}

impl AppError {
    /// Shorthand for [`AppError::ValidationError`].
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::ValidationError { field: field.to_string(), message: message.into() }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, error_message, details) = match self {
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                let error_id = uuid::Uuid::new_v4();
                tracing::error!("Error ID: {}", error_id);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                    Some(json!({ "error_id": error_id.to_string() })),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
            AppError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg, None)
            }
            AppError::Database(msg) => {
                tracing::error!("Database error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                    None,
                )
            }
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg, None),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg, None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg, None),
            AppError::RateLimited { retry_after_seconds } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                format!("Too many requests. Please retry after {} seconds", retry_after_seconds),
                Some(json!({ "retry_after_seconds": retry_after_seconds })),
            ),
            AppError::ValidationError { field, message } => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                format!("Validation failed for field '{}'", field),
                Some(json!({ "field": field, "message": message })),
            ),
            AppError::IoError(msg) => {
                tracing::error!("I/O error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "IO_ERROR",
                    "An I/O error occurred".to_string(),
                    None,
                )
            }
            AppError::InvalidPath(msg) => (StatusCode::BAD_REQUEST, "INVALID_PATH", msg, None),
            AppError::PayloadTooLarge { max_bytes } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
                format!("Request body exceeds maximum size of {} bytes", max_bytes),
                Some(json!({ "max_bytes": max_bytes })),
            ),
        };

        let mut body = json!({
            "error": {
                "code": error_code,
                "message": error_message,
            },
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        if let Some(details) = details {
            body["error"]["details"] = details;
        }

        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                // Races past the explicit existence checks land here
                if db_err.is_unique_violation() {
                    AppError::BadRequest("Record already exists".to_string())
                } else if db_err.is_foreign_key_violation() {
                    AppError::BadRequest("Referenced record does not exist".to_string())
                } else if db_err.is_check_violation() {
                    AppError::BadRequest(format!("Constraint failed: {}", db_err.message()))
                } else {
                    AppError::Database(format!("Database error: {}", db_err.message()))
                }
            }
            sqlx::Error::PoolTimedOut => {
                AppError::ServiceUnavailable("Database connection pool timed out".to_string())
            }
            _ => AppError::Database(format!("Database error: {}", err)),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(format!("{}: {}", err.kind(), err))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(anyhow::anyhow!("blocking task failed: {}", err))
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Turns a missing row into a 404 naming the entity, e.g. `"Recipe not found"`.
pub trait OptionExt<T> {
    fn ok_or_not_found(self, entity: &str) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, entity: &str) -> AppResult<T> {
        self.ok_or_else(|| AppError::NotFound(format!("{} not found", entity)))
    }
}

/// Field validation helpers shared by the request handlers.
pub mod validation {
    use super::*;

    /// Rejects empty (after trimming) or over-long values and returns the trimmed text.
    pub fn required_text(value: &str, field: &str, max_len: usize) -> AppResult<String> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(AppError::validation(field, "This field may not be blank"));
        }
        if trimmed.chars().count() > max_len {
            return Err(AppError::validation(
                field,
                format!("Ensure this field has no more than {} characters", max_len),
            ));
        }
        if trimmed.contains('\0') {
            return Err(AppError::validation(field, "Value contains null characters"));
        }
        Ok(trimmed.to_string())
    }

    /// Validates that a value lies within `min..=max`.
    pub fn validate_range(value: i64, field: &str, min: i64, max: i64) -> AppResult<()> {
        if value < min || value > max {
            return Err(AppError::validation(
                field,
                format!("Value must be between {} and {}, got {}", min, max, value),
            ));
        }
        Ok(())
    }

    /// Minimal structural e-mail check: one `@`, non-empty local part and a dotted domain.
    pub fn validate_email(email: &str) -> AppResult<String> {
        let email = required_text(email, "email", 254)?;
        let valid = match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
                    && !email.chars().any(char::is_whitespace)
            }
            None => false,
        };
        if !valid {
            return Err(AppError::validation("email", "Enter a valid email address"));
        }
        Ok(email)
    }

    /// Letters, digits and `@ . + - _` only; `me` is reserved for the current-user route.
    pub fn validate_username(username: &str) -> AppResult<String> {
        let username = required_text(username, "username", 150)?;
        if !username.chars().all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_')) {
            return Err(AppError::validation(
                "username",
                "Enter a valid username. It may contain only letters, numbers, and @/./+/-/_ characters",
            ));
        }
        if username.eq_ignore_ascii_case("me") {
            return Err(AppError::validation("username", "This username is reserved"));
        }
        Ok(username)
    }
}
