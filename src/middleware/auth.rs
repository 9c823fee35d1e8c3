//! Token authentication extractors.
//!
//! Clients send `Authorization: Token <key>`. A missing header means anonymous;
//! a malformed header or an unknown key is rejected with 401 even on routes that
//! allow anonymous access.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use sqlx::Row;

use crate::auth::parse_token_header;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// The account behind a valid token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_staff: bool,
    pub password_hash: String,
    pub token: String,
}

/// Requires an authenticated caller.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AuthUser);

/// Anonymous callers are allowed.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthUser>);

impl MaybeUser {
    pub fn id(&self) -> Option<i64> {
        self.0.as_ref().map(|u| u.id)
    }
}

/// Requires an authenticated staff account.
#[derive(Debug, Clone)]
pub struct StaffUser(pub AuthUser);

async fn authenticate(parts: &Parts, state: &AppState) -> AppResult<Option<AuthUser>> {
    let Some(raw) = parts.headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let key = raw
        .to_str()
        .ok()
        .and_then(parse_token_header)
        .ok_or_else(|| AppError::Unauthorized("Invalid token header".to_string()))?;

    let row = sqlx::query(
        "SELECT u.id, u.email, u.username, u.first_name, u.last_name, u.is_staff, u.password_hash \
         FROM auth_tokens t JOIN users u ON u.id = t.user_id WHERE t.key = ?1",
    )
    .bind(key)
    .fetch_optional(&state.db)
    .await?;

    let Some(row) = row else {
        return Err(AppError::Unauthorized("Invalid token".to_string()));
    };

    Ok(Some(AuthUser {
        id: row.get("id"),
        email: row.get("email"),
        username: row.get("username"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        is_staff: row.get::<i64, _>("is_staff") != 0,
        password_hash: row.get("password_hash"),
        token: key.to_string(),
    }))
}

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(authenticate(parts, state).await?))
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        authenticate(parts, state)
            .await?
            .map(CurrentUser)
            .ok_or_else(|| AppError::Unauthorized("Authentication credentials were not provided".to_string()))
    }
}

impl FromRequestParts<AppState> for StaffUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_staff {
            return Err(AppError::Forbidden("Staff permissions required".to_string()));
        }
        Ok(StaffUser(user))
    }
}
