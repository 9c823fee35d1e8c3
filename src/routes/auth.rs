use axum::{extract::State, http::HeaderMap, http::StatusCode, response::IntoResponse, Json};
use sqlx::Row;

use crate::{
    auth::{generate_token, verify_password_blocking},
    error::{AppError, AppResult},
    middleware::{auth::CurrentUser, ip::MaybeRemoteAddr, Endpoint},
    state::AppState,
    types::{LoginRequest, TokenResponse},
};

const INVALID_CREDENTIALS: &str = "Unable to log in with provided credentials";

/// `POST /api/auth/token/login/`: exchanges e-mail and password for the user's token,
/// creating one on first login.
pub async fn login(
    State(state): State<AppState>,
    remote: MaybeRemoteAddr,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let ip = remote.client_ip(&headers);
    state.rate_limits.check_endpoint(Endpoint::Login, ip).await?;

    let email = req.email.trim();
    if email.is_empty() || req.password.is_empty() {
        return Err(AppError::validation("non_field_errors", INVALID_CREDENTIALS));
    }

    let row = sqlx::query("SELECT id, password_hash FROM users WHERE email = ?1")
        .bind(email)
        .fetch_optional(&state.db)
        .await?;
    let Some(row) = row else {
        return Err(AppError::validation("non_field_errors", INVALID_CREDENTIALS));
    };
    let user_id: i64 = row.get("id");
    let stored: String = row.get("password_hash");
    if !verify_password_blocking(req.password, stored).await? {
        tracing::info!("Failed login for user {}", user_id);
        return Err(AppError::validation("non_field_errors", INVALID_CREDENTIALS));
    }

    // get-or-create; the UNIQUE(user_id) constraint makes the insert a no-op when a token exists
    sqlx::query("INSERT INTO auth_tokens (key, user_id) VALUES (?1, ?2) ON CONFLICT(user_id) DO NOTHING")
        .bind(generate_token())
        .bind(user_id)
        .execute(&state.db)
        .await?;
    let key: String = sqlx::query_scalar("SELECT key FROM auth_tokens WHERE user_id = ?1")
        .bind(user_id)
        .fetch_one(&state.db)
        .await?;

    state.metrics.inc_logins();
    tracing::info!("User {} logged in", user_id);
    Ok((StatusCode::CREATED, Json(TokenResponse { auth_token: key })))
}

/// `POST /api/auth/token/logout/`: revokes the caller's token.
pub async fn logout(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> AppResult<StatusCode> {
    sqlx::query("DELETE FROM auth_tokens WHERE key = ?1").bind(&user.token).execute(&state.db).await?;
    tracing::info!("User {} logged out", user.id);
    Ok(StatusCode::NO_CONTENT)
}
