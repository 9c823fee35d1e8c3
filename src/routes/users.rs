use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::{QueryBuilder, Sqlite};

use crate::{
    auth::{hash_password_blocking, validate_password, verify_password_blocking},
    error::{
        validation::{required_text, validate_email, validate_username},
        AppError, AppResult, OptionExt,
    },
    middleware::{
        auth::{CurrentUser, MaybeUser},
        ip::MaybeRemoteAddr,
        Endpoint,
    },
    pagination::{Page, Pagination},
    state::AppState,
    types::{RegisterRequest, SetPasswordRequest, SubscriptionDto, UserDto, PERSON_NAME_MAX_LEN},
};

use super::recipes_helpers::{fetch_user, push_user_columns, recipes_by_authors, recipes_limit, user_from_row};

/// `POST /api/users/`
pub async fn register(
    State(state): State<AppState>,
    remote: MaybeRemoteAddr,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    let ip = remote.client_ip(&headers);
    state.rate_limits.check_endpoint(Endpoint::Register, ip).await?;

    let email = validate_email(&req.email)?;
    let username = validate_username(&req.username)?;
    let first_name = required_text(&req.first_name, "first_name", PERSON_NAME_MAX_LEN)?;
    let last_name = required_text(&req.last_name, "last_name", PERSON_NAME_MAX_LEN)?;
    validate_password(&req.password, &username, &email)?;

    let email_taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)")
        .bind(&email)
        .fetch_one(&state.db)
        .await?;
    if email_taken {
        return Err(AppError::validation("email", "A user with that email already exists"));
    }
    let username_taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)")
        .bind(&username)
        .fetch_one(&state.db)
        .await?;
    if username_taken {
        return Err(AppError::validation("username", "A user with that username already exists"));
    }

    let password_hash = hash_password_blocking(req.password).await?;
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO users (email, username, first_name, last_name, password_hash) \
         VALUES (?1, ?2, ?3, ?4, ?5) RETURNING id",
    )
    .bind(&email)
    .bind(&username)
    .bind(&first_name)
    .bind(&last_name)
    .bind(&password_hash)
    .fetch_one(&state.db)
    .await?;

    state.metrics.inc_users_registered();
    tracing::info!("Registered user {} ({})", id, username);
    let user = UserDto { email, id, username, first_name, last_name, is_subscribed: false };
    Ok((StatusCode::CREATED, Json(user)))
}

/// `GET /api/users/`: newest accounts first.
pub async fn list_users(
    State(state): State<AppState>,
    viewer: MaybeUser,
    mut pagination: Pagination,
) -> AppResult<Json<Page<UserDto>>> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(&state.db).await?;
    pagination.resolve(count)?;

    let mut qb = QueryBuilder::<Sqlite>::new("SELECT ");
    push_user_columns(&mut qb, viewer.id());
    qb.push(" FROM users u ORDER BY u.id DESC LIMIT ")
        .push_bind(pagination.limit())
        .push(" OFFSET ")
        .push_bind(pagination.offset());
    let rows = qb.build().fetch_all(&state.db).await?;
    let users = rows.iter().map(user_from_row).collect();
    Ok(Json(pagination.into_page(count, users)))
}

pub async fn get_user(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<i64>,
) -> AppResult<Json<UserDto>> {
    let user = fetch_user(&state.db, id, viewer.id()).await?.ok_or_not_found("User")?;
    Ok(Json(user))
}

pub async fn me(CurrentUser(user): CurrentUser) -> Json<UserDto> {
    Json(UserDto {
        email: user.email,
        id: user.id,
        username: user.username,
        first_name: user.first_name,
        last_name: user.last_name,
        is_subscribed: false,
    })
}

/// `POST /api/users/set_password/`
pub async fn set_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<SetPasswordRequest>,
) -> AppResult<StatusCode> {
    if !verify_password_blocking(req.current_password, user.password_hash.clone()).await? {
        return Err(AppError::validation("current_password", "Invalid password"));
    }
    validate_password(&req.new_password, &user.username, &user.email)
        .map_err(|e| match e {
            AppError::ValidationError { message, .. } => AppError::validation("new_password", message),
            other => other,
        })?;

    let password_hash = hash_password_blocking(req.new_password).await?;
    sqlx::query("UPDATE users SET password_hash = ?1 WHERE id = ?2")
        .bind(&password_hash)
        .bind(user.id)
        .execute(&state.db)
        .await?;
    tracing::info!("User {} changed password", user.id);
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/users/subscriptions/`: followed authors, most recent subscription first.
pub async fn subscriptions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut pagination: Pagination,
) -> AppResult<Json<Page<SubscriptionDto>>> {
    let limit = recipes_limit(pagination.params())?;
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions WHERE user_id = ?1")
        .bind(user.id)
        .fetch_one(&state.db)
        .await?;
    pagination.resolve(count)?;

    let mut qb = QueryBuilder::<Sqlite>::new("SELECT ");
    push_user_columns(&mut qb, Some(user.id));
    qb.push(" FROM subscriptions sub JOIN users u ON u.id = sub.author_id WHERE sub.user_id = ")
        .push_bind(user.id)
        .push(" ORDER BY sub.id DESC LIMIT ")
        .push_bind(pagination.limit())
        .push(" OFFSET ")
        .push_bind(pagination.offset());
    let rows = qb.build().fetch_all(&state.db).await?;
    let authors: Vec<UserDto> = rows.iter().map(user_from_row).collect();

    let ids: Vec<i64> = authors.iter().map(|a| a.id).collect();
    let mut recipes = recipes_by_authors(&state.db, &ids, limit).await?;
    let results = authors
        .into_iter()
        .map(|author| {
            let (recipes, recipes_count) = recipes.remove(&author.id).unwrap_or_default();
            SubscriptionDto { user: author, recipes, recipes_count }
        })
        .collect();
    Ok(Json(pagination.into_page(count, results)))
}

/// `POST /api/users/{id}/subscribe/`
pub async fn subscribe(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(author_id): Path<i64>,
    pagination: Pagination,
) -> AppResult<impl IntoResponse> {
    let limit = recipes_limit(pagination.params())?;
    let mut author = fetch_user(&state.db, author_id, Some(user.id)).await?.ok_or_not_found("User")?;
    if author.id == user.id {
        return Err(AppError::BadRequest("You cannot subscribe to yourself".to_string()));
    }
    if author.is_subscribed {
        return Err(AppError::BadRequest("Already subscribed to this author".to_string()));
    }

    sqlx::query("INSERT INTO subscriptions (user_id, author_id) VALUES (?1, ?2)")
        .bind(user.id)
        .bind(author.id)
        .execute(&state.db)
        .await?;
    author.is_subscribed = true;
    tracing::info!("User {} subscribed to {}", user.id, author.id);

    let (recipes, recipes_count) =
        recipes_by_authors(&state.db, &[author.id], limit).await?.remove(&author.id).unwrap_or_default();
    Ok((StatusCode::CREATED, Json(SubscriptionDto { user: author, recipes, recipes_count })))
}

/// `DELETE /api/users/{id}/subscribe/`
pub async fn unsubscribe(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(author_id): Path<i64>,
) -> AppResult<StatusCode> {
    fetch_user(&state.db, author_id, None).await?.ok_or_not_found("User")?;
    let result = sqlx::query("DELETE FROM subscriptions WHERE user_id = ?1 AND author_id = ?2")
        .bind(user.id)
        .bind(author_id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Subscription not found".to_string()));
    }
    tracing::info!("User {} unsubscribed from {}", user.id, author_id);
    Ok(StatusCode::NO_CONTENT)
}
