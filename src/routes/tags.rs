use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use sqlx::{Row, SqlitePool};

use crate::{
    error::{validation::required_text, AppError, AppResult, OptionExt},
    middleware::auth::StaffUser,
    state::AppState,
    types::{TagDto, TagRequest, NAME_MAX_LEN},
};

fn validate_color(color: &str) -> AppResult<String> {
    let color = color.trim();
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(AppError::validation("color", "Enter a color in #RRGGBB format"));
    }
    Ok(color.to_ascii_uppercase())
}

fn validate_slug(slug: &str) -> AppResult<String> {
    let slug = required_text(slug, "slug", NAME_MAX_LEN)?;
    if !slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(AppError::validation(
            "slug",
            "Enter a valid slug consisting of letters, numbers, underscores or hyphens",
        ));
    }
    Ok(slug)
}

/// Rejects a value already used by another tag in `column`.
async fn ensure_unique(db: &SqlitePool, column: &str, value: &str, exclude: Option<i64>) -> AppResult<()> {
    // column names come from this module only
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM tags WHERE {} = ?1 COLLATE NOCASE AND id IS NOT ?2)",
        column
    );
    let taken: bool = sqlx::query_scalar(&sql).bind(value).bind(exclude).fetch_one(db).await?;
    if taken {
        return Err(AppError::validation(column, format!("A tag with this {} already exists", column)));
    }
    Ok(())
}

async fn fetch_tag(db: &SqlitePool, id: i64) -> AppResult<Option<TagDto>> {
    let row = sqlx::query("SELECT id, name, color, slug FROM tags WHERE id = ?1")
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(row.map(|row| TagDto {
        id: row.get("id"),
        name: row.get("name"),
        color: row.get("color"),
        slug: row.get("slug"),
    }))
}

/// `GET /api/tags/`: every tag, not paginated.
pub async fn list_tags(State(state): State<AppState>) -> AppResult<Json<Vec<TagDto>>> {
    let rows = sqlx::query("SELECT id, name, color, slug FROM tags ORDER BY id").fetch_all(&state.db).await?;
    let tags = rows
        .iter()
        .map(|row| TagDto {
            id: row.get("id"),
            name: row.get("name"),
            color: row.get("color"),
            slug: row.get("slug"),
        })
        .collect();
    Ok(Json(tags))
}

pub async fn get_tag(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<TagDto>> {
    Ok(Json(fetch_tag(&state.db, id).await?.ok_or_not_found("Tag")?))
}

pub async fn create_tag(
    State(state): State<AppState>,
    StaffUser(staff): StaffUser,
    Json(req): Json<TagRequest>,
) -> AppResult<impl IntoResponse> {
    let name = required_text(req.name.as_deref().unwrap_or_default(), "name", NAME_MAX_LEN)?;
    let color = validate_color(req.color.as_deref().unwrap_or_default())?;
    let slug = validate_slug(req.slug.as_deref().unwrap_or_default())?;
    ensure_unique(&state.db, "name", &name, None).await?;
    ensure_unique(&state.db, "color", &color, None).await?;
    ensure_unique(&state.db, "slug", &slug, None).await?;

    let id: i64 = sqlx::query_scalar("INSERT INTO tags (name, color, slug) VALUES (?1, ?2, ?3) RETURNING id")
        .bind(&name)
        .bind(&color)
        .bind(&slug)
        .fetch_one(&state.db)
        .await?;
    tracing::info!("Staff user {} created tag {} ({})", staff.id, id, slug);
    Ok((StatusCode::CREATED, Json(TagDto { id, name, color, slug })))
}

/// `PATCH /api/tags/{id}/`: omitted fields keep their value.
pub async fn update_tag(
    State(state): State<AppState>,
    StaffUser(staff): StaffUser,
    Path(id): Path<i64>,
    Json(req): Json<TagRequest>,
) -> AppResult<Json<TagDto>> {
    let mut tag = fetch_tag(&state.db, id).await?.ok_or_not_found("Tag")?;
    if let Some(name) = req.name.as_deref() {
        tag.name = required_text(name, "name", NAME_MAX_LEN)?;
        ensure_unique(&state.db, "name", &tag.name, Some(id)).await?;
    }
    if let Some(color) = req.color.as_deref() {
        tag.color = validate_color(color)?;
        ensure_unique(&state.db, "color", &tag.color, Some(id)).await?;
    }
    if let Some(slug) = req.slug.as_deref() {
        tag.slug = validate_slug(slug)?;
        ensure_unique(&state.db, "slug", &tag.slug, Some(id)).await?;
    }

    sqlx::query("UPDATE tags SET name = ?1, color = ?2, slug = ?3 WHERE id = ?4")
        .bind(&tag.name)
        .bind(&tag.color)
        .bind(&tag.slug)
        .bind(id)
        .execute(&state.db)
        .await?;
    tracing::info!("Staff user {} updated tag {}", staff.id, id);
    Ok(Json(tag))
}

pub async fn delete_tag(
    State(state): State<AppState>,
    StaffUser(staff): StaffUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    let result = sqlx::query("DELETE FROM tags WHERE id = ?1").bind(id).execute(&state.db).await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Tag not found".to_string()));
    }
    tracing::info!("Staff user {} deleted tag {}", staff.id, id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_format() {
        assert_eq!(validate_color("#e26c2d").unwrap(), "#E26C2D");
        assert!(validate_color("e26c2d").is_err());
        assert!(validate_color("#e26c2").is_err());
        assert!(validate_color("#gggggg").is_err());
    }

    #[test]
    fn slug_charset() {
        assert_eq!(validate_slug(" breakfast_2 ").unwrap(), "breakfast_2");
        assert!(validate_slug("with space").is_err());
        assert!(validate_slug("").is_err());
    }
}
