use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::{
    db::fold_case,
    error::{validation::required_text, AppError, AppResult, OptionExt},
    middleware::auth::StaffUser,
    state::AppState,
    types::{IngredientDto, IngredientRequest, NAME_MAX_LEN},
};

#[derive(Debug, Deserialize)]
pub struct IngredientSearch {
    pub name: Option<String>,
}

fn ingredient_from_row(row: &SqliteRow) -> IngredientDto {
    IngredientDto { id: row.get("id"), name: row.get("name"), measurement_unit: row.get("measurement_unit") }
}

/// Escapes `LIKE` wildcards so user input only ever matches literally.
fn like_prefix(input: &str) -> String {
    let mut pattern = String::with_capacity(input.len() + 1);
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

async fn fetch_ingredient(db: &SqlitePool, id: i64) -> AppResult<Option<IngredientDto>> {
    let row = sqlx::query("SELECT id, name, measurement_unit FROM ingredients WHERE id = ?1")
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(row.as_ref().map(ingredient_from_row))
}

async fn ensure_unique(db: &SqlitePool, name: &str, unit: &str, exclude: Option<i64>) -> AppResult<()> {
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM ingredients WHERE name = ?1 AND measurement_unit = ?2 AND id IS NOT ?3)",
    )
    .bind(name)
    .bind(unit)
    .bind(exclude)
    .fetch_one(db)
    .await?;
    if taken {
        return Err(AppError::validation("name", "This ingredient already exists with that measurement unit"));
    }
    Ok(())
}

/// `GET /api/ingredients/?name=<prefix>`: case-insensitive (Unicode) prefix search, not paginated.
pub async fn list_ingredients(
    State(state): State<AppState>,
    Query(search): Query<IngredientSearch>,
) -> AppResult<Json<Vec<IngredientDto>>> {
    let prefix = search.name.as_deref().map(str::trim).unwrap_or_default();
    let rows = if prefix.is_empty() {
        sqlx::query("SELECT id, name, measurement_unit FROM ingredients ORDER BY name_folded, id")
            .fetch_all(&state.db)
            .await?
    } else {
        sqlx::query(
            "SELECT id, name, measurement_unit FROM ingredients \
             WHERE name_folded LIKE ?1 ESCAPE '\\' ORDER BY name_folded, id",
        )
        .bind(like_prefix(&fold_case(prefix)))
        .fetch_all(&state.db)
        .await?
    };
    Ok(Json(rows.iter().map(ingredient_from_row).collect()))
}

pub async fn get_ingredient(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<IngredientDto>> {
    Ok(Json(fetch_ingredient(&state.db, id).await?.ok_or_not_found("Ingredient")?))
}

pub async fn create_ingredient(
    State(state): State<AppState>,
    StaffUser(staff): StaffUser,
    Json(req): Json<IngredientRequest>,
) -> AppResult<impl IntoResponse> {
    let name = required_text(req.name.as_deref().unwrap_or_default(), "name", NAME_MAX_LEN)?;
    let measurement_unit =
        required_text(req.measurement_unit.as_deref().unwrap_or_default(), "measurement_unit", NAME_MAX_LEN)?;
    ensure_unique(&state.db, &name, &measurement_unit, None).await?;

    let id: i64 =
        sqlx::query_scalar(
            "INSERT INTO ingredients (name, name_folded, measurement_unit) VALUES (?1, ?2, ?3) RETURNING id",
        )
        .bind(&name)
        .bind(fold_case(&name))
        .bind(&measurement_unit)
            .fetch_one(&state.db)
            .await?;
    tracing::info!("Staff user {} created ingredient {} ({})", staff.id, id, name);
    Ok((StatusCode::CREATED, Json(IngredientDto { id, name, measurement_unit })))
}

pub async fn update_ingredient(
    State(state): State<AppState>,
    StaffUser(staff): StaffUser,
    Path(id): Path<i64>,
    Json(req): Json<IngredientRequest>,
) -> AppResult<Json<IngredientDto>> {
    let mut ingredient = fetch_ingredient(&state.db, id).await?.ok_or_not_found("Ingredient")?;
    if let Some(name) = req.name.as_deref() {
        ingredient.name = required_text(name, "name", NAME_MAX_LEN)?;
    }
    if let Some(unit) = req.measurement_unit.as_deref() {
        ingredient.measurement_unit = required_text(unit, "measurement_unit", NAME_MAX_LEN)?;
    }
    ensure_unique(&state.db, &ingredient.name, &ingredient.measurement_unit, Some(id)).await?;

    sqlx::query("UPDATE ingredients SET name = ?1, name_folded = ?2, measurement_unit = ?3 WHERE id = ?4")
        .bind(&ingredient.name)
        .bind(fold_case(&ingredient.name))
        .bind(&ingredient.measurement_unit)
        .bind(id)
        .execute(&state.db)
        .await?;
    tracing::info!("Staff user {} updated ingredient {}", staff.id, id);
    Ok(Json(ingredient))
}

/// Fails with 400 while any recipe still uses the ingredient.
pub async fn delete_ingredient(
    State(state): State<AppState>,
    StaffUser(staff): StaffUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    fetch_ingredient(&state.db, id).await?.ok_or_not_found("Ingredient")?;
    let in_use: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM recipe_ingredients WHERE ingredient_id = ?1)")
            .bind(id)
            .fetch_one(&state.db)
            .await?;
    if in_use {
        return Err(AppError::BadRequest("Ingredient is used by existing recipes".to_string()));
    }
    sqlx::query("DELETE FROM ingredients WHERE id = ?1").bind(id).execute(&state.db).await?;
    tracing::info!("Staff user {} deleted ingredient {}", staff.id, id);
    Ok(StatusCode::NO_CONTENT)
}
