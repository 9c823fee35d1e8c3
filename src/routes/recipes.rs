//! Recipe CRUD plus the favorite and shopping cart toggles.
//!
//! Create and update rewrite the recipe row together with its tag and
//! ingredient rows inside one transaction, so a failed validation or a
//! constraint error never leaves a half-written recipe behind.

use std::collections::HashSet;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};

use crate::{
    db::fold_case,
    error::{
        validation::{required_text, validate_range},
        AppError, AppResult, OptionExt,
    },
    media::{self, DecodedImage},
    middleware::auth::{CurrentUser, MaybeUser},
    pagination::{Page, Pagination},
    state::AppState,
    types::{IngredientAmount, RecipeDto, RecipeWriteRequest, MAX_SMALL_INT, NAME_MAX_LEN},
};

use super::recipes_helpers::{count_recipes, fetch_recipe, fetch_short_recipe, list_recipes, RecipeFilter};

/// A write request after validation against the database.
#[derive(Debug)]
struct RecipeWrite {
    tags: Vec<i64>,
    ingredients: Vec<IngredientAmount>,
    name: Option<String>,
    text: Option<String>,
    cooking_time: Option<i64>,
    image: Option<DecodedImage>,
}

/// Number of distinct ids from `ids` present in `table`.
async fn count_existing(db: &SqlitePool, table: &str, ids: &[i64]) -> AppResult<i64> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) AS cnt FROM {} WHERE id IN (", table));
    let mut sep = qb.separated(", ");
    for id in ids {
        sep.push_bind(*id);
    }
    sep.push_unseparated(")");
    let row = qb.build().fetch_one(db).await?;
    Ok(row.try_get::<i64, _>("cnt")?)
}

/// Validates a create (`partial == false`) or update request. Tags and
/// ingredients are required either way; scalars only on create.
async fn validate_write(
    db: &SqlitePool,
    req: RecipeWriteRequest,
    max_image_bytes: usize,
    partial: bool,
) -> AppResult<RecipeWrite> {
    let tags = req.tags.ok_or_else(|| AppError::validation("tags", "This field is required"))?;
    let mut seen = HashSet::new();
    if !tags.iter().all(|id| seen.insert(*id)) {
        return Err(AppError::validation("tags", "Tags must not repeat"));
    }
    if !tags.is_empty() && count_existing(db, "tags", &tags).await? != tags.len() as i64 {
        return Err(AppError::validation("tags", "Unknown tag id"));
    }

    let ingredients = req.ingredients.ok_or_else(|| AppError::validation("ingredients", "This field is required"))?;
    if ingredients.is_empty() {
        return Err(AppError::validation("ingredients", "A recipe needs at least one ingredient"));
    }
    let mut seen = HashSet::new();
    for item in &ingredients {
        if !seen.insert(item.id) {
            return Err(AppError::validation("ingredients", "Ingredients must not repeat"));
        }
        validate_range(item.amount, "amount", 1, MAX_SMALL_INT)?;
    }
    let ids: Vec<i64> = ingredients.iter().map(|i| i.id).collect();
    if count_existing(db, "ingredients", &ids).await? != ids.len() as i64 {
        return Err(AppError::validation("ingredients", "Unknown ingredient id"));
    }

    let name = match req.name {
        Some(name) => Some(required_text(&name, "name", NAME_MAX_LEN)?),
        None if partial => None,
        None => return Err(AppError::validation("name", "This field is required")),
    };
    let text = match req.text {
        Some(text) => Some(required_text(&text, "text", usize::MAX)?),
        None if partial => None,
        None => return Err(AppError::validation("text", "This field is required")),
    };
    let cooking_time = match req.cooking_time {
        Some(minutes) => {
            validate_range(minutes, "cooking_time", 1, MAX_SMALL_INT)?;
            Some(minutes)
        }
        None if partial => None,
        None => return Err(AppError::validation("cooking_time", "This field is required")),
    };
    let image = match req.image.as_deref().map(str::trim) {
        Some(uri) if !uri.is_empty() => Some(media::decode_data_uri(uri, max_image_bytes)?),
        _ => None,
    };

    Ok(RecipeWrite { tags, ingredients, name, text, cooking_time, image })
}

/// Replaces the tag and ingredient rows of `recipe_id`.
async fn replace_associations(
    conn: &mut SqliteConnection,
    recipe_id: i64,
    tags: &[i64],
    ingredients: &[IngredientAmount],
) -> AppResult<()> {
    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = ?1").bind(recipe_id).execute(&mut *conn).await?;
    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = ?1").bind(recipe_id).execute(&mut *conn).await?;

    if !tags.is_empty() {
        let mut qb = QueryBuilder::<Sqlite>::new("INSERT INTO recipe_tags (recipe_id, tag_id) ");
        qb.push_values(tags, |mut b, tag_id| {
            b.push_bind(recipe_id).push_bind(*tag_id);
        });
        qb.build().execute(&mut *conn).await?;
    }

    let mut qb = QueryBuilder::<Sqlite>::new("INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ");
    qb.push_values(ingredients, |mut b, item| {
        b.push_bind(recipe_id).push_bind(item.id).push_bind(item.amount);
    });
    qb.build().execute(&mut *conn).await?;
    Ok(())
}

/// `GET /api/recipes/`
pub async fn list(
    State(state): State<AppState>,
    viewer: MaybeUser,
    mut pagination: Pagination,
) -> AppResult<Json<Page<RecipeDto>>> {
    let filter = RecipeFilter::from_params(pagination.params())?;
    let viewer = viewer.id();
    let count = count_recipes(&state.db, &filter, viewer).await?;
    pagination.resolve(count)?;
    let recipes = list_recipes(&state.db, &filter, viewer, pagination.limit(), pagination.offset()).await?;
    Ok(Json(pagination.into_page(count, recipes)))
}

pub async fn get(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<i64>,
) -> AppResult<Json<RecipeDto>> {
    let recipe = fetch_recipe(&state.db, id, viewer.id()).await?.ok_or_not_found("Recipe")?;
    Ok(Json(recipe))
}

/// `POST /api/recipes/`
pub async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<RecipeWriteRequest>,
) -> AppResult<impl IntoResponse> {
    let RecipeWrite { tags, ingredients, name, text, cooking_time, image } =
        validate_write(&state.db, req, state.config.media.max_image_bytes, false).await?;
    let image_url = match image {
        Some(image) => Some(media::store_image(&state.config.media, image).await?),
        None => None,
    };

    let result = async {
        let mut tx = state.db.begin().await?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO recipes (author_id, name, name_folded, image, text, cooking_time) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) RETURNING id",
        )
        .bind(user.id)
        .bind(&name)
        .bind(name.as_deref().map(fold_case))
        .bind(&image_url)
        .bind(&text)
        .bind(cooking_time)
        .fetch_one(&mut *tx)
        .await?;
        replace_associations(&mut *tx, id, &tags, &ingredients).await?;
        tx.commit().await?;
        Ok::<i64, AppError>(id)
    }
    .await;

    let id = match result {
        Ok(id) => id,
        Err(e) => {
            if let Some(url) = image_url.as_deref() {
                media::remove_image(&state.config.media, url).await;
            }
            return Err(e);
        }
    };

    state.metrics.inc_recipes_created();
    tracing::info!("User {} created recipe {}", user.id, id);
    let recipe = fetch_recipe(&state.db, id, Some(user.id)).await?.ok_or_not_found("Recipe")?;
    Ok((StatusCode::CREATED, Json(recipe)))
}

/// Loads `(author_id, image)` and rejects callers other than the author.
async fn owned_recipe(db: &SqlitePool, recipe_id: i64, user_id: i64) -> AppResult<Option<String>> {
    let row = sqlx::query("SELECT author_id, image FROM recipes WHERE id = ?1")
        .bind(recipe_id)
        .fetch_optional(db)
        .await?
        .ok_or_not_found("Recipe")?;
    if row.get::<i64, _>("author_id") != user_id {
        return Err(AppError::Forbidden("Only the author can change this recipe".to_string()));
    }
    Ok(row.get("image"))
}

/// `PATCH|PUT /api/recipes/{id}/`
pub async fn update(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<RecipeWriteRequest>,
) -> AppResult<Json<RecipeDto>> {
    let old_image = owned_recipe(&state.db, id, user.id).await?;
    let RecipeWrite { tags, ingredients, name, text, cooking_time, image } =
        validate_write(&state.db, req, state.config.media.max_image_bytes, true).await?;
    let new_image = match image {
        Some(image) => Some(media::store_image(&state.config.media, image).await?),
        None => None,
    };

    let result = async {
        let mut tx = state.db.begin().await?;
        sqlx::query(
            "UPDATE recipes SET name = COALESCE(?1, name), name_folded = COALESCE(?6, name_folded), \
             text = COALESCE(?2, text), cooking_time = COALESCE(?3, cooking_time), \
             image = COALESCE(?4, image) WHERE id = ?5",
        )
        .bind(&name)
        .bind(&text)
        .bind(cooking_time)
        .bind(&new_image)
        .bind(id)
        .bind(name.as_deref().map(fold_case))
        .execute(&mut *tx)
        .await?;
        replace_associations(&mut *tx, id, &tags, &ingredients).await?;
        tx.commit().await?;
        Ok::<(), AppError>(())
    }
    .await;

    match (result, new_image.as_deref()) {
        (Err(e), Some(url)) => {
            media::remove_image(&state.config.media, url).await;
            return Err(e);
        }
        (Err(e), None) => return Err(e),
        (Ok(()), Some(_)) => {
            if let Some(old) = old_image.as_deref() {
                media::remove_image(&state.config.media, old).await;
            }
        }
        (Ok(()), None) => {}
    }

    state.metrics.inc_recipes_updated();
    tracing::info!("User {} updated recipe {}", user.id, id);
    let recipe = fetch_recipe(&state.db, id, Some(user.id)).await?.ok_or_not_found("Recipe")?;
    Ok(Json(recipe))
}

/// `DELETE /api/recipes/{id}/`: favorites, cart entries and associations go with it.
pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    let image = owned_recipe(&state.db, id, user.id).await?;
    sqlx::query("DELETE FROM recipes WHERE id = ?1").bind(id).execute(&state.db).await?;
    if let Some(url) = image.as_deref() {
        media::remove_image(&state.config.media, url).await;
    }
    state.metrics.inc_recipes_deleted();
    tracing::info!("User {} deleted recipe {}", user.id, id);
    Ok(StatusCode::NO_CONTENT)
}

/// Per-user recipe lists toggled through `POST`/`DELETE`.
#[derive(Debug, Clone, Copy)]
enum RecipeList {
    Favorites,
    ShoppingCart,
}

impl RecipeList {
    fn table(self) -> &'static str {
        match self {
            RecipeList::Favorites => "favorites",
            RecipeList::ShoppingCart => "shopping_cart",
        }
    }

    fn label(self) -> &'static str {
        match self {
            RecipeList::Favorites => "favorites",
            RecipeList::ShoppingCart => "the shopping cart",
        }
    }
}

async fn add_to_list(state: &AppState, list: RecipeList, user_id: i64, recipe_id: i64) -> AppResult<impl IntoResponse> {
    let recipe = fetch_short_recipe(&state.db, recipe_id).await?.ok_or_not_found("Recipe")?;
    let sql = format!("INSERT INTO {} (user_id, recipe_id) VALUES (?1, ?2) ON CONFLICT DO NOTHING", list.table());
    let result = sqlx::query(&sql).bind(user_id).bind(recipe_id).execute(&state.db).await?;
    if result.rows_affected() == 0 {
        return Err(AppError::BadRequest(format!("Recipe is already in {}", list.label())));
    }
    tracing::debug!("User {} added recipe {} to {}", user_id, recipe_id, list.table());
    Ok((StatusCode::CREATED, Json(recipe)))
}

async fn remove_from_list(state: &AppState, list: RecipeList, user_id: i64, recipe_id: i64) -> AppResult<StatusCode> {
    fetch_short_recipe(&state.db, recipe_id).await?.ok_or_not_found("Recipe")?;
    let sql = format!("DELETE FROM {} WHERE user_id = ?1 AND recipe_id = ?2", list.table());
    let result = sqlx::query(&sql).bind(user_id).bind(recipe_id).execute(&state.db).await?;
    if result.rows_affected() == 0 {
        return Err(AppError::BadRequest(format!("Recipe is not in {}", list.label())));
    }
    tracing::debug!("User {} removed recipe {} from {}", user_id, recipe_id, list.table());
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_favorite(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    add_to_list(&state, RecipeList::Favorites, user.id, id).await
}

pub async fn remove_favorite(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    remove_from_list(&state, RecipeList::Favorites, user.id, id).await
}

pub async fn add_to_cart(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    add_to_list(&state, RecipeList::ShoppingCart, user.id, id).await
}

pub async fn remove_from_cart(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    remove_from_list(&state, RecipeList::ShoppingCart, user.id, id).await
}
