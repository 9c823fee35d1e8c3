// Query helpers shared by the recipe, user and subscription handlers.

use std::collections::HashMap;

use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};

use crate::error::{AppError, AppResult};
use crate::types::{RecipeDto, RecipeIngredientDto, ShortRecipeDto, TagDto, UserDto};

/// Appends the user columns plus `is_subscribed` relative to `viewer`.
/// Expects the users table aliased as `u`.
pub fn push_user_columns(qb: &mut QueryBuilder<'_, Sqlite>, viewer: Option<i64>) {
    qb.push(
        "u.id AS user_id, u.email, u.username, u.first_name, u.last_name, \
         EXISTS(SELECT 1 FROM subscriptions s WHERE s.author_id = u.id AND s.user_id = ",
    )
    .push_bind(viewer)
    .push(") AS is_subscribed");
}

pub fn user_from_row(row: &SqliteRow) -> UserDto {
    UserDto {
        email: row.get("email"),
        id: row.get("user_id"),
        username: row.get("username"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        is_subscribed: row.get::<i64, _>("is_subscribed") != 0,
    }
}

pub async fn fetch_user(db: &SqlitePool, user_id: i64, viewer: Option<i64>) -> AppResult<Option<UserDto>> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT ");
    push_user_columns(&mut qb, viewer);
    qb.push(" FROM users u WHERE u.id = ").push_bind(user_id);
    let row = qb.build().fetch_optional(db).await?;
    Ok(row.as_ref().map(user_from_row))
}

/// List filters for `GET /api/recipes/`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeFilter {
    pub author: Option<i64>,
    /// Tag slugs; a recipe matches when it carries any of them.
    pub tags: Vec<String>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

fn truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

impl RecipeFilter {
    pub fn from_params(params: &[(String, String)]) -> AppResult<Self> {
        let mut filter = RecipeFilter::default();
        for (key, value) in params {
            match key.as_str() {
                "author" => {
                    let id = value
                        .trim()
                        .parse::<i64>()
                        .map_err(|_| AppError::validation("author", format!("'{}' is not a valid user id", value)))?;
                    filter.author = Some(id);
                }
                "tags" => {
                    let slug = value.trim();
                    if !slug.is_empty() && !filter.tags.iter().any(|t| t == slug) {
                        filter.tags.push(slug.to_string());
                    }
                }
                "is_favorited" => filter.is_favorited = truthy(value),
                "is_in_shopping_cart" => filter.is_in_shopping_cart = truthy(value),
                _ => {}
            }
        }
        Ok(filter)
    }

    /// Appends `WHERE` conditions. The user-scoped flags only apply to a known viewer.
    fn push_conditions(&self, qb: &mut QueryBuilder<'_, Sqlite>, viewer: Option<i64>) {
        qb.push(" WHERE 1 = 1");
        if let Some(author) = self.author {
            qb.push(" AND r.author_id = ").push_bind(author);
        }
        if !self.tags.is_empty() {
            qb.push(
                " AND EXISTS (SELECT 1 FROM recipe_tags rt JOIN tags t ON t.id = rt.tag_id \
                 WHERE rt.recipe_id = r.id AND t.slug IN (",
            );
            let mut sep = qb.separated(", ");
            for slug in &self.tags {
                sep.push_bind(slug.clone());
            }
            sep.push_unseparated("))");
        }
        if let Some(viewer) = viewer {
            if self.is_favorited {
                qb.push(" AND EXISTS (SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ")
                    .push_bind(viewer)
                    .push(")");
            }
            if self.is_in_shopping_cart {
                qb.push(" AND EXISTS (SELECT 1 FROM shopping_cart c WHERE c.recipe_id = r.id AND c.user_id = ")
                    .push_bind(viewer)
                    .push(")");
            }
        }
    }
}

fn push_recipe_select(qb: &mut QueryBuilder<'_, Sqlite>, viewer: Option<i64>) {
    qb.push("SELECT r.id, r.name, r.image, r.text, r.cooking_time, ");
    push_user_columns(qb, viewer);
    qb.push(", EXISTS(SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ")
        .push_bind(viewer)
        .push(") AS is_favorited, EXISTS(SELECT 1 FROM shopping_cart c WHERE c.recipe_id = r.id AND c.user_id = ")
        .push_bind(viewer)
        .push(") AS is_in_shopping_cart FROM recipes r JOIN users u ON u.id = r.author_id");
}

fn recipe_from_row(row: &SqliteRow) -> RecipeDto {
    RecipeDto {
        id: row.get("id"),
        tags: Vec::new(),
        author: user_from_row(row),
        ingredients: Vec::new(),
        is_favorited: row.get::<i64, _>("is_favorited") != 0,
        is_in_shopping_cart: row.get::<i64, _>("is_in_shopping_cart") != 0,
        name: row.get("name"),
        image: row.get("image"),
        text: row.get("text"),
        cooking_time: row.get("cooking_time"),
    }
}

pub async fn count_recipes(db: &SqlitePool, filter: &RecipeFilter, viewer: Option<i64>) -> AppResult<i64> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS cnt FROM recipes r");
    filter.push_conditions(&mut qb, viewer);
    let row = qb.build().fetch_one(db).await?;
    Ok(row.try_get::<i64, _>("cnt")?)
}

/// One page of recipes ordered by name, with tags and ingredients attached.
pub async fn list_recipes(
    db: &SqlitePool,
    filter: &RecipeFilter,
    viewer: Option<i64>,
    limit: i64,
    offset: i64,
) -> AppResult<Vec<RecipeDto>> {
    let mut qb = QueryBuilder::<Sqlite>::new("");
    push_recipe_select(&mut qb, viewer);
    filter.push_conditions(&mut qb, viewer);
    qb.push(" ORDER BY r.name_folded, r.id LIMIT ").push_bind(limit).push(" OFFSET ").push_bind(offset);
    let rows = qb.build().fetch_all(db).await?;
    let recipes = rows.iter().map(recipe_from_row).collect();
    attach_relations(db, recipes).await
}

pub async fn fetch_recipe(db: &SqlitePool, recipe_id: i64, viewer: Option<i64>) -> AppResult<Option<RecipeDto>> {
    let mut qb = QueryBuilder::<Sqlite>::new("");
    push_recipe_select(&mut qb, viewer);
    qb.push(" WHERE r.id = ").push_bind(recipe_id);
    let Some(row) = qb.build().fetch_optional(db).await? else {
        return Ok(None);
    };
    let mut recipes = attach_relations(db, vec![recipe_from_row(&row)]).await?;
    Ok(recipes.pop())
}

/// Loads tags and ingredient lines for all `recipes` in two queries.
async fn attach_relations(db: &SqlitePool, mut recipes: Vec<RecipeDto>) -> AppResult<Vec<RecipeDto>> {
    if recipes.is_empty() {
        return Ok(recipes);
    }
    let ids: Vec<i64> = recipes.iter().map(|r| r.id).collect();

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT rt.recipe_id, t.id, t.name, t.color, t.slug FROM recipe_tags rt \
         JOIN tags t ON t.id = rt.tag_id WHERE rt.recipe_id IN (",
    );
    push_id_list(&mut qb, &ids);
    qb.push(" ORDER BY t.id");
    let mut tags: HashMap<i64, Vec<TagDto>> = HashMap::new();
    for row in qb.build().fetch_all(db).await? {
        tags.entry(row.get("recipe_id")).or_default().push(TagDto {
            id: row.get("id"),
            name: row.get("name"),
            color: row.get("color"),
            slug: row.get("slug"),
        });
    }

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT ri.recipe_id, i.id, i.name, i.measurement_unit, ri.amount FROM recipe_ingredients ri \
         JOIN ingredients i ON i.id = ri.ingredient_id WHERE ri.recipe_id IN (",
    );
    push_id_list(&mut qb, &ids);
    qb.push(" ORDER BY ri.id");
    let mut ingredients: HashMap<i64, Vec<RecipeIngredientDto>> = HashMap::new();
    for row in qb.build().fetch_all(db).await? {
        ingredients.entry(row.get("recipe_id")).or_default().push(RecipeIngredientDto {
            id: row.get("id"),
            name: row.get("name"),
            measurement_unit: row.get("measurement_unit"),
            amount: row.get("amount"),
        });
    }

    for recipe in recipes.iter_mut() {
        recipe.tags = tags.remove(&recipe.id).unwrap_or_default();
        recipe.ingredients = ingredients.remove(&recipe.id).unwrap_or_default();
    }
    Ok(recipes)
}

fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    let mut sep = qb.separated(", ");
    for id in ids {
        sep.push_bind(*id);
    }
    sep.push_unseparated(")");
}

fn short_from_row(row: &SqliteRow) -> ShortRecipeDto {
    ShortRecipeDto {
        id: row.get("id"),
        name: row.get("name"),
        image: row.get("image"),
        cooking_time: row.get("cooking_time"),
    }
}

pub async fn fetch_short_recipe(db: &SqlitePool, recipe_id: i64) -> AppResult<Option<ShortRecipeDto>> {
    let row = sqlx::query("SELECT id, name, image, cooking_time FROM recipes WHERE id = ?1")
        .bind(recipe_id)
        .fetch_optional(db)
        .await?;
    Ok(row.as_ref().map(short_from_row))
}

/// Per author: up to `limit` recipes (all when `None`) ordered by name, and the total count.
pub async fn recipes_by_authors(
    db: &SqlitePool,
    author_ids: &[i64],
    limit: Option<i64>,
) -> AppResult<HashMap<i64, (Vec<ShortRecipeDto>, i64)>> {
    let mut out: HashMap<i64, (Vec<ShortRecipeDto>, i64)> =
        author_ids.iter().map(|id| (*id, (Vec::new(), 0))).collect();
    if author_ids.is_empty() {
        return Ok(out);
    }

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT author_id, id, name, image, cooking_time, total FROM (\
         SELECT author_id, id, name, image, cooking_time, \
         COUNT(*) OVER (PARTITION BY author_id) AS total, \
         ROW_NUMBER() OVER (PARTITION BY author_id ORDER BY name_folded, id) AS rn \
         FROM recipes WHERE author_id IN (",
    );
    push_id_list(&mut qb, author_ids);
    qb.push(")");
    if let Some(limit) = limit {
        qb.push(" WHERE rn <= ").push_bind(limit);
    }
    qb.push(" ORDER BY author_id, rn");

    for row in qb.build().fetch_all(db).await? {
        let entry = out.entry(row.get("author_id")).or_default();
        entry.1 = row.get("total");
        entry.0.push(short_from_row(&row));
    }

    // Authors whose recipes were all cut by a zero limit still need their count
    if limit == Some(0) {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT author_id, COUNT(*) AS total FROM recipes WHERE author_id IN (");
        push_id_list(&mut qb, author_ids);
        qb.push(" GROUP BY author_id");
        for row in qb.build().fetch_all(db).await? {
            out.entry(row.get("author_id")).or_default().1 = row.get("total");
        }
    }
    Ok(out)
}

/// Parses `recipes_limit`; absent means unlimited.
pub fn recipes_limit(params: &[(String, String)]) -> AppResult<Option<i64>> {
    match params.iter().find(|(k, _)| k == "recipes_limit") {
        None => Ok(None),
        Some((_, raw)) if raw.trim().is_empty() => Ok(None),
        Some((_, raw)) => match raw.trim().parse::<i64>() {
            Ok(n) if n >= 0 => Ok(Some(n)),
            _ => Err(AppError::validation("recipes_limit", "Must be a non-negative integer")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn filter_parsing() {
        let f = RecipeFilter::from_params(&params(&[
            ("author", "3"),
            ("tags", "lunch"),
            ("tags", "dinner"),
            ("tags", "lunch"),
            ("is_favorited", "1"),
            ("is_in_shopping_cart", "0"),
            ("page", "2"),
        ]))
        .unwrap();
        assert_eq!(f.author, Some(3));
        assert_eq!(f.tags, vec!["lunch".to_string(), "dinner".to_string()]);
        assert!(f.is_favorited);
        assert!(!f.is_in_shopping_cart);

        assert!(RecipeFilter::from_params(&params(&[("author", "me")])).is_err());
    }

    #[test]
    fn recipes_limit_parsing() {
        assert_eq!(recipes_limit(&params(&[])).unwrap(), None);
        assert_eq!(recipes_limit(&params(&[("recipes_limit", "2")])).unwrap(), Some(2));
        assert!(recipes_limit(&params(&[("recipes_limit", "-1")])).is_err());
        assert!(recipes_limit(&params(&[("recipes_limit", "x")])).is_err());
    }
}
