use serde::{Deserialize, Serialize};

// Upper bound of the original PositiveSmallInteger columns
pub const MAX_SMALL_INT: i64 = 32_767;
pub const NAME_MAX_LEN: usize = 200;
pub const PERSON_NAME_MAX_LEN: usize = 150;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserDto {
    pub email: String,
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub auth_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetPasswordRequest {
    pub new_password: String,
    pub current_password: String,
}

/// An author as seen from the subscriptions endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionDto {
    #[serde(flatten)]
    pub user: UserDto,
    pub recipes: Vec<ShortRecipeDto>,
    pub recipes_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TagDto {
    pub id: i64,
    pub name: String,
    pub color: String,
    pub slug: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagRequest {
    pub name: Option<String>,
    pub color: Option<String>,
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngredientDto {
    pub id: i64,
    pub name: String,
    pub measurement_unit: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngredientRequest {
    pub name: Option<String>,
    pub measurement_unit: Option<String>,
}

/// An ingredient line inside a recipe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecipeIngredientDto {
    pub id: i64,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeDto {
    pub id: i64,
    pub tags: Vec<TagDto>,
    pub author: UserDto,
    pub ingredients: Vec<RecipeIngredientDto>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: Option<String>,
    pub text: String,
    pub cooking_time: i64,
}

/// Compact recipe used by favorites, the cart and subscriptions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShortRecipeDto {
    pub id: i64,
    pub name: String,
    pub image: Option<String>,
    pub cooking_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngredientAmount {
    pub id: i64,
    pub amount: i64,
}

/// Body for recipe create and update. On update the scalar fields may be omitted
/// while `tags` and `ingredients` always replace the stored associations.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipeWriteRequest {
    pub tags: Option<Vec<i64>>,
    pub ingredients: Option<Vec<IngredientAmount>>,
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i64>,
    /// `data:image/...;base64,...`
    pub image: Option<String>,
}
