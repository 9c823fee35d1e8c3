//! Shared fixtures for the API tests: a router over a temporary SQLite file,
//! request helpers and direct database seeding.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use crate::{auth::generate_token, config::AppConfig, db, routes, state::AppState};

// 1x1 transparent PNG
pub const PIXEL_PNG: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    _dir: TempDir,
}

/// A user created straight in the database, with a valid token.
pub struct TestUser {
    pub id: i64,
    pub token: String,
}

pub async fn setup() -> TestApp {
    setup_with(|_| {}).await
}

pub async fn setup_with(customize: impl FnOnce(&mut AppConfig)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("foodgram.db").display());
    let pool = db::connect(&url, 4).await.unwrap();
    db::init_db(&pool).await.unwrap();

    let mut config = AppConfig::default();
    config.database.url = url;
    config.server.public_url = Some("http://testserver".to_string());
    config.media.root = dir.path().join("media").display().to_string();
    customize(&mut config);

    let state = AppState::new(pool, config);
    let app = routes::app(state.clone());
    TestApp { app, state, _dir: dir }
}

impl TestApp {
    pub async fn send(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri).header("x-forwarded-for", "10.0.0.1");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Token {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Sends a request and decodes the JSON body (`Null` when empty).
    pub async fn json(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let response = self.send(method, uri, token, body).await;
        let status = response.status();
        let bytes = body_bytes(response).await;
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    pub async fn create_user(&self, username: &str, is_staff: bool) -> TestUser {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO users (email, username, first_name, last_name, password_hash, is_staff) \
             VALUES (?1, ?2, 'Test', 'User', '!', ?3) RETURNING id",
        )
        .bind(format!("{}@example.org", username))
        .bind(username)
        .bind(is_staff)
        .fetch_one(&self.state.db)
        .await
        .unwrap();
        let token = generate_token();
        sqlx::query("INSERT INTO auth_tokens (key, user_id) VALUES (?1, ?2)")
            .bind(&token)
            .bind(id)
            .execute(&self.state.db)
            .await
            .unwrap();
        TestUser { id, token }
    }

    pub async fn seed_tag(&self, name: &str, color: &str, slug: &str) -> i64 {
        sqlx::query_scalar("INSERT INTO tags (name, color, slug) VALUES (?1, ?2, ?3) RETURNING id")
            .bind(name)
            .bind(color)
            .bind(slug)
            .fetch_one(&self.state.db)
            .await
            .unwrap()
    }

    pub async fn seed_ingredient(&self, name: &str, unit: &str) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO ingredients (name, name_folded, measurement_unit) VALUES (?1, ?2, ?3) RETURNING id",
        )
        .bind(name)
        .bind(db::fold_case(name))
        .bind(unit)
            .fetch_one(&self.state.db)
            .await
            .unwrap()
    }

    /// Creates a recipe through the API and returns its id.
    pub async fn create_recipe(&self, user: &TestUser, name: &str, tags: &[i64], ingredients: &[(i64, i64)]) -> i64 {
        let body = recipe_body(name, tags, ingredients);
        let (status, json) = self.json("POST", "/api/recipes/", Some(&user.token), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "{}", json);
        json["id"].as_i64().unwrap()
    }
}

pub fn recipe_body(name: &str, tags: &[i64], ingredients: &[(i64, i64)]) -> Value {
    let ingredients: Vec<Value> =
        ingredients.iter().map(|(id, amount)| serde_json::json!({ "id": id, "amount": amount })).collect();
    serde_json::json!({
        "tags": tags,
        "ingredients": ingredients,
        "name": name,
        "text": format!("How to cook {}", name),
        "cooking_time": 15,
    })
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}
