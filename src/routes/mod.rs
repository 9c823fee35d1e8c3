//! HTTP route handlers for the Foodgram API.
//!
//! - `auth`: token login and logout
//! - `users`: registration, profiles, password change and subscriptions
//! - `tags`, `ingredients`: reference data, writable by staff only
//! - `recipes`: recipe CRUD, favorites and the shopping cart
//! - `export`: shopping list download
//! - `health`: probes, metrics and version info

use axum::{
    extract::DefaultBodyLimit,
    http::{header::CONTENT_TYPE, Response},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::{
        predicate::{DefaultPredicate, Predicate},
        CompressionLayer,
    },
    services::ServeDir,
    trace::TraceLayer,
};

use crate::{middleware, state::AppState};

pub mod auth;
pub mod export;
pub mod health;
pub mod ingredients;
pub mod recipes;
pub mod recipes_helpers;
pub mod tags;
pub mod users;

/// All `/api/` routes. Every path keeps its trailing slash.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/token/login/", post(auth::login))
        .route("/api/auth/token/logout/", post(auth::logout))
        .route("/api/users/", get(users::list_users).post(users::register))
        .route("/api/users/me/", get(users::me))
        .route("/api/users/set_password/", post(users::set_password))
        .route("/api/users/subscriptions/", get(users::subscriptions))
        .route("/api/users/{id}/", get(users::get_user))
        .route("/api/users/{id}/subscribe/", post(users::subscribe).delete(users::unsubscribe))
        .route("/api/tags/", get(tags::list_tags).post(tags::create_tag))
        .route("/api/tags/{id}/", get(tags::get_tag).patch(tags::update_tag).delete(tags::delete_tag))
        .route("/api/ingredients/", get(ingredients::list_ingredients).post(ingredients::create_ingredient))
        .route(
            "/api/ingredients/{id}/",
            get(ingredients::get_ingredient)
                .patch(ingredients::update_ingredient)
                .delete(ingredients::delete_ingredient),
        )
        .route("/api/recipes/", get(recipes::list).post(recipes::create))
        .route("/api/recipes/download_shopping_cart/", get(export::download_shopping_cart))
        .route(
            "/api/recipes/{id}/",
            get(recipes::get).patch(recipes::update).put(recipes::update).delete(recipes::delete),
        )
        .route("/api/recipes/{id}/favorite/", post(recipes::add_favorite).delete(recipes::remove_favorite))
        .route("/api/recipes/{id}/shopping_cart/", post(recipes::add_to_cart).delete(recipes::remove_from_cart))
}

/// Default compression predicate that also skips PDF downloads.
#[derive(Clone)]
struct NoPdfDefault(DefaultPredicate);

impl Predicate for NoPdfDefault {
    fn should_compress<B: axum::body::HttpBody>(&self, res: &Response<B>) -> bool {
        if let Some(ct) = res.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
            if ct.starts_with("application/pdf") {
                return false;
            }
        }
        self.0.should_compress(res)
    }
}

/// The complete application: API, operational endpoints, uploaded media and
/// the middleware stack.
pub fn app(state: AppState) -> Router {
    let cfg = state.config.clone();
    let limited = state.clone();

    let compression = CompressionLayer::new().compress_when(NoPdfDefault(DefaultPredicate::new()));

    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/metrics", get(health::metrics))
        .route("/metrics/prometheus", get(health::metrics_prometheus))
        .route("/version", get(health::version))
        .merge(api_routes())
        .nest_service(cfg.media.base_url.trim_end_matches('/'), ServeDir::new(&cfg.media.root))
        .with_state(state)
        .layer(DefaultBodyLimit::max(middleware::validation::max_body_size()))
        .layer(from_fn(middleware::validation::validate_request_middleware))
        .layer(from_fn_with_state(limited, middleware::rate_limit::rate_limit_middleware))
        .layer(compression)
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(cfg, middleware::security_headers::security_headers_middleware))
}
