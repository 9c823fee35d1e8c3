//! Tests for the Foodgram backend.
//!
//! The API modules drive the full router with `tower::ServiceExt::oneshot`
//! against a temporary SQLite database; see [`support`] for the fixtures.
//!
//! - **users_api_tests**: registration, tokens, profiles and subscriptions
//! - **recipes_api_tests**: recipe CRUD, validation, filters and pagination
//! - **cart_api_tests**: favorites, shopping cart and the shopping list download
//! - **reference_api_tests**: tags and ingredients
//! - **health_api_tests**: probes, metrics and response headers
//! - **config_tests**, **db_tests**, **error_tests**: configuration, schema and error mapping

pub mod support;

pub mod health_api_tests;
pub mod recipes_api_tests;
pub mod reference_api_tests;
