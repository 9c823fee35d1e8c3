//! # Foodgram Backend Library
//!
//! REST backend for Foodgram, a recipe sharing service. Users publish recipes
//! built from tags and ingredients, follow other authors, keep favorites and
//! collect recipes in a shopping cart that can be downloaded as one aggregated
//! shopping list.
//!
//! ## Core Components
//!
//! - [`auth`]: password hashing and API tokens
//! - [`config`]: layered configuration (defaults, TOML files, environment)
//! - [`db`]: pool setup, schema and the bootstrap staff account
//! - [`error`]: the `AppError` type and its JSON responses
//! - [`media`]: decoding and storing uploaded recipe images
//! - [`metrics`]: domain counters for `/metrics`
//! - [`middleware`]: authentication extractors, rate limiting, validation and security headers
//! - [`pagination`]: page/limit pagination and the response envelope
//! - [`routes`]: HTTP handlers and the router
//! - [`shopping_list`]: cart aggregation and PDF/TXT/CSV rendering
//! - [`state`]: shared application state
//! - [`types`]: request and response bodies

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod media;
pub mod metrics;
pub mod middleware;
pub mod pagination;
pub mod routes;
pub mod shopping_list;
pub mod state;
pub mod types;

#[cfg(test)]
mod tests;
