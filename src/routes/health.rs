//! Operational endpoints outside `/api/`.

use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use std::time::Duration;

const READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Liveness: answers as long as the process serves requests.
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness: the SQLite pool must answer `SELECT 1` within [`READY_TIMEOUT`].
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let query = sqlx::query("SELECT 1").fetch_one(&state.db);
    match tokio::time::timeout(READY_TIMEOUT, query).await {
        Ok(Ok(_)) => (StatusCode::OK, "ready").into_response(),
        Ok(Err(e)) => (StatusCode::SERVICE_UNAVAILABLE, format!("not ready: {}", e)).into_response(),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "not ready: timeout").into_response(),
    }
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.get_snapshot())
}

/// Counters in the Prometheus text exposition format.
pub async fn metrics_prometheus(State(state): State<AppState>) -> impl IntoResponse {
    let m = state.metrics.get_snapshot();
    let counters = [
        ("users_registered", "Accounts registered", m.users_registered),
        ("logins", "Successful token logins", m.logins),
        ("recipes_created", "Recipes created", m.recipes_created),
        ("recipes_updated", "Recipes updated", m.recipes_updated),
        ("recipes_deleted", "Recipes deleted", m.recipes_deleted),
        ("shopping_lists_exported", "Shopping lists downloaded", m.shopping_lists_exported),
    ];
    let mut body = String::new();
    for (name, help, value) in counters {
        body.push_str(&format!(
            "# HELP foodgram_{name} {help}\n# TYPE foodgram_{name} counter\nfoodgram_{name} {value}\n"
        ));
    }
    body.push_str(&format!(
        "# HELP foodgram_uptime_seconds Uptime seconds\n# TYPE foodgram_uptime_seconds gauge\nfoodgram_uptime_seconds {}\n",
        m.uptime_seconds
    ));
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

pub async fn version() -> impl IntoResponse {
    let body = serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "package": {
            "description": env!("CARGO_PKG_DESCRIPTION"),
            "authors": env!("CARGO_PKG_AUTHORS"),
            "license": env!("CARGO_PKG_LICENSE"),
        },
        "build": {
            "profile": if cfg!(debug_assertions) { "debug" } else { "release" },
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        }
    });
    (StatusCode::OK, Json(body))
}
