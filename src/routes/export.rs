use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::{
    error::{AppError, AppResult},
    middleware::{auth::CurrentUser, ip::MaybeRemoteAddr, Endpoint},
    shopping_list::{fetch_shopping_list, render_csv, render_pdf, render_text},
    state::AppState,
};

const FILE_STEM: &str = "foodgram_shopping_cart";

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub format: Option<String>, // pdf (default), txt or csv
}

/// `GET /api/recipes/download_shopping_cart/`
pub async fn download_shopping_cart(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    remote: MaybeRemoteAddr,
    headers: HeaderMap,
    Query(query): Query<DownloadQuery>,
) -> AppResult<Response> {
    state.rate_limits.check_endpoint(Endpoint::ShoppingListExport, remote.client_ip(&headers)).await?;
    let format = query.format.as_deref().map(str::to_ascii_lowercase).unwrap_or_else(|| "pdf".to_string());
    if !matches!(format.as_str(), "pdf" | "txt" | "csv") {
        return Err(AppError::BadRequest("Invalid format. Use 'pdf', 'txt' or 'csv'".to_string()));
    }

    let items = fetch_shopping_list(&state.db, user.id).await?;
    let title = state.config.export.title.clone();

    let (body, content_type) = match format.as_str() {
        "txt" => (render_text(&title, &items).into_bytes(), "text/plain; charset=utf-8"),
        "csv" => (render_csv(&items).into_bytes(), "text/csv; charset=utf-8"),
        _ => {
            let cfg = state.config.clone();
            let bytes = tokio::task::spawn_blocking(move || render_pdf(&cfg.export, &items)).await??;
            (bytes, "application/pdf")
        }
    };

    state.metrics.inc_shopping_lists_exported();
    tracing::info!("User {} downloaded shopping list as {}", user.id, format);

    let mut response = body.into_response();
    response.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    let disposition = format!("attachment; filename=\"{}.{}\"", FILE_STEM, format);
    if let Ok(header_val) = HeaderValue::from_str(&disposition) {
        response.headers_mut().insert(header::CONTENT_DISPOSITION, header_val);
    }
    Ok(response)
}
