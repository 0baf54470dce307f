//! Text diff and version compare handlers.

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::{CompareVersionsResponse, DiffRequest, UrlRequest};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, MonitorError};

/// `POST /api/diff` — Diff two arbitrary texts.
///
/// # Errors
///
/// Returns [`MonitorError::InvalidInput`] when either text exceeds the
/// configured size limit.
#[utoipa::path(
    post,
    path = "/api/diff",
    tag = "Diff",
    summary = "Diff two texts",
    description = "Returns a side-by-side HTML table with line and word level highlighting.",
    request_body = DiffRequest,
    responses(
        (status = 200, description = "HTML diff table", body = String, content_type = "text/html"),
        (status = 400, description = "Text too large", body = ErrorResponse),
    )
)]
pub async fn diff(
    State(state): State<AppState>,
    Json(req): Json<DiffRequest>,
) -> Result<impl IntoResponse, MonitorError> {
    let html = state.monitor.diff_texts(&req.text1, &req.text2)?;
    Ok(([(CONTENT_TYPE, "text/html; charset=utf-8")], html))
}

/// `POST /api/compare-versions` — Diff the two latest versions of a page.
///
/// # Errors
///
/// Returns [`MonitorError::InsufficientHistory`] when fewer than two
/// successful snapshots exist.
#[utoipa::path(
    post,
    path = "/api/compare-versions",
    tag = "Diff",
    summary = "Compare versions",
    description = "Diffs the two most recent successful snapshots of a page with three lines of context.",
    request_body = UrlRequest,
    responses(
        (status = 200, description = "Version diff", body = CompareVersionsResponse),
        (status = 400, description = "Invalid URL", body = ErrorResponse),
        (status = 409, description = "Fewer than two versions", body = ErrorResponse),
    )
)]
pub async fn compare_versions(
    State(state): State<AppState>,
    Json(req): Json<UrlRequest>,
) -> Result<impl IntoResponse, MonitorError> {
    let comparison = state.monitor.compare_versions(&req.url).await?;
    Ok(Json(CompareVersionsResponse::from(comparison)))
}

/// Diff routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/diff", post(diff))
        .route("/compare-versions", post(compare_versions))
}
