//! On-demand scrape and history handlers.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{HistoryEntryDto, HistoryParams, ScrapeResponse, UrlRequest};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, MonitorError};

/// `POST /api/scrape` — Scrape a page now.
///
/// # Errors
///
/// Returns [`MonitorError::Busy`] if the page is already being scraped and
/// [`MonitorError::InvalidInput`] for a missing or malformed URL.
#[utoipa::path(
    post,
    path = "/api/scrape",
    tag = "Scraping",
    summary = "Scrape now",
    description = "Scrapes the page immediately, registering it if needed, then crawls newly discovered links under its root. Fetch failures are recorded in history and reported in the totals.",
    request_body = UrlRequest,
    responses(
        (status = 200, description = "Crawl finished", body = ScrapeResponse),
        (status = 400, description = "Invalid URL", body = ErrorResponse),
        (status = 409, description = "Page already being scraped", body = ErrorResponse),
    )
)]
pub async fn scrape(
    State(state): State<AppState>,
    Json(req): Json<UrlRequest>,
) -> Result<impl IntoResponse, MonitorError> {
    let summary = state.monitor.scrape_now(&req.url).await?;
    Ok(Json(ScrapeResponse::from(summary)))
}

/// `GET /api/history/{url}` — Snapshot history of a page.
///
/// # Errors
///
/// Returns [`MonitorError::NotFound`] for a page that is neither monitored
/// nor has history.
#[utoipa::path(
    get,
    path = "/api/history/{url}",
    tag = "Scraping",
    summary = "Page history",
    description = "Returns snapshots of the page, most recent first, including failed attempts.",
    params(
        ("url" = String, Path, description = "Page URL"),
        HistoryParams,
    ),
    responses(
        (status = 200, description = "Snapshot history", body = Vec<HistoryEntryDto>),
        (status = 404, description = "Page not monitored", body = ErrorResponse),
    )
)]
pub async fn history(
    State(state): State<AppState>,
    Path(url): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, MonitorError> {
    let history = state.monitor.history(&url, params.limit).await?;
    let entries: Vec<HistoryEntryDto> = history
        .iter()
        .map(|snapshot| HistoryEntryDto::from(snapshot.as_ref()))
        .collect();
    Ok(Json(entries))
}

/// Scrape and history routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/scrape", post(scrape))
        .route("/history/{*url}", get(history))
}
