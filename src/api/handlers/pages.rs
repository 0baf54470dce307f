//! Page registry handlers: list, add root, remove root, remove page.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use axum::{Json, Router};

use crate::api::dto::{AddPageRequest, RootGroupDto, RootRequest, StatusResponse, UrlRequest};
use crate::app_state::AppState;
use crate::domain::IntervalUnit;
use crate::error::{ErrorResponse, MonitorError};

/// `GET /api/pages` — Monitored pages grouped by root site.
#[utoipa::path(
    get,
    path = "/api/pages",
    tag = "Pages",
    summary = "List monitored pages",
    description = "Returns every root site keyed by its URL (or `Uncategorized`) with its pages, schedule and master summary.",
    responses(
        (status = 200, description = "Pages grouped by root", body = BTreeMap<String, RootGroupDto>),
    )
)]
pub async fn list_pages(State(state): State<AppState>) -> impl IntoResponse {
    let grouped: BTreeMap<String, RootGroupDto> = state
        .monitor
        .grouped_pages()
        .await
        .into_iter()
        .map(|group| (group.key.to_string(), RootGroupDto::from(group)))
        .collect();
    Json(grouped)
}

/// `POST /api/pages` — Start monitoring a root site.
///
/// # Errors
///
/// Returns [`MonitorError::InvalidInput`] for a missing or malformed URL,
/// an unknown interval unit or a zero interval.
#[utoipa::path(
    post,
    path = "/api/pages",
    tag = "Pages",
    summary = "Monitor a root site",
    description = "Registers a root site with an active schedule. The first crawl runs on the next scheduler tick; use `POST /api/scrape` to crawl immediately.",
    request_body = AddPageRequest,
    responses(
        (status = 201, description = "Root registered", body = StatusResponse),
        (status = 400, description = "Invalid URL or interval", body = ErrorResponse),
    )
)]
pub async fn add_page(
    State(state): State<AppState>,
    Json(req): Json<AddPageRequest>,
) -> Result<impl IntoResponse, MonitorError> {
    let unit: IntervalUnit = req.interval_unit.parse()?;
    let root = state
        .monitor
        .add_site(
            &req.url,
            req.api_key.as_deref(),
            req.interval_value,
            unit,
            req.capture_screenshots,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(StatusResponse::ok(format!(
            "Started monitoring {} every {} {unit}.",
            root.key, req.interval_value
        ))),
    ))
}

/// `DELETE /api/pages` — Stop monitoring a root site.
///
/// # Errors
///
/// Returns [`MonitorError::InvalidInput`] for a missing root identifier.
#[utoipa::path(
    delete,
    path = "/api/pages",
    tag = "Pages",
    summary = "Delete a root site",
    description = "Removes the root, its schedule, its pages and their history. Deleting an unknown root succeeds with zero pages removed.",
    request_body = RootRequest,
    responses(
        (status = 200, description = "Root removed", body = StatusResponse),
        (status = 400, description = "Missing root URL", body = ErrorResponse),
    )
)]
pub async fn delete_root(
    State(state): State<AppState>,
    Json(req): Json<RootRequest>,
) -> Result<impl IntoResponse, MonitorError> {
    let report = state.monitor.remove_root(&req.root_url).await?;
    Ok(Json(StatusResponse::ok(format!(
        "Deleted {} pages.",
        report.pages_removed
    ))))
}

/// `DELETE /api/pages/page` — Stop monitoring a single page.
///
/// # Errors
///
/// Returns [`MonitorError::InvalidInput`] for a missing or malformed URL.
#[utoipa::path(
    delete,
    path = "/api/pages/page",
    tag = "Pages",
    summary = "Delete a page",
    description = "Removes one page and its history. Deleting an unknown page succeeds.",
    request_body = UrlRequest,
    responses(
        (status = 200, description = "Page removed", body = StatusResponse),
        (status = 400, description = "Invalid URL", body = ErrorResponse),
    )
)]
pub async fn delete_page(
    State(state): State<AppState>,
    Json(req): Json<UrlRequest>,
) -> Result<impl IntoResponse, MonitorError> {
    let report = state.monitor.remove_page(&req.url).await?;
    Ok(Json(StatusResponse::ok(format!(
        "Deleted {} page and {} snapshots.",
        report.pages_removed, report.snapshots_removed
    ))))
}

/// Page registry routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/pages", get(list_pages).post(add_page).delete(delete_root))
        .route("/pages/page", delete(delete_page))
}
