//! Analytics handler.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::AnalyticsParams;
use crate::app_state::AppState;
use crate::error::{ErrorResponse, MonitorError};
use crate::service::AnalyticsReport;

/// `GET /api/analytics` — Aggregates over a time window.
///
/// # Errors
///
/// Returns [`MonitorError::InvalidInput`] for a malformed window token.
#[utoipa::path(
    get,
    path = "/api/analytics",
    tag = "Analytics",
    summary = "Analytics",
    description = "KPIs, daily trends, rankings and recent changes over the window ending now.",
    params(AnalyticsParams),
    responses(
        (status = 200, description = "Analytics report", body = AnalyticsReport),
        (status = 400, description = "Invalid window", body = ErrorResponse),
    )
)]
pub async fn analytics(
    State(state): State<AppState>,
    Query(params): Query<AnalyticsParams>,
) -> Result<impl IntoResponse, MonitorError> {
    let report = state.monitor.analytics(&params.window).await?;
    Ok(Json(report))
}

/// Analytics routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/analytics", get(analytics))
}
