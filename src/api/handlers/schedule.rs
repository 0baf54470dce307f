//! Schedule toggle handler.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::{ScheduleDto, ToggleScheduleRequest, ToggleScheduleResponse};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, MonitorError};

/// `POST /api/schedule/toggle` — Pause or resume a root's schedule.
///
/// # Errors
///
/// Returns [`MonitorError::NotFound`] when the root has no schedule and
/// [`MonitorError::InvalidInput`] for a missing root identifier.
#[utoipa::path(
    post,
    path = "/api/schedule/toggle",
    tag = "Schedules",
    summary = "Toggle a schedule",
    description = "Sets the active flag of a root's schedule. Pausing takes effect by the next tick; in-flight scrapes finish.",
    request_body = ToggleScheduleRequest,
    responses(
        (status = 200, description = "Schedule updated", body = ToggleScheduleResponse),
        (status = 400, description = "Missing root URL", body = ErrorResponse),
        (status = 404, description = "Root has no schedule", body = ErrorResponse),
    )
)]
pub async fn toggle_schedule(
    State(state): State<AppState>,
    Json(req): Json<ToggleScheduleRequest>,
) -> Result<impl IntoResponse, MonitorError> {
    let schedule = state
        .monitor
        .set_schedule_active(&req.root_url, req.is_active)
        .await?;
    let message = if req.is_active {
        "Schedule activated."
    } else {
        "Schedule paused."
    };
    Ok(Json(ToggleScheduleResponse {
        success: true,
        message: message.to_string(),
        schedule: ScheduleDto::from(schedule),
    }))
}

/// Schedule routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/schedule/toggle", post(toggle_schedule))
}
