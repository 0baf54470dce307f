//! Engine error types with HTTP status code mapping.
//!
//! [`MonitorError`] is the central error type for the engine. Each variant
//! maps to a specific HTTP status code and structured JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2003,
///     "message": "insufficient history for https://example.com: need 2 snapshots, have 1",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see the code ranges on [`MonitorError`]).
    pub code: u32,
    /// Human-readable error message, surfaced verbatim by the dashboard.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Engine-wide error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                  |
/// |-----------|-----------------|------------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request              |
/// | 2000–2999 | State/Not Found | 404 Not Found / 409 Conflict |
/// | 3000–3999 | Server          | 500 Internal Server Error    |
/// | 4000–4999 | Collaborator    | 502 Bad Gateway / 503        |
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Unknown page, root site or schedule.
    #[error("not found: {0}")]
    NotFound(String),

    /// Missing URL, malformed interval, unknown window token.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A version compare was requested with fewer than two snapshots.
    #[error("insufficient history for {url}: need 2 snapshots, have {available}")]
    InsufficientHistory {
        /// Page the compare was requested for.
        url: String,
        /// Number of comparable snapshots currently stored.
        available: usize,
    },

    /// Network or parse error while fetching a page.
    #[error("fetch failed: {0}")]
    FetchFailure(String),

    /// Another scrape of the same page is already in flight.
    #[error("busy: {0}")]
    Busy(String),

    /// Summarization or screenshot collaborator is unavailable.
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    PersistenceError(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MonitorError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidInput(_) => 1001,
            Self::NotFound(_) => 2001,
            Self::Busy(_) => 2002,
            Self::InsufficientHistory { .. } => 2003,
            Self::Internal(_) => 3000,
            Self::PersistenceError(_) => 3001,
            Self::FetchFailure(_) => 4001,
            Self::DependencyUnavailable(_) => 4002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Busy(_) | Self::InsufficientHistory { .. } => StatusCode::CONFLICT,
            Self::PersistenceError(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::FetchFailure(_) => StatusCode::BAD_GATEWAY,
            Self::DependencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for MonitorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_history_is_conflict() {
        let err = MonitorError::InsufficientHistory {
            url: "https://example.com".to_string(),
            available: 1,
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.error_code(), 2003);
        assert!(err.to_string().contains("have 1"));
    }

    #[test]
    fn into_response_sets_status() {
        let response = MonitorError::NotFound("schedule for x".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn codes_stay_in_their_ranges() {
        assert_eq!(MonitorError::InvalidInput(String::new()).error_code() / 1000, 1);
        assert_eq!(MonitorError::Busy(String::new()).error_code() / 1000, 2);
        assert_eq!(MonitorError::Internal(String::new()).error_code() / 1000, 3);
        assert_eq!(
            MonitorError::DependencyUnavailable(String::new()).error_code() / 1000,
            4
        );
    }
}
