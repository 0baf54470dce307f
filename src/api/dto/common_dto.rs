//! Shared DTO types used across multiple endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Outcome of a command, surfaced verbatim by the dashboard.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StatusResponse {
    /// Always `true`; failures use the error body instead.
    pub success: bool,
    /// Human-readable status line.
    pub message: String,
}

impl StatusResponse {
    /// A successful outcome with `message`.
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// Request body naming a single page.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UrlRequest {
    /// Page URL.
    #[serde(default)]
    pub url: String,
}

/// Request body naming a root site.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RootRequest {
    /// Root URL, or `"Uncategorized"`.
    #[serde(default)]
    pub root_url: String,
}

/// Query parameters for `GET /api/history/{url}`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryParams {
    /// Maximum number of entries. Defaults to the configured history limit.
    pub limit: Option<usize>,
}

/// Query parameters for `GET /api/analytics`.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AnalyticsParams {
    /// Window token such as `24h` or `7d`.
    #[serde(default = "default_window")]
    pub window: String,
}

fn default_window() -> String {
    "24h".to_string()
}
