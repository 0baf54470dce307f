//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::service::MonitorService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Monitor service for all business logic.
    pub monitor: Arc<MonitorService>,
}

impl AppState {
    /// Wraps a service.
    #[must_use]
    pub fn new(monitor: Arc<MonitorService>) -> Self {
        Self { monitor }
    }
}
