//! REST endpoint handlers organized by resource.

pub mod analytics;
pub mod diff;
pub mod pages;
pub mod schedule;
pub mod scrape;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(pages::routes())
        .merge(schedule::routes())
        .merge(scrape::routes())
        .merge(diff::routes())
        .merge(analytics::routes())
}
