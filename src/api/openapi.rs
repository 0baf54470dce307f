//! OpenAPI document for the REST surface.

use utoipa::OpenApi;

use super::handlers;

/// Generated OpenAPI description of every endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "sitewatch",
        description = "Change monitoring and versioning for tracked web pages."
    ),
    paths(
        handlers::pages::list_pages,
        handlers::pages::add_page,
        handlers::pages::delete_root,
        handlers::pages::delete_page,
        handlers::schedule::toggle_schedule,
        handlers::scrape::scrape,
        handlers::scrape::history,
        handlers::diff::diff,
        handlers::diff::compare_versions,
        handlers::analytics::analytics,
        handlers::system::health_handler,
    ),
    tags(
        (name = "Pages", description = "Root sites and their pages"),
        (name = "Schedules", description = "Periodic re-scraping"),
        (name = "Scraping", description = "On-demand scrapes and history"),
        (name = "Diff", description = "Text and version diffs"),
        (name = "Analytics", description = "Aggregates over history"),
        (name = "System", description = "Health"),
    )
)]
pub struct ApiDoc;
