//! Service layer: business logic orchestration.
//!
//! [`MonitorService`] owns the scrape-and-append path and every command;
//! [`Scheduler`] drives it on a timer; [`analytics`] aggregates history on
//! demand.

pub mod analytics;
pub mod monitor_service;
pub mod scheduler;

pub use analytics::{AnalyticsAggregator, AnalyticsReport, AnalyticsWindow};
pub use monitor_service::{
    MonitorPolicy, MonitorService, RemovalReport, ScrapeReport, ScrapeSummary, VersionComparison,
};
pub use scheduler::{Scheduler, TickReport};
