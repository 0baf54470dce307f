//! # sitewatch
//!
//! Change-monitoring and versioning engine for tracked web pages.
//!
//! Pages are grouped under root sites, each with an optional schedule.
//! Every scrape, scheduled or on demand, appends an immutable snapshot to
//! the page's history; the change detector flags snapshots whose
//! normalized content differs from the previous successful one, and the
//! analytics aggregator answers windowed queries over that history.
//!
//! ## Architecture
//!
//! ```text
//! Clients (dashboard, HTTP)
//!     │
//!     ├── REST Handlers (api/)
//!     │
//!     ├── MonitorService ◄── Scheduler (service/)
//!     ├── EventBus (domain/)
//!     │
//!     ├── SiteRegistry / SnapshotStore (domain/)
//!     ├── ChangeDetector (diff/)
//!     ├── PageFetcher / Summarizer (fetch/)
//!     │
//!     └── PostgreSQL Persistence
//! ```

pub mod api;
pub mod app_state;
pub mod clock;
pub mod config;
pub mod diff;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod persistence;
pub mod service;
