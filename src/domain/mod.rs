//! Domain layer: pages, schedules, snapshot history and events.
//!
//! Holds the monitored-site model (normalized URLs, root sites, schedules),
//! the append-only snapshot store, the site registry, and the event bus
//! used to broadcast every state change.

pub mod event_bus;
pub mod monitor_event;
pub mod page_url;
pub mod schedule;
pub mod site_registry;
pub mod snapshot;
pub mod snapshot_store;

pub use event_bus::EventBus;
pub use monitor_event::MonitorEvent;
pub use page_url::{PageUrl, RootKey, UNCATEGORIZED};
pub use schedule::{IntervalUnit, Schedule};
pub use site_registry::{ApiKey, Page, RootGroup, RootOverview, RootSite, SiteRegistry, SiteSettings};
pub use snapshot::{ScrapeOutcome, ScrapeStatus, Snapshot, SnapshotDraft};
pub use snapshot_store::SnapshotStore;
