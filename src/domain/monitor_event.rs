//! Domain events reflecting registry and history mutations.
//!
//! Every state change emits a [`MonitorEvent`] through the
//! [`super::EventBus`]. Events are optionally appended to the PostgreSQL
//! event log.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{IntervalUnit, PageUrl, RootKey, ScrapeStatus};

/// Domain event emitted after every state mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// A root site was added or re-added.
    RootAdded {
        /// Root key.
        root: RootKey,
        /// Schedule interval magnitude.
        interval_value: u32,
        /// Schedule interval unit.
        interval_unit: IntervalUnit,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A root site and its pages were removed.
    RootRemoved {
        /// Root key.
        root: RootKey,
        /// Number of pages removed with it.
        pages_removed: usize,
        /// Number of snapshots removed with it.
        snapshots_removed: usize,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A single page was removed.
    PageRemoved {
        /// Page URL.
        page_url: PageUrl,
        /// Root the page belonged to.
        root: RootKey,
        /// Number of snapshots removed with it.
        snapshots_removed: usize,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A schedule was paused or resumed.
    ScheduleToggled {
        /// Root key.
        root: RootKey,
        /// New active flag.
        active: bool,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A scrape attempt was recorded in history.
    SnapshotRecorded {
        /// Page URL.
        page_url: PageUrl,
        /// Root the page belongs to.
        root: RootKey,
        /// Snapshot sequence number.
        seq: u64,
        /// Scrape outcome.
        status: ScrapeStatus,
        /// Whether content changed.
        changed: bool,
        /// Crawl run the attempt belonged to.
        run_id: Uuid,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl MonitorEvent {
    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::RootAdded { .. } => "root_added",
            Self::RootRemoved { .. } => "root_removed",
            Self::PageRemoved { .. } => "page_removed",
            Self::ScheduleToggled { .. } => "schedule_toggled",
            Self::SnapshotRecorded { .. } => "snapshot_recorded",
        }
    }

    /// Root the event concerns.
    #[must_use]
    pub const fn root(&self) -> &RootKey {
        match self {
            Self::RootAdded { root, .. }
            | Self::RootRemoved { root, .. }
            | Self::PageRemoved { root, .. }
            | Self::ScheduleToggled { root, .. }
            | Self::SnapshotRecorded { root, .. } => root,
        }
    }

    /// Event timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::RootAdded { timestamp, .. }
            | Self::RootRemoved { timestamp, .. }
            | Self::PageRemoved { timestamp, .. }
            | Self::ScheduleToggled { timestamp, .. }
            | Self::SnapshotRecorded { timestamp, .. } => *timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_event_type_tag() {
        let event = MonitorEvent::ScheduleToggled {
            root: RootKey::Uncategorized,
            active: false,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap_or_default();
        assert_eq!(json["event_type"], "schedule_toggled");
        assert_eq!(json["root"], "Uncategorized");
        assert_eq!(event.event_type_str(), "schedule_toggled");
    }

    #[test]
    fn root_accessor() {
        let event = MonitorEvent::RootRemoved {
            root: RootKey::Uncategorized,
            pages_removed: 2,
            snapshots_removed: 5,
            timestamp: Utc::now(),
        };
        assert_eq!(event.root(), &RootKey::Uncategorized);
    }
}
