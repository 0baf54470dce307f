//! Database rows and their conversion to domain types.

use chrono::{DateTime, Utc};

use crate::domain::{
    ApiKey, IntervalUnit, Page, PageUrl, RootKey, RootSite, Schedule, ScrapeStatus, SiteSettings,
    Snapshot,
};
use crate::error::MonitorError;

/// A row from the `roots` table.
#[derive(Debug, Clone)]
pub struct RootRow {
    /// Root key as its display string.
    pub root_key: String,
    /// Schedule interval, if a schedule is set.
    pub interval_value: Option<i32>,
    /// Schedule unit, if a schedule is set.
    pub interval_unit: Option<String>,
    /// Whether the schedule is active.
    pub schedule_active: bool,
    /// Site-level summary.
    pub master_summary: Option<String>,
    /// Summarization key.
    pub api_key: Option<String>,
    /// Screenshot flag inherited by pages.
    pub capture_screenshot: bool,
    /// Registration instant.
    pub created_at: DateTime<Utc>,
}

impl From<&RootSite> for RootRow {
    fn from(root: &RootSite) -> Self {
        Self {
            root_key: root.key.to_string(),
            interval_value: root
                .schedule
                .map(|s| i32::try_from(s.interval_value()).unwrap_or(i32::MAX)),
            interval_unit: root.schedule.map(|s| s.interval_unit().as_str().to_string()),
            schedule_active: root.schedule.is_some_and(|s| s.is_active()),
            master_summary: root.master_summary.clone(),
            api_key: root.settings.api_key.as_ref().map(|k| k.expose().to_string()),
            capture_screenshot: root.settings.capture_screenshot,
            created_at: root.created_at,
        }
    }
}

impl TryFrom<RootRow> for RootSite {
    type Error = MonitorError;

    fn try_from(row: RootRow) -> Result<Self, Self::Error> {
        let schedule = match (row.interval_value, row.interval_unit) {
            (Some(value), Some(unit)) => {
                let value = u32::try_from(value).map_err(|_| {
                    MonitorError::PersistenceError(format!("negative interval for {}", row.root_key))
                })?;
                let unit: IntervalUnit = unit.parse()?;
                Some(Schedule::new(value, unit, row.schedule_active)?)
            }
            _ => None,
        };
        Ok(Self {
            key: RootKey::parse(&row.root_key)?,
            pages: Vec::new(),
            schedule,
            master_summary: row.master_summary,
            settings: SiteSettings {
                api_key: row.api_key.as_deref().and_then(ApiKey::new),
                capture_screenshot: row.capture_screenshot,
            },
            created_at: row.created_at,
        })
    }
}

/// A row from the `pages` table.
#[derive(Debug, Clone)]
pub struct PageRow {
    /// Page URL.
    pub url: String,
    /// Owning root key.
    pub root_key: String,
    /// Latest successful scrape.
    pub last_scraped: Option<DateTime<Utc>>,
    /// Latest summary.
    pub summary: Option<String>,
    /// Screenshot flag.
    pub capture_screenshot: bool,
    /// Summarization key.
    pub api_key: Option<String>,
    /// Registration instant.
    pub added_at: DateTime<Utc>,
}

impl From<&Page> for PageRow {
    fn from(page: &Page) -> Self {
        Self {
            url: page.url.to_string(),
            root_key: page.root.to_string(),
            last_scraped: page.last_scraped,
            summary: page.summary.clone(),
            capture_screenshot: page.capture_screenshot,
            api_key: page.api_key.as_ref().map(|k| k.expose().to_string()),
            added_at: page.added_at,
        }
    }
}

impl TryFrom<PageRow> for Page {
    type Error = MonitorError;

    fn try_from(row: PageRow) -> Result<Self, Self::Error> {
        Ok(Self {
            url: PageUrl::parse(&row.url)?,
            root: RootKey::parse(&row.root_key)?,
            last_scraped: row.last_scraped,
            summary: row.summary,
            capture_screenshot: row.capture_screenshot,
            api_key: row.api_key.as_deref().and_then(ApiKey::new),
            added_at: row.added_at,
        })
    }
}

/// A row from the `snapshots` table.
#[derive(Debug, Clone)]
pub struct SnapshotRow {
    /// Store sequence number, the primary key.
    pub seq: i64,
    /// Page URL.
    pub page_url: String,
    /// Root key at capture time.
    pub root_key: String,
    /// Capture instant.
    pub captured_at: DateTime<Utc>,
    /// `"success"` or `"failed"`.
    pub status: String,
    /// Error detail.
    pub error: Option<String>,
    /// Extracted text.
    pub content: Option<String>,
    /// Normalized content hash.
    pub content_hash: Option<String>,
    /// Summary.
    pub summary: Option<String>,
    /// Change flag.
    pub changed: bool,
    /// Attempt duration.
    pub duration_ms: i64,
    /// Response size.
    pub bytes_fetched: i64,
}

impl From<&Snapshot> for SnapshotRow {
    fn from(s: &Snapshot) -> Self {
        Self {
            seq: i64::try_from(s.seq).unwrap_or(i64::MAX),
            page_url: s.page_url.to_string(),
            root_key: s.root.to_string(),
            captured_at: s.captured_at,
            status: s.status.as_str().to_string(),
            error: s.error.clone(),
            content: s.content.clone(),
            content_hash: s.content_hash.clone(),
            summary: s.summary.clone(),
            changed: s.changed,
            duration_ms: i64::try_from(s.duration_ms).unwrap_or(i64::MAX),
            bytes_fetched: i64::try_from(s.bytes_fetched).unwrap_or(i64::MAX),
        }
    }
}

impl TryFrom<SnapshotRow> for Snapshot {
    type Error = MonitorError;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        let status = match row.status.as_str() {
            "success" => ScrapeStatus::Success,
            "failed" => ScrapeStatus::Failed,
            other => {
                return Err(MonitorError::PersistenceError(format!(
                    "unknown snapshot status '{other}'"
                )));
            }
        };
        let seq = u64::try_from(row.seq)
            .map_err(|_| MonitorError::PersistenceError(format!("negative seq {}", row.seq)))?;
        Ok(Self {
            seq,
            page_url: PageUrl::parse(&row.page_url)?,
            root: RootKey::parse(&row.root_key)?,
            captured_at: row.captured_at,
            status,
            error: row.error,
            content: row.content,
            content_hash: row.content_hash,
            summary: row.summary,
            changed: row.changed,
            duration_ms: u64::try_from(row.duration_ms).unwrap_or_default(),
            bytes_fetched: u64::try_from(row.bytes_fetched).unwrap_or_default(),
        })
    }
}

/// Everything loaded at startup.
#[derive(Debug, Default)]
pub struct PersistedState {
    /// Root sites, without page lists.
    pub roots: Vec<RootSite>,
    /// Pages.
    pub pages: Vec<Page>,
    /// Snapshots in ascending sequence order.
    pub snapshots: Vec<Snapshot>,
}
