//! Page, root-site and schedule DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

use crate::domain::{IntervalUnit, Page, RootGroup, Schedule};

/// Request body for `POST /api/pages`.
///
/// Field names follow the dashboard's form payload.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AddPageRequest {
    /// Root URL to monitor.
    #[serde(default)]
    pub url: String,
    /// Key forwarded to the summarizer.
    #[serde(rename = "apiKey", default)]
    pub api_key: Option<String>,
    /// Interval length; accepts a number or a numeric string.
    #[serde(
        rename = "intervalVal",
        default = "default_interval_value",
        deserialize_with = "lenient_u32"
    )]
    #[schema(value_type = u32, default = 60)]
    pub interval_value: u32,
    /// `minutes`, `hours` or `days`.
    #[serde(rename = "intervalUnit", default = "default_interval_unit")]
    pub interval_unit: String,
    /// Ask the fetcher to capture screenshots.
    #[serde(rename = "captureScreenshots", default)]
    pub capture_screenshots: bool,
}

const fn default_interval_value() -> u32 {
    60
}

fn default_interval_unit() -> String {
    "minutes".to_string()
}

/// HTML forms post numbers as strings.
fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u32),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Request body for `POST /api/schedule/toggle`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ToggleScheduleRequest {
    /// Root URL, or `"Uncategorized"`.
    #[serde(default)]
    pub root_url: String,
    /// Desired state.
    pub is_active: bool,
}

/// A root's schedule.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScheduleDto {
    /// Interval length.
    pub value: u32,
    /// Interval unit.
    #[schema(value_type = String, example = "hours")]
    pub unit: IntervalUnit,
    /// Whether scheduled scrapes run.
    pub active: bool,
}

impl From<Schedule> for ScheduleDto {
    fn from(schedule: Schedule) -> Self {
        Self {
            value: schedule.interval_value(),
            unit: schedule.interval_unit(),
            active: schedule.is_active(),
        }
    }
}

/// Response body for `POST /api/schedule/toggle`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ToggleScheduleResponse {
    /// Always `true`.
    pub success: bool,
    /// `Schedule activated.` or `Schedule paused.`
    pub message: String,
    /// The schedule after the toggle.
    pub schedule: ScheduleDto,
}

/// A page in the grouped listing.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PageDto {
    /// Page URL.
    pub url: String,
    /// Summary of the latest successful scrape.
    pub summary: Option<String>,
    /// Latest successful scrape.
    pub last_scraped: Option<DateTime<Utc>>,
}

impl From<Page> for PageDto {
    fn from(page: Page) -> Self {
        Self {
            url: page.url.to_string(),
            summary: page.summary,
            last_scraped: page.last_scraped,
        }
    }
}

/// One root in `GET /api/pages`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RootGroupDto {
    /// Pages in registration order.
    pub pages: Vec<PageDto>,
    /// Schedule, `null` when the root has none.
    pub schedule: Option<ScheduleDto>,
    /// Site-level summary.
    pub master_summary: Option<String>,
}

impl From<RootGroup> for RootGroupDto {
    fn from(group: RootGroup) -> Self {
        Self {
            pages: group.pages.into_iter().map(PageDto::from).collect(),
            schedule: group.schedule.map(ScheduleDto::from),
            master_summary: group.master_summary,
        }
    }
}
