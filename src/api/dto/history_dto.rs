//! Scrape, history and version-compare DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::{ScrapeStatus, Snapshot};
use crate::service::{ScrapeSummary, VersionComparison};

/// Response body for `POST /api/scrape`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScrapeResponse {
    /// Always `true`.
    pub success: bool,
    /// Human-readable totals.
    pub message: String,
    /// Crawl run identifier.
    pub run_id: Uuid,
    /// Pages captured.
    pub pages_scraped: usize,
    /// Pages whose attempts all failed.
    pub pages_failed: usize,
    /// Captured pages whose content changed.
    pub changes_detected: usize,
    /// Pages skipped because they were already being scraped.
    pub pages_skipped: usize,
}

impl From<ScrapeSummary> for ScrapeResponse {
    fn from(summary: ScrapeSummary) -> Self {
        Self {
            success: true,
            message: summary.message(),
            run_id: summary.run_id,
            pages_scraped: summary.pages_scraped,
            pages_failed: summary.pages_failed,
            changes_detected: summary.changes_detected,
            pages_skipped: summary.pages_skipped,
        }
    }
}

/// One entry of `GET /api/history/{url}`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HistoryEntryDto {
    /// Capture instant.
    pub scraped_at: DateTime<Utc>,
    /// Whether content changed since the previous successful capture.
    pub changed: bool,
    /// Summary, if one was produced.
    pub summary: Option<String>,
    /// `success` or `failed`.
    #[schema(value_type = String, example = "success")]
    pub status: ScrapeStatus,
    /// Error detail for failed attempts.
    pub error: Option<String>,
    /// Normalized content fingerprint.
    pub content_hash: Option<String>,
    /// Attempt duration.
    pub duration_ms: u64,
    /// Response size.
    pub bytes_fetched: u64,
}

impl From<&Snapshot> for HistoryEntryDto {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            scraped_at: snapshot.captured_at,
            changed: snapshot.changed,
            summary: snapshot.summary.clone(),
            status: snapshot.status,
            error: snapshot.error.clone(),
            content_hash: snapshot.content_hash.clone(),
            duration_ms: snapshot.duration_ms,
            bytes_fetched: snapshot.bytes_fetched,
        }
    }
}

/// Request body for `POST /api/diff`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct DiffRequest {
    /// Old text.
    #[serde(default)]
    pub text1: String,
    /// New text.
    #[serde(default)]
    pub text2: String,
}

/// One side of a version compare.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VersionDto {
    /// Capture instant.
    pub date: DateTime<Utc>,
    /// Extracted text.
    pub content: String,
    /// Summary, empty when none was produced.
    pub summary: String,
}

impl From<&Snapshot> for VersionDto {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            date: snapshot.captured_at,
            content: snapshot.content_str().to_string(),
            summary: snapshot.summary.clone().unwrap_or_default(),
        }
    }
}

/// Response body for `POST /api/compare-versions`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CompareVersionsResponse {
    /// Always `true`.
    pub success: bool,
    /// Page URL.
    pub url: String,
    /// Older version.
    pub old_version: VersionDto,
    /// Newer version.
    pub new_version: VersionDto,
    /// Whether normalized content differs.
    pub changed: bool,
    /// HTML diff table.
    pub diff_html: String,
}

impl From<VersionComparison> for CompareVersionsResponse {
    fn from(comparison: VersionComparison) -> Self {
        Self {
            success: true,
            url: comparison.url.to_string(),
            old_version: VersionDto::from(comparison.old.as_ref()),
            new_version: VersionDto::from(comparison.new.as_ref()),
            changed: comparison.changed,
            diff_html: comparison.diff_html,
        }
    }
}
