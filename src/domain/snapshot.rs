//! Immutable page content snapshots.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PageUrl, RootKey};

/// Outcome of a scrape attempt as recorded in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeStatus {
    /// Content was captured.
    Success,
    /// The fetch failed after all retries; no content was captured.
    Failed,
}

impl ScrapeStatus {
    /// Returns the status as a static string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ScrapeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a scrape attempt produced, before it becomes a [`Snapshot`].
#[derive(Debug, Clone)]
pub enum ScrapeOutcome {
    /// Content was fetched and extracted.
    Succeeded {
        /// Extracted page text.
        content: String,
        /// Summary from the summarization collaborator, if it answered.
        summary: Option<String>,
        /// Raw response size.
        bytes_fetched: u64,
    },
    /// Every fetch attempt failed.
    Failed {
        /// Last error observed.
        error: String,
    },
}

/// Input to [`super::SnapshotStore::append`].
#[derive(Debug, Clone)]
pub struct SnapshotDraft {
    /// Root the page belongs to.
    pub root: RootKey,
    /// Requested capture instant; clamped so history never goes backwards.
    pub captured_at: DateTime<Utc>,
    /// Scrape result.
    pub outcome: ScrapeOutcome,
    /// Wall time spent on the attempt, including retries.
    pub duration_ms: u64,
}

/// One immutable captured observation of a page.
///
/// Identity is `(page_url, captured_at)`, with `seq` breaking ties between
/// identical capture instants. Never mutated after the store writes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Store-wide monotonic insertion sequence number.
    pub seq: u64,
    /// Page this snapshot belongs to.
    pub page_url: PageUrl,
    /// Root the page belonged to when captured.
    pub root: RootKey,
    /// Capture instant.
    pub captured_at: DateTime<Utc>,
    /// Scrape outcome.
    pub status: ScrapeStatus,
    /// Error detail for failed attempts.
    pub error: Option<String>,
    /// Extracted text, absent for failed attempts.
    pub content: Option<String>,
    /// SHA-256 of the normalized content, absent for failed attempts.
    pub content_hash: Option<String>,
    /// Summary of the content, absent when summarization was unavailable.
    pub summary: Option<String>,
    /// Whether the content differs from the previous successful snapshot.
    pub changed: bool,
    /// Wall time spent on the attempt.
    pub duration_ms: u64,
    /// Raw response size.
    pub bytes_fetched: u64,
}

impl Snapshot {
    /// Returns `true` when content was captured.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ScrapeStatus::Success
    }

    /// Content as a string slice, empty for failed attempts.
    #[must_use]
    pub fn content_str(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}
