//! Append-only snapshot history with per-page locking.
//!
//! [`SnapshotStore`] keeps one history per page behind its own
//! [`tokio::sync::RwLock`]. `append` reads the prior fingerprint, computes
//! the changed flag and writes the new snapshot inside a single critical
//! section on that page, so appends to the same page are serialized while
//! different pages never contend. Readers take read locks page by page and
//! see an approximate point-in-time view.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::snapshot::{ScrapeOutcome, ScrapeStatus, Snapshot, SnapshotDraft};
use super::{PageUrl, RootKey};
use crate::diff::ChangeDetector;

#[derive(Debug, Default)]
struct PageHistory {
    root: Option<RootKey>,
    /// Ascending by `(captured_at, seq)`.
    entries: Vec<Arc<Snapshot>>,
    /// Fingerprint of the latest successful snapshot.
    last_fingerprint: Option<String>,
}

impl PageHistory {
    fn refresh_fingerprint(&mut self) {
        self.last_fingerprint = self
            .entries
            .iter()
            .rev()
            .find_map(|s| s.content_hash.clone());
    }
}

/// Store of every snapshot ever captured, keyed by page.
#[derive(Debug)]
pub struct SnapshotStore {
    pages: RwLock<HashMap<PageUrl, Arc<RwLock<PageHistory>>>>,
    next_seq: AtomicU64,
    detector: ChangeDetector,
}

impl SnapshotStore {
    /// Creates an empty store using `detector` for change flags.
    #[must_use]
    pub fn new(detector: ChangeDetector) -> Self {
        Self {
            pages: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(1),
            detector,
        }
    }

    /// Appends a snapshot for `url`.
    ///
    /// The changed flag compares the normalized content against the latest
    /// successful snapshot of the same page. The first capture and failed
    /// attempts are never flagged. The capture time is clamped so a page's
    /// history never goes backwards.
    pub async fn append(&self, url: &PageUrl, draft: SnapshotDraft) -> Arc<Snapshot> {
        // The outer read guard is held for the whole append so that a
        // concurrent delete cannot orphan the write.
        let map = self.pages.read().await;
        let existing = map.get(url).cloned();
        let (_map, page) = match existing {
            Some(page) => (map, page),
            None => {
                drop(map);
                let mut map = self.pages.write().await;
                let page = Arc::clone(map.entry(url.clone()).or_default());
                (map.downgrade(), page)
            }
        };

        let mut history = page.write().await;
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let captured_at = history
            .entries
            .last()
            .map_or(draft.captured_at, |last| last.captured_at.max(draft.captured_at));

        let snapshot = match draft.outcome {
            ScrapeOutcome::Succeeded {
                content,
                summary,
                bytes_fetched,
            } => {
                let fingerprint = self.detector.fingerprint(&content);
                let changed = history
                    .last_fingerprint
                    .as_ref()
                    .is_some_and(|previous| *previous != fingerprint);
                history.last_fingerprint = Some(fingerprint.clone());
                Snapshot {
                    seq,
                    page_url: url.clone(),
                    root: draft.root.clone(),
                    captured_at,
                    status: ScrapeStatus::Success,
                    error: None,
                    content: Some(content),
                    content_hash: Some(fingerprint),
                    summary,
                    changed,
                    duration_ms: draft.duration_ms,
                    bytes_fetched,
                }
            }
            ScrapeOutcome::Failed { error } => Snapshot {
                seq,
                page_url: url.clone(),
                root: draft.root.clone(),
                captured_at,
                status: ScrapeStatus::Failed,
                error: Some(error),
                content: None,
                content_hash: None,
                summary: None,
                changed: false,
                duration_ms: draft.duration_ms,
                bytes_fetched: 0,
            },
        };

        let snapshot = Arc::new(snapshot);
        history.root = Some(draft.root);
        history.entries.push(Arc::clone(&snapshot));
        tracing::debug!(
            url = %url,
            seq,
            status = %snapshot.status,
            changed = snapshot.changed,
            "snapshot appended"
        );
        snapshot
    }

    /// Latest snapshot of `url`, successful or not.
    pub async fn latest(&self, url: &PageUrl) -> Option<Arc<Snapshot>> {
        let page = self.page(url).await?;
        let history = page.read().await;
        history.entries.last().cloned()
    }

    /// History of `url`, most recent first, truncated to `limit` entries.
    pub async fn history(&self, url: &PageUrl, limit: Option<usize>) -> Vec<Arc<Snapshot>> {
        let Some(page) = self.page(url).await else {
            return Vec::new();
        };
        let history = page.read().await;
        history
            .entries
            .iter()
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// Up to `n` most recent successful snapshots of `url`, most recent first.
    pub async fn recent_successful(&self, url: &PageUrl, n: usize) -> Vec<Arc<Snapshot>> {
        let Some(page) = self.page(url).await else {
            return Vec::new();
        };
        let history = page.read().await;
        history
            .entries
            .iter()
            .rev()
            .filter(|s| s.is_success())
            .take(n)
            .cloned()
            .collect()
    }

    /// Every snapshot captured in `[start, end]`, across all pages.
    pub async fn snapshots_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<Arc<Snapshot>> {
        let pages: Vec<_> = self.pages.read().await.values().cloned().collect();
        let mut out = Vec::new();
        for page in pages {
            let history = page.read().await;
            out.extend(
                history
                    .entries
                    .iter()
                    .filter(|s| s.captured_at >= start && s.captured_at <= end)
                    .cloned(),
            );
        }
        out
    }

    /// Removes the history of `url`. Returns the number of snapshots
    /// removed; deleting an unknown page removes nothing.
    pub async fn delete_page(&self, url: &PageUrl) -> usize {
        let removed = self.pages.write().await.remove(url);
        match removed {
            Some(page) => page.read().await.entries.len(),
            None => 0,
        }
    }

    /// Removes the history of every page last captured under `root`.
    /// Returns the number of snapshots removed.
    pub async fn delete_root(&self, root: &RootKey) -> usize {
        let mut map = self.pages.write().await;
        let mut doomed = Vec::new();
        for (url, page) in map.iter() {
            if page.read().await.root.as_ref() == Some(root) {
                doomed.push(url.clone());
            }
        }
        let mut removed = 0;
        for url in doomed {
            if let Some(page) = map.remove(&url) {
                removed += page.read().await.entries.len();
            }
        }
        removed
    }

    /// Drops snapshots captured before `cutoff`, always keeping the latest
    /// snapshot of each page. Returns the number removed.
    pub async fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        let pages: Vec<_> = self.pages.read().await.values().cloned().collect();
        let mut removed = 0;
        for page in pages {
            let mut history = page.write().await;
            let keep_from = history
                .entries
                .iter()
                .position(|s| s.captured_at >= cutoff)
                .unwrap_or(history.entries.len())
                .min(history.entries.len().saturating_sub(1));
            if keep_from > 0 {
                history.entries.drain(..keep_from);
                history.refresh_fingerprint();
                removed += keep_from;
            }
        }
        removed
    }

    /// Reinserts a previously persisted snapshot.
    pub async fn restore(&self, snapshot: Snapshot) {
        self.next_seq.fetch_max(snapshot.seq + 1, Ordering::Relaxed);
        let page = {
            let mut map = self.pages.write().await;
            Arc::clone(map.entry(snapshot.page_url.clone()).or_default())
        };
        let mut history = page.write().await;
        history.root = Some(snapshot.root.clone());
        history.entries.push(Arc::new(snapshot));
        history
            .entries
            .sort_by(|a, b| (a.captured_at, a.seq).cmp(&(b.captured_at, b.seq)));
        history.refresh_fingerprint();
    }

    /// Number of pages with at least one snapshot.
    pub async fn page_count(&self) -> usize {
        self.pages.read().await.len()
    }

    async fn page(&self, url: &PageUrl) -> Option<Arc<RwLock<PageHistory>>> {
        self.pages.read().await.get(url).cloned()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(ChangeDetector::default())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn url(raw: &str) -> PageUrl {
        let Ok(url) = PageUrl::parse(raw) else {
            panic!("valid url");
        };
        url
    }

    fn ok(content: &str, at: DateTime<Utc>) -> SnapshotDraft {
        SnapshotDraft {
            root: RootKey::Uncategorized,
            captured_at: at,
            outcome: ScrapeOutcome::Succeeded {
                content: content.to_string(),
                summary: None,
                bytes_fetched: content.len() as u64,
            },
            duration_ms: 10,
        }
    }

    fn failed(at: DateTime<Utc>) -> SnapshotDraft {
        SnapshotDraft {
            root: RootKey::Uncategorized,
            captured_at: at,
            outcome: ScrapeOutcome::Failed {
                error: "connection refused".to_string(),
            },
            duration_ms: 10,
        }
    }

    #[tokio::test]
    async fn first_snapshot_is_unchanged_then_flags_follow_content() {
        let store = SnapshotStore::default();
        let page = url("https://example.com");
        let now = Utc::now();

        assert!(!store.append(&page, ok("v1", now)).await.changed);
        assert!(!store.append(&page, ok("v1", now)).await.changed);
        assert!(store.append(&page, ok("v2", now)).await.changed);
        assert!(!store.append(&page, ok("  v2 ", now)).await.changed);
    }

    #[tokio::test]
    async fn failed_attempts_are_unchanged_and_skipped_for_comparison() {
        let store = SnapshotStore::default();
        let page = url("https://example.com");
        let now = Utc::now();

        store.append(&page, ok("v1", now)).await;
        let failure = store.append(&page, failed(now)).await;
        assert!(!failure.changed);
        assert!(failure.content.is_none());
        assert!(!store.append(&page, ok("v1", now)).await.changed);
    }

    #[tokio::test]
    async fn history_is_most_recent_first_and_clamped() {
        let store = SnapshotStore::default();
        let page = url("https://example.com");
        let now = Utc::now();

        store.append(&page, ok("a", now)).await;
        // Clock went backwards: capture time is clamped to the prior one.
        store.append(&page, ok("b", now - Duration::minutes(5))).await;
        store.append(&page, ok("c", now + Duration::minutes(5))).await;

        let history = store.history(&page, None).await;
        assert_eq!(history.len(), 3);
        for pair in history.windows(2) {
            let [newer, older] = pair else {
                panic!("window of two");
            };
            assert!((newer.captured_at, newer.seq) > (older.captured_at, older.seq));
        }
        assert_eq!(store.history(&page, Some(1)).await.len(), 1);
        let Some(latest) = store.latest(&page).await else {
            panic!("latest exists");
        };
        assert_eq!(latest.content_str(), "c");
    }

    #[tokio::test]
    async fn concurrent_appends_are_serialized_per_page() {
        let store = Arc::new(SnapshotStore::default());
        let page = url("https://example.com/busy");
        let now = Utc::now();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            let page = page.clone();
            handles.push(tokio::spawn(async move {
                store.append(&page, ok(&format!("v{}", i % 2), now)).await
            }));
        }
        for handle in handles {
            let Ok(_) = handle.await else {
                panic!("append task panicked");
            };
        }

        let history = store.history(&page, None).await;
        assert_eq!(history.len(), 16);
        let mut seqs: Vec<u64> = history.iter().map(|s| s.seq).collect();
        seqs.dedup();
        assert_eq!(seqs.len(), 16);
        // Every flag must agree with the content of its predecessor.
        let ascending: Vec<_> = history.iter().rev().collect();
        for pair in ascending.windows(2) {
            let [prev, next] = pair else {
                panic!("window of two");
            };
            assert_eq!(next.changed, prev.content != next.content);
        }
    }

    #[tokio::test]
    async fn deletes_are_idempotent() {
        let store = SnapshotStore::default();
        let page = url("https://example.com");
        store.append(&page, ok("a", Utc::now())).await;

        assert_eq!(store.delete_page(&page).await, 1);
        assert_eq!(store.delete_page(&page).await, 0);
        assert_eq!(store.delete_root(&RootKey::Uncategorized).await, 0);
        assert!(store.latest(&page).await.is_none());
    }

    #[tokio::test]
    async fn delete_root_cascades_to_its_pages() {
        let store = SnapshotStore::default();
        let root = RootKey::Site(url("https://example.com"));
        let a = url("https://example.com/a");
        let b = url("https://other.com");
        let draft = SnapshotDraft {
            root: root.clone(),
            ..ok("x", Utc::now())
        };
        store.append(&a, draft).await;
        store.append(&b, ok("y", Utc::now())).await;

        assert_eq!(store.delete_root(&root).await, 1);
        assert!(store.latest(&a).await.is_none());
        assert!(store.latest(&b).await.is_some());
    }

    #[tokio::test]
    async fn prune_keeps_latest_per_page() {
        let store = SnapshotStore::default();
        let page = url("https://example.com");
        let old = Utc::now() - Duration::days(30);

        store.append(&page, ok("a", old)).await;
        store.append(&page, ok("b", old + Duration::hours(1))).await;

        assert_eq!(store.prune_before(Utc::now()).await, 1);
        assert_eq!(store.history(&page, None).await.len(), 1);
        assert!(!store.append(&page, ok("b", Utc::now())).await.changed);
    }

    #[tokio::test]
    async fn restore_keeps_sequence_monotonic() {
        let store = SnapshotStore::default();
        let page = url("https://example.com");
        let first = store.append(&page, ok("a", Utc::now())).await;

        let mut restored = (*first).clone();
        restored.seq = 41;
        store.restore(restored).await;

        let next = store.append(&page, ok("a", Utc::now())).await;
        assert_eq!(next.seq, 42);
        assert!(!next.changed);
    }
}
