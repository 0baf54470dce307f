//! Monitor service: the scrape-and-append path and every command.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use utoipa::ToSchema;
use uuid::Uuid;

use super::analytics::{AnalyticsAggregator, AnalyticsReport, AnalyticsWindow};
use crate::clock::Clock;
use crate::config::MonitorConfig;
use crate::diff::{ChangeDetector, HtmlOptions, NormalizationRules};
use crate::domain::{
    EventBus, IntervalUnit, MonitorEvent, Page, PageUrl, RootGroup, RootKey, RootSite, Schedule,
    ScrapeOutcome, SiteRegistry, SiteSettings, Snapshot, SnapshotDraft, SnapshotStore, ApiKey,
};
use crate::error::MonitorError;
use crate::fetch::{FetchRequest, FetchedPage, PageFetcher, Summarizer};
use crate::persistence::{PersistedState, PostgresPersistence};

/// Unchanged lines shown around each change in version compares.
const COMPARE_CONTEXT_LINES: usize = 3;

/// Tunables of the scrape path.
#[derive(Debug, Clone)]
pub struct MonitorPolicy {
    /// Fetch attempts before an attempt is recorded as failed.
    pub fetch_attempts: u32,
    /// Base backoff between attempts, multiplied by the attempt number.
    pub retry_backoff: Duration,
    /// Time box for one fetch attempt.
    pub fetch_timeout: Duration,
    /// Concurrently running page scrapes.
    pub max_concurrent_scrapes: usize,
    /// Pages a crawl may register under one root.
    pub max_pages_per_root: usize,
    /// Default history length.
    pub history_limit: usize,
    /// Entries in the analytics recent-changes feed.
    pub recent_changes_limit: usize,
    /// Offset used to bucket analytics days.
    pub analytics_utc_offset_minutes: i32,
    /// Content normalization before comparison.
    pub normalization: NormalizationRules,
    /// Snapshots older than this are pruned, latest per page excepted.
    pub snapshot_retention: Option<chrono::Duration>,
    /// Largest text accepted on either side of [`MonitorService::diff_texts`].
    pub max_diff_input_bytes: usize,
}

impl Default for MonitorPolicy {
    fn default() -> Self {
        Self::from(&MonitorConfig::default())
    }
}

impl From<&MonitorConfig> for MonitorPolicy {
    fn from(config: &MonitorConfig) -> Self {
        let retention_days = i64::try_from(config.snapshot_retention_days).unwrap_or(i64::MAX);
        Self {
            fetch_attempts: config.fetch_attempts.max(1),
            retry_backoff: Duration::from_millis(config.fetch_retry_backoff_ms),
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
            max_concurrent_scrapes: config.max_concurrent_scrapes.max(1),
            max_pages_per_root: config.max_pages_per_root.max(1),
            history_limit: config.history_limit.max(1),
            recent_changes_limit: config.recent_changes_limit,
            analytics_utc_offset_minutes: config.analytics_utc_offset_minutes,
            normalization: config.normalization(),
            snapshot_retention: (retention_days > 0)
                .then(|| chrono::Duration::try_days(retention_days))
                .flatten(),
            max_diff_input_bytes: config.max_diff_input_bytes.max(1),
        }
    }
}

/// Outcome of scraping one page.
#[derive(Debug, Clone)]
pub struct ScrapeReport {
    /// Snapshot written for the attempt.
    pub snapshot: Arc<Snapshot>,
    /// Links found on the page, unresolved.
    pub links: Vec<String>,
}

/// Totals of one crawl run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ScrapeSummary {
    /// Run identifier, shared by every snapshot event of the run.
    pub run_id: Uuid,
    /// Pages captured successfully.
    pub pages_scraped: usize,
    /// Pages whose attempts all failed.
    pub pages_failed: usize,
    /// Captured pages whose content changed.
    pub changes_detected: usize,
    /// Pages skipped because a scrape was already in flight.
    pub pages_skipped: usize,
}

impl ScrapeSummary {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            ..Self::default()
        }
    }

    fn record(&mut self, snapshot: &Snapshot) {
        if snapshot.is_success() {
            self.pages_scraped += 1;
            if snapshot.changed {
                self.changes_detected += 1;
            }
        } else {
            self.pages_failed += 1;
        }
    }

    /// Adds another run's totals.
    pub fn merge(&mut self, other: &Self) {
        self.pages_scraped += other.pages_scraped;
        self.pages_failed += other.pages_failed;
        self.changes_detected += other.changes_detected;
        self.pages_skipped += other.pages_skipped;
    }

    /// Human-readable status line.
    #[must_use]
    pub fn message(&self) -> String {
        let mut message = format!(
            "Scraped {} page{}, {} changed",
            self.pages_scraped,
            if self.pages_scraped == 1 { "" } else { "s" },
            self.changes_detected
        );
        if self.pages_failed > 0 {
            message.push_str(&format!(", {} failed", self.pages_failed));
        }
        if self.pages_skipped > 0 {
            message.push_str(&format!(", {} skipped (busy)", self.pages_skipped));
        }
        message
    }
}

/// Counts removed by a delete command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovalReport {
    /// Pages removed.
    pub pages_removed: usize,
    /// Snapshots removed.
    pub snapshots_removed: usize,
}

/// The two most recent successful versions of a page and their diff.
#[derive(Debug, Clone)]
pub struct VersionComparison {
    /// Page URL.
    pub url: PageUrl,
    /// Older snapshot.
    pub old: Arc<Snapshot>,
    /// Newer snapshot.
    pub new: Arc<Snapshot>,
    /// Whether normalized content differs.
    pub changed: bool,
    /// Rendered HTML diff table.
    pub diff_html: String,
}

/// How a crawl was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CrawlMode {
    /// Explicit request: a busy seed page fails the request.
    OnDemand,
    /// Scheduler tick: stops between waves once the schedule is paused.
    Scheduled,
}

/// Marks a page as being scraped until dropped.
#[derive(Debug)]
struct InFlightGuard {
    pages: Arc<Mutex<HashSet<PageUrl>>>,
    url: PageUrl,
}

impl InFlightGuard {
    fn acquire(pages: &Arc<Mutex<HashSet<PageUrl>>>, url: &PageUrl) -> Result<Self, MonitorError> {
        let mut in_flight = pages.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(url.clone()) {
            return Err(MonitorError::Busy(format!(
                "a scrape of {url} is already in progress"
            )));
        }
        Ok(Self {
            pages: Arc::clone(pages),
            url: url.clone(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.url);
    }
}

/// Orchestration layer for monitoring.
///
/// Owns the registry, the snapshot store and the collaborators. Every
/// scrape, scheduled or on demand, goes through [`MonitorService::scrape_page`]:
/// claim the page → fetch with retries → summarize → append → update the
/// registry → persist → emit events.
#[derive(Debug, Clone)]
pub struct MonitorService {
    registry: Arc<SiteRegistry>,
    store: Arc<SnapshotStore>,
    detector: ChangeDetector,
    analytics: AnalyticsAggregator,
    fetcher: Arc<dyn PageFetcher>,
    summarizer: Arc<dyn Summarizer>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    persistence: Option<PostgresPersistence>,
    in_flight: Arc<Mutex<HashSet<PageUrl>>>,
    permits: Arc<Semaphore>,
    policy: MonitorPolicy,
}

impl MonitorService {
    /// Creates a service with empty in-memory state.
    #[must_use]
    pub fn new(
        policy: MonitorPolicy,
        fetcher: Arc<dyn PageFetcher>,
        summarizer: Arc<dyn Summarizer>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
    ) -> Self {
        let detector = ChangeDetector::new(policy.normalization);
        Self {
            registry: Arc::new(SiteRegistry::new()),
            store: Arc::new(SnapshotStore::new(detector)),
            detector,
            analytics: AnalyticsAggregator::new(
                policy.analytics_utc_offset_minutes,
                policy.recent_changes_limit,
            ),
            fetcher,
            summarizer,
            clock,
            event_bus,
            persistence: None,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            permits: Arc::new(Semaphore::new(policy.max_concurrent_scrapes.max(1))),
            policy,
        }
    }

    /// Writes every mutation through to PostgreSQL.
    #[must_use]
    pub fn with_persistence(mut self, persistence: PostgresPersistence) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Loads previously persisted roots, pages and snapshots.
    pub async fn restore(&self, state: PersistedState) {
        let (roots, pages, snapshots) = (state.roots.len(), state.pages.len(), state.snapshots.len());
        for root in state.roots {
            self.registry.restore_root(root).await;
        }
        for page in state.pages {
            self.registry.restore_page(page).await;
        }
        for snapshot in state.snapshots {
            self.store.restore(snapshot).await;
        }
        tracing::info!(roots, pages, snapshots, "state restored");
    }

    /// Returns a reference to the inner [`EventBus`].
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Returns a reference to the inner [`SiteRegistry`].
    #[must_use]
    pub fn registry(&self) -> &Arc<SiteRegistry> {
        &self.registry
    }

    /// Returns a reference to the inner [`SnapshotStore`].
    #[must_use]
    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// Time source shared with the scheduler.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Active policy.
    #[must_use]
    pub fn policy(&self) -> &MonitorPolicy {
        &self.policy
    }

    // ----------------------------------------------------------------- //
    // Registry commands
    // ----------------------------------------------------------------- //

    /// Adds (or re-adds) a root site with an active schedule.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::InvalidInput`] for a malformed URL or a zero
    /// interval.
    pub async fn add_site(
        &self,
        raw_url: &str,
        api_key: Option<&str>,
        interval_value: u32,
        interval_unit: IntervalUnit,
        capture_screenshot: bool,
    ) -> Result<RootSite, MonitorError> {
        let key = RootKey::Site(PageUrl::parse(raw_url)?);
        let schedule = Schedule::new(interval_value, interval_unit, true)?;
        let settings = SiteSettings {
            api_key: api_key.and_then(ApiKey::new),
            capture_screenshot,
        };
        let root = self
            .registry
            .add_root(key.clone(), Some(schedule), settings, self.clock.now())
            .await;

        if let Some(db) = &self.persistence {
            warn_on_err(db.save_root(&root).await, "root");
        }
        let _ = self.event_bus.publish(MonitorEvent::RootAdded {
            root: key.clone(),
            interval_value,
            interval_unit,
            timestamp: self.clock.now(),
        });
        tracing::info!(root = %key, interval_value, %interval_unit, "root site added");
        Ok(root)
    }

    /// Registers a single page under its resolved root.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::InvalidInput`] for a malformed URL or a page
    /// outside the hinted root.
    pub async fn add_page(
        &self,
        url: PageUrl,
        root_hint: Option<RootKey>,
        schedule: Option<Schedule>,
    ) -> Result<Page, MonitorError> {
        let page = self
            .registry
            .add_page(url, root_hint, schedule, self.clock.now())
            .await?;
        if let Some(db) = &self.persistence {
            warn_on_err(db.save_page(&page).await, "page");
            if schedule.is_some()
                && let Some(root) = self.registry.root(&page.root).await
            {
                warn_on_err(db.save_root(&root).await, "root");
            }
        }
        Ok(page)
    }

    /// Removes a root with its pages and history. Unknown roots remove
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::InvalidInput`] for an empty or malformed root
    /// identifier.
    pub async fn remove_root(&self, raw_root: &str) -> Result<RemovalReport, MonitorError> {
        let key = RootKey::parse(raw_root)?;
        let Some(root) = self.registry.remove_root(&key).await else {
            tracing::debug!(root = %key, "remove of unknown root ignored");
            return Ok(RemovalReport::default());
        };

        let mut snapshots_removed = 0;
        for url in &root.pages {
            snapshots_removed += self.store.delete_page(url).await;
        }
        snapshots_removed += self.store.delete_root(&key).await;

        if let Some(db) = &self.persistence {
            warn_on_err(db.delete_root(&key).await, "root deletion");
        }
        let _ = self.event_bus.publish(MonitorEvent::RootRemoved {
            root: key.clone(),
            pages_removed: root.pages.len(),
            snapshots_removed,
            timestamp: self.clock.now(),
        });
        tracing::info!(root = %key, pages = root.pages.len(), snapshots_removed, "root site removed");
        Ok(RemovalReport {
            pages_removed: root.pages.len(),
            snapshots_removed,
        })
    }

    /// Removes one page and its history. Unknown pages remove nothing.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::InvalidInput`] for a malformed URL.
    pub async fn remove_page(&self, raw_url: &str) -> Result<RemovalReport, MonitorError> {
        let url = PageUrl::parse(raw_url)?;
        let page = self.registry.remove_page(&url).await;
        let snapshots_removed = self.store.delete_page(&url).await;
        let Some(page) = page else {
            return Ok(RemovalReport {
                pages_removed: 0,
                snapshots_removed,
            });
        };

        if let Some(db) = &self.persistence {
            warn_on_err(db.delete_page(&url).await, "page deletion");
        }
        let _ = self.event_bus.publish(MonitorEvent::PageRemoved {
            page_url: url.clone(),
            root: page.root,
            snapshots_removed,
            timestamp: self.clock.now(),
        });
        tracing::info!(%url, snapshots_removed, "page removed");
        Ok(RemovalReport {
            pages_removed: 1,
            snapshots_removed,
        })
    }

    /// Pauses or resumes a root's schedule.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::NotFound`] if the root has no schedule and
    /// [`MonitorError::InvalidInput`] for a malformed identifier.
    pub async fn set_schedule_active(
        &self,
        raw_root: &str,
        active: bool,
    ) -> Result<Schedule, MonitorError> {
        let key = RootKey::parse(raw_root)?;
        let schedule = self.registry.set_schedule_active(&key, active).await?;

        if let Some(db) = &self.persistence
            && let Some(root) = self.registry.root(&key).await
        {
            warn_on_err(db.save_root(&root).await, "root");
        }
        let _ = self.event_bus.publish(MonitorEvent::ScheduleToggled {
            root: key.clone(),
            active,
            timestamp: self.clock.now(),
        });
        tracing::info!(root = %key, active, "schedule toggled");
        Ok(schedule)
    }

    /// Every root with its pages and schedule.
    pub async fn grouped_pages(&self) -> Vec<RootGroup> {
        self.registry.list_grouped().await
    }

    // ----------------------------------------------------------------- //
    // Scraping
    // ----------------------------------------------------------------- //

    /// Scrapes `raw_url` now, registering it if needed, then crawls links
    /// discovered under its root.
    ///
    /// The crawl runs on its own task, so dropping the returned future
    /// never interrupts a scrape between fetch and append.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::InvalidInput`] for a malformed URL and
    /// [`MonitorError::Busy`] if the page is already being scraped.
    pub async fn scrape_now(&self, raw_url: &str) -> Result<ScrapeSummary, MonitorError> {
        let url = PageUrl::parse(raw_url)?;
        let service = self.clone();
        tokio::spawn(async move {
            let page = match service.registry.page(&url).await {
                Some(page) => page,
                None => service.add_page(url, None, None).await?,
            };
            let root = page.root.clone();
            service.crawl(root, vec![page], CrawlMode::OnDemand).await
        })
        .await
        .map_err(|e| MonitorError::Internal(format!("scrape task failed: {e}")))?
    }

    /// Scheduled run of one root: the root URL itself, every registered
    /// page, then newly discovered links.
    /// A root removed before the run starts is left alone.
    pub async fn run_scheduled(&self, root: &RootKey) -> ScrapeSummary {
        if let Some(site) = root.site() {
            if let Err(e) = self.add_page(site.clone(), Some(root.clone()), None).await {
                tracing::info!(root = %root, error = %e, "root unavailable, scheduled run skipped");
                return ScrapeSummary::default();
            }
        }
        let seeds = self.registry.pages_of(root).await;
        match self.crawl(root.clone(), seeds, CrawlMode::Scheduled).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(root = %root, error = %e, "scheduled crawl aborted");
                ScrapeSummary::default()
            }
        }
    }

    async fn crawl(
        &self,
        root: RootKey,
        seeds: Vec<Page>,
        mode: CrawlMode,
    ) -> Result<ScrapeSummary, MonitorError> {
        let run_id = Uuid::new_v4();
        let mut summary = ScrapeSummary::new(run_id);
        let mut visited: HashSet<PageUrl> = seeds.iter().map(|p| p.url.clone()).collect();
        let mut wave = seeds;
        let mut depth = 0usize;

        tracing::info!(%root, %run_id, pages = wave.len(), ?mode, "crawl started");
        while !wave.is_empty() {
            if self.registry.root(&root).await.is_none() {
                tracing::info!(%root, %run_id, "root removed, crawl stopped");
                break;
            }
            if mode == CrawlMode::Scheduled
                && !self
                    .registry
                    .schedule(&root)
                    .await
                    .is_some_and(|s| s.is_active())
            {
                tracing::info!(%root, %run_id, "schedule paused, crawl stopped");
                break;
            }

            let results = join_all(wave.iter().map(|page| self.scrape_page(page, run_id))).await;
            let mut next = Vec::new();
            for (page, result) in wave.iter().zip(results) {
                match result {
                    Ok(report) => {
                        summary.record(&report.snapshot);
                        self.discover(&root, page, &report.links, &mut visited, &mut next)
                            .await;
                    }
                    Err(MonitorError::Busy(message)) => {
                        if mode == CrawlMode::OnDemand && depth == 0 {
                            return Err(MonitorError::Busy(message));
                        }
                        tracing::debug!(url = %page.url, "page busy, skipped");
                        summary.pages_skipped += 1;
                    }
                    Err(e) => {
                        tracing::warn!(url = %page.url, error = %e, "scrape failed");
                        summary.pages_failed += 1;
                    }
                }
            }
            wave = next;
            depth += 1;
        }

        if summary.pages_scraped > 0 && root.site().is_some() {
            self.refresh_master_summary(&root).await;
        }
        tracing::info!(
            %root,
            %run_id,
            scraped = summary.pages_scraped,
            failed = summary.pages_failed,
            changed = summary.changes_detected,
            skipped = summary.pages_skipped,
            "crawl finished"
        );
        Ok(summary)
    }

    /// Registers in-scope links of `page` and queues them for the next wave.
    async fn discover(
        &self,
        root: &RootKey,
        page: &Page,
        links: &[String],
        visited: &mut HashSet<PageUrl>,
        next: &mut Vec<Page>,
    ) {
        let Some(site) = root.site() else {
            return;
        };
        for href in links {
            let Some(link) = page.url.join(href) else {
                continue;
            };
            if !link.is_within(site) || visited.contains(&link) {
                continue;
            }
            let known = self.registry.page(&link).await;
            let candidate = match known {
                Some(known) if known.root == *root => known,
                Some(_) => continue,
                None => {
                    if self.registry.page_count(root).await >= self.policy.max_pages_per_root {
                        continue;
                    }
                    match self.add_page(link.clone(), Some(root.clone()), None).await {
                        Ok(page) => {
                            tracing::debug!(url = %link, %root, "sub-page discovered");
                            page
                        }
                        Err(e) => {
                            tracing::debug!(url = %link, error = %e, "sub-page rejected");
                            continue;
                        }
                    }
                }
            };
            visited.insert(link);
            next.push(candidate);
        }
    }

    /// The single per-page scrape-and-append path.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Busy`] if the page is already being scraped,
    /// [`MonitorError::NotFound`] if it was removed mid-scrape. Fetch
    /// failures are not errors: they are recorded as failed snapshots.
    pub async fn scrape_page(&self, page: &Page, run_id: Uuid) -> Result<ScrapeReport, MonitorError> {
        let _claim = InFlightGuard::acquire(&self.in_flight, &page.url)?;
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| MonitorError::Internal("scrape pool closed".to_string()))?;

        let started = Instant::now();
        let request = FetchRequest {
            url: page.url.clone(),
            capture_screenshot: page.capture_screenshot,
        };
        let fetched = self.fetch_with_retry(&request).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (outcome, links) = match fetched {
            Ok(FetchedPage {
                text,
                bytes_fetched,
                links,
                ..
            }) => {
                let summary = match self.summarizer.summarize(&text, page.api_key.as_ref()).await {
                    Ok(summary) => Some(summary),
                    Err(e) => {
                        tracing::warn!(url = %page.url, error = %e, "summarizer unavailable, continuing without summary");
                        None
                    }
                };
                let outcome = ScrapeOutcome::Succeeded {
                    content: text,
                    summary,
                    bytes_fetched,
                };
                (outcome, links)
            }
            Err(e) => (
                ScrapeOutcome::Failed {
                    error: e.to_string(),
                },
                Vec::new(),
            ),
        };

        if self.registry.page(&page.url).await.is_none() {
            return Err(MonitorError::NotFound(format!(
                "{} was removed during the scrape",
                page.url
            )));
        }
        let draft = SnapshotDraft {
            root: page.root.clone(),
            captured_at: self.clock.now(),
            outcome,
            duration_ms,
        };
        let snapshot = self.store.append(&page.url, draft).await;
        if self.registry.page(&page.url).await.is_none() {
            self.store.delete_page(&page.url).await;
            return Err(MonitorError::NotFound(format!(
                "{} was removed during the scrape",
                page.url
            )));
        }

        let updated = if snapshot.is_success() {
            self.registry
                .record_success(&page.url, snapshot.captured_at, snapshot.summary.clone())
                .await
        } else {
            None
        };
        if let Some(db) = &self.persistence {
            warn_on_err(db.save_snapshot(&snapshot).await, "snapshot");
            if let Some(updated) = &updated {
                warn_on_err(db.save_page(updated).await, "page");
            }
        }

        let _ = self.event_bus.publish(MonitorEvent::SnapshotRecorded {
            page_url: page.url.clone(),
            root: page.root.clone(),
            seq: snapshot.seq,
            status: snapshot.status,
            changed: snapshot.changed,
            run_id,
            timestamp: self.clock.now(),
        });
        tracing::info!(
            url = %page.url,
            seq = snapshot.seq,
            status = %snapshot.status,
            changed = snapshot.changed,
            duration_ms,
            "page scraped"
        );
        Ok(ScrapeReport { snapshot, links })
    }

    async fn fetch_with_retry(&self, request: &FetchRequest) -> Result<FetchedPage, MonitorError> {
        let attempts = self.policy.fetch_attempts.max(1);
        let mut last_error = MonitorError::FetchFailure(format!("{}: not attempted", request.url));
        for attempt in 1..=attempts {
            match tokio::time::timeout(self.policy.fetch_timeout, self.fetcher.fetch(request)).await {
                Ok(Ok(page)) => return Ok(page),
                Ok(Err(e)) => last_error = e,
                Err(_) => {
                    last_error = MonitorError::FetchFailure(format!(
                        "{}: timed out after {:?}",
                        request.url, self.policy.fetch_timeout
                    ));
                }
            }
            if attempt < attempts {
                tracing::warn!(url = %request.url, attempt, error = %last_error, "fetch failed, retrying");
                tokio::time::sleep(self.policy.retry_backoff * attempt).await;
            }
        }
        Err(last_error)
    }

    async fn refresh_master_summary(&self, root: &RootKey) {
        let Some(site) = self.registry.root(root).await else {
            return;
        };
        let summaries: Vec<String> = self
            .registry
            .pages_of(root)
            .await
            .into_iter()
            .filter_map(|page| page.summary)
            .collect();
        if summaries.is_empty() {
            return;
        }
        match self
            .summarizer
            .summarize_site(&summaries, site.settings.api_key.as_ref())
            .await
        {
            Ok(summary) => {
                self.registry.set_master_summary(root, summary).await;
                if let Some(db) = &self.persistence
                    && let Some(updated) = self.registry.root(root).await
                {
                    warn_on_err(db.save_root(&updated).await, "root");
                }
            }
            Err(e) => tracing::debug!(%root, error = %e, "master summary unavailable"),
        }
    }

    // ----------------------------------------------------------------- //
    // Queries
    // ----------------------------------------------------------------- //

    /// History of a page, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::InvalidInput`] for a malformed URL and
    /// [`MonitorError::NotFound`] for a page with neither registration
    /// nor history.
    pub async fn history(
        &self,
        raw_url: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Arc<Snapshot>>, MonitorError> {
        let url = PageUrl::parse(raw_url)?;
        let limit = limit.unwrap_or(self.policy.history_limit).max(1);
        let history = self.store.history(&url, Some(limit)).await;
        if history.is_empty() && self.registry.page(&url).await.is_none() {
            return Err(MonitorError::NotFound(format!("page {url} is not monitored")));
        }
        Ok(history)
    }

    /// Diffs the two most recent successful snapshots of a page.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::InsufficientHistory`] with fewer than two
    /// successful snapshots.
    pub async fn compare_versions(&self, raw_url: &str) -> Result<VersionComparison, MonitorError> {
        let url = PageUrl::parse(raw_url)?;
        let recent = self.store.recent_successful(&url, 2).await;
        let [new, old] = recent.as_slice() else {
            return Err(MonitorError::InsufficientHistory {
                url: url.to_string(),
                available: recent.len(),
            });
        };

        let comparison = self.detector.compare(Some(old.content_str()), new.content_str());
        let options = HtmlOptions {
            context: Some(COMPARE_CONTEXT_LINES),
            from_label: Some(format!("Version from {}", old.captured_at.format("%Y-%m-%d %H:%M:%S"))),
            to_label: Some(format!("Current version from {}", new.captured_at.format("%Y-%m-%d %H:%M:%S"))),
        };
        let diff_html = comparison
            .diff
            .map(|diff| diff.to_html(&options))
            .unwrap_or_default();

        Ok(VersionComparison {
            url,
            old: Arc::clone(old),
            new: Arc::clone(new),
            changed: comparison.changed,
            diff_html,
        })
    }

    /// Stateless diff of two texts as an HTML table.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::InvalidInput`] if either text is larger than
    /// the configured limit.
    pub fn diff_texts(&self, old: &str, new: &str) -> Result<String, MonitorError> {
        let limit = self.policy.max_diff_input_bytes;
        if old.len() > limit || new.len() > limit {
            return Err(MonitorError::InvalidInput(format!(
                "diff input exceeds {limit} bytes"
            )));
        }
        Ok(self.detector.diff_html(old, new))
    }

    /// Analytics for a window token such as `24h` or `7d`.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::InvalidInput`] for a malformed token.
    pub async fn analytics(&self, window_token: &str) -> Result<AnalyticsReport, MonitorError> {
        let window: AnalyticsWindow = window_token.parse()?;
        let now = self.clock.now();
        let roots = self.registry.overview().await;
        let snapshots = self.store.snapshots_between(now - window.duration(), now).await;
        Ok(self.analytics.compute(window, now, &roots, &snapshots))
    }

    /// Applies the retention policy. Returns the number of in-memory
    /// snapshots removed.
    pub async fn prune_snapshots(&self) -> usize {
        let Some(retention) = self.policy.snapshot_retention else {
            return 0;
        };
        let cutoff = self.clock.now() - retention;
        let removed = self.store.prune_before(cutoff).await;
        if let Some(db) = &self.persistence {
            warn_on_err(db.delete_snapshots_before(cutoff).await, "snapshot pruning");
        }
        tracing::info!(removed, %cutoff, "snapshots pruned");
        removed
    }
}

/// Persistence is write-through and best effort: failures are logged and
/// the in-memory state stays authoritative.
fn warn_on_err<T>(result: Result<T, MonitorError>, what: &str) {
    if let Err(e) = result {
        tracing::warn!(error = %e, "failed to persist {what}");
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::fetch::PreviewSummarizer;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;

    /// Serves canned bodies; unknown URLs fail.
    #[derive(Debug, Default)]
    struct CannedFetcher {
        pages: Mutex<HashMap<String, (String, Vec<String>)>>,
    }

    impl CannedFetcher {
        fn set(&self, url: &str, text: &str, links: &[&str]) {
            self.pages.lock().unwrap_or_else(PoisonError::into_inner).insert(
                url.to_string(),
                (text.to_string(), links.iter().map(|l| (*l).to_string()).collect()),
            );
        }
    }

    #[async_trait]
    impl PageFetcher for CannedFetcher {
        async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPage, MonitorError> {
            let pages = self.pages.lock().unwrap_or_else(PoisonError::into_inner);
            let Some((text, links)) = pages.get(request.url.as_str()) else {
                return Err(MonitorError::FetchFailure(format!("{}: 404", request.url)));
            };
            Ok(FetchedPage {
                text: text.clone(),
                content_type: Some("text/html".to_string()),
                bytes_fetched: text.len() as u64,
                links: links.clone(),
            })
        }
    }

    fn service(fetcher: &Arc<CannedFetcher>) -> MonitorService {
        let policy = MonitorPolicy {
            fetch_attempts: 2,
            retry_backoff: Duration::ZERO,
            max_pages_per_root: 3,
            ..MonitorPolicy::default()
        };
        MonitorService::new(
            policy,
            Arc::clone(fetcher) as Arc<dyn PageFetcher>,
            Arc::new(PreviewSummarizer),
            Arc::new(ManualClock::new(Utc::now())),
            EventBus::new(64),
        )
    }

    #[tokio::test]
    async fn on_demand_scrape_registers_and_flags_changes() {
        let fetcher = Arc::new(CannedFetcher::default());
        fetcher.set("https://example.com", "Hello", &[]);
        let svc = service(&fetcher);

        let Ok(first) = svc.scrape_now("https://example.com/").await else {
            panic!("scrape succeeds");
        };
        assert_eq!(first.pages_scraped, 1);
        assert_eq!(first.changes_detected, 0);

        fetcher.set("https://example.com", "Hello world", &[]);
        let Ok(second) = svc.scrape_now("https://example.com").await else {
            panic!("scrape succeeds");
        };
        assert_eq!(second.changes_detected, 1);

        let Ok(history) = svc.history("https://example.com", None).await else {
            panic!("history exists");
        };
        assert_eq!(history.len(), 2);
        assert!(history.first().is_some_and(|s| s.changed));
    }

    #[tokio::test]
    async fn failed_fetch_is_recorded_not_raised() {
        let fetcher = Arc::new(CannedFetcher::default());
        let svc = service(&fetcher);

        let Ok(summary) = svc.scrape_now("https://down.example").await else {
            panic!("failure is recorded, not raised");
        };
        assert_eq!(summary.pages_failed, 1);

        let Ok(history) = svc.history("https://down.example", None).await else {
            panic!("history exists");
        };
        let Some(latest) = history.first() else {
            panic!("one snapshot");
        };
        assert!(!latest.is_success());
        assert!(latest.error.as_deref().is_some_and(|e| e.contains("404")));

        let Some(page) = svc.registry().page(&latest.page_url).await else {
            panic!("page registered");
        };
        assert!(page.last_scraped.is_none());
    }

    #[tokio::test]
    async fn crawl_discovers_sub_pages_up_to_cap() {
        let fetcher = Arc::new(CannedFetcher::default());
        fetcher.set(
            "https://example.com",
            "home",
            &["/a", "/b", "/c", "/d", "https://other.com/x", "mailto:x@y.z"],
        );
        for path in ["a", "b", "c", "d"] {
            fetcher.set(&format!("https://example.com/{path}"), path, &["/"]);
        }
        let svc = service(&fetcher);
        let Ok(_) = svc
            .add_site("https://example.com", None, 1, IntervalUnit::Hours, false)
            .await
        else {
            panic!("root added");
        };

        let Ok(summary) = svc.scrape_now("https://example.com").await else {
            panic!("crawl succeeds");
        };
        // Root page plus two discovered pages fill the cap of three.
        assert_eq!(summary.pages_scraped, 3);
        let groups = svc.grouped_pages().await;
        let Some(group) = groups.first() else {
            panic!("one root");
        };
        assert_eq!(group.pages.len(), 3);
        assert!(svc.registry().page(&PageUrl::parse("https://other.com/x").unwrap_or_else(|_| panic!())).await.is_none());
    }

    #[tokio::test]
    async fn compare_needs_two_successful_versions() {
        let fetcher = Arc::new(CannedFetcher::default());
        fetcher.set("https://example.com", "Price: 10", &[]);
        let svc = service(&fetcher);

        let result = svc.compare_versions("https://example.com").await;
        assert!(matches!(
            result,
            Err(MonitorError::InsufficientHistory { available: 0, .. })
        ));

        let _ = svc.scrape_now("https://example.com").await;
        let result = svc.compare_versions("https://example.com").await;
        assert!(matches!(
            result,
            Err(MonitorError::InsufficientHistory { available: 1, .. })
        ));

        fetcher.set("https://example.com", "Price: 12", &[]);
        let _ = svc.scrape_now("https://example.com").await;
        let Ok(comparison) = svc.compare_versions("https://example.com").await else {
            panic!("two versions");
        };
        assert!(comparison.changed);
        assert!(comparison.old.seq < comparison.new.seq);
        assert!(comparison.diff_html.contains("diff_chg"));
    }

    #[tokio::test]
    async fn concurrent_scrape_of_same_page_is_busy() {
        let fetcher = Arc::new(CannedFetcher::default());
        let svc = service(&fetcher);
        let url = PageUrl::parse("https://example.com").unwrap_or_else(|_| panic!());
        let _claim = InFlightGuard::acquire(&svc.in_flight, &url);

        let result = svc.scrape_now("https://example.com").await;
        assert!(matches!(result, Err(MonitorError::Busy(_))));
        assert!(svc.store().latest(&url).await.is_none());
    }

    #[tokio::test]
    async fn remove_root_cascades_to_history() {
        let fetcher = Arc::new(CannedFetcher::default());
        fetcher.set("https://example.com", "x", &[]);
        let svc = service(&fetcher);
        let _ = svc
            .add_site("https://example.com", None, 1, IntervalUnit::Hours, false)
            .await;
        let _ = svc.scrape_now("https://example.com").await;

        let Ok(report) = svc.remove_root("https://example.com").await else {
            panic!("removal succeeds");
        };
        assert_eq!(report.pages_removed, 1);
        assert_eq!(report.snapshots_removed, 1);

        let Ok(again) = svc.remove_root("https://example.com").await else {
            panic!("second removal succeeds");
        };
        assert_eq!(again, RemovalReport::default());
        assert!(svc.history("https://example.com", None).await.is_err());
    }

    #[tokio::test]
    async fn events_carry_the_injected_clock_time() {
        let fetcher = Arc::new(CannedFetcher::default());
        fetcher.set("https://example.com", "Hello", &[]);
        let svc = service(&fetcher);
        let mut events = svc.event_bus().subscribe();
        let _ = svc
            .add_site("https://example.com", None, 1, IntervalUnit::Hours, false)
            .await;
        let _ = svc.scrape_now("https://example.com").await;
        let now = svc.clock().now();

        let Ok(MonitorEvent::RootAdded { timestamp, .. }) = events.try_recv() else {
            panic!("root added first");
        };
        assert_eq!(timestamp, now);
        let Ok(MonitorEvent::SnapshotRecorded { timestamp, .. }) = events.try_recv() else {
            panic!("snapshot recorded next");
        };
        assert_eq!(timestamp, now);
    }

    #[test]
    fn oversized_diff_input_is_rejected() {
        let fetcher = Arc::new(CannedFetcher::default());
        let svc = MonitorService::new(
            MonitorPolicy {
                max_diff_input_bytes: 8,
                ..MonitorPolicy::default()
            },
            Arc::clone(&fetcher) as Arc<dyn PageFetcher>,
            Arc::new(PreviewSummarizer),
            Arc::new(ManualClock::new(Utc::now())),
            EventBus::new(8),
        );
        assert!(svc.diff_texts("short", "also ok").is_ok());
        assert!(matches!(
            svc.diff_texts("short", "far too long"),
            Err(MonitorError::InvalidInput(_))
        ));
    }

    #[test]
    fn summary_message_mentions_failures() {
        let summary = ScrapeSummary {
            pages_scraped: 1,
            pages_failed: 2,
            ..ScrapeSummary::default()
        };
        assert_eq!(summary.message(), "Scraped 1 page, 0 changed, 2 failed");
    }
}
