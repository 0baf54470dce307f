//! Monitored pages grouped under root sites.
//!
//! [`SiteRegistry`] owns the page-to-root assignment and the single
//! optional [`Schedule`] of each root. Every page belongs to exactly one
//! root; pages that match no registered root land in
//! [`RootKey::Uncategorized`], which only exists while it has pages or an
//! explicitly assigned schedule.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{PageUrl, RootKey, Schedule};
use crate::error::MonitorError;

/// Credential forwarded to the summarization collaborator.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wraps a key; blank input yields `None`.
    #[must_use]
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    /// The raw key.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Per-root settings inherited by every page of the root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteSettings {
    /// Key for summarization calls.
    pub api_key: Option<ApiKey>,
    /// Ask the fetcher to capture screenshots.
    pub capture_screenshot: bool,
}

/// A monitored page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Normalized URL, the page identity.
    pub url: PageUrl,
    /// Root the page is grouped under.
    pub root: RootKey,
    /// Instant of the latest successful scrape.
    pub last_scraped: Option<DateTime<Utc>>,
    /// Summary of the latest successful scrape.
    pub summary: Option<String>,
    /// Ask the fetcher to capture screenshots.
    pub capture_screenshot: bool,
    /// Key for summarization calls.
    pub api_key: Option<ApiKey>,
    /// Registration instant.
    pub added_at: DateTime<Utc>,
}

/// A root site and its pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootSite {
    /// Grouping key.
    pub key: RootKey,
    /// Pages in registration order.
    pub pages: Vec<PageUrl>,
    /// Re-scrape schedule, if any.
    pub schedule: Option<Schedule>,
    /// Site-level synthesis of page summaries.
    pub master_summary: Option<String>,
    /// Settings inherited by pages.
    pub settings: SiteSettings,
    /// Registration instant.
    pub created_at: DateTime<Utc>,
}

impl RootSite {
    fn new(key: RootKey, created_at: DateTime<Utc>) -> Self {
        Self {
            key,
            pages: Vec::new(),
            schedule: None,
            master_summary: None,
            settings: SiteSettings::default(),
            created_at,
        }
    }
}

/// Read model of one root for the grouped-pages query.
#[derive(Debug, Clone)]
pub struct RootGroup {
    /// Grouping key.
    pub key: RootKey,
    /// Pages in registration order.
    pub pages: Vec<Page>,
    /// Re-scrape schedule, if any.
    pub schedule: Option<Schedule>,
    /// Site-level summary.
    pub master_summary: Option<String>,
}

/// Per-root counts used by analytics.
#[derive(Debug, Clone)]
pub struct RootOverview {
    /// Grouping key.
    pub key: RootKey,
    /// Number of registered pages.
    pub total_pages: usize,
    /// Latest successful scrape across the root's pages.
    pub last_scraped: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct RegistryState {
    roots: BTreeMap<RootKey, RootSite>,
    pages: HashMap<PageUrl, Page>,
}

impl RegistryState {
    /// Longest registered site root containing `url`.
    fn resolve_root(&self, url: &PageUrl) -> RootKey {
        self.roots
            .keys()
            .filter_map(RootKey::site)
            .filter(|root| url.is_within(root))
            .max_by_key(|root| root.as_str().len())
            .map_or(RootKey::Uncategorized, |root| RootKey::Site(root.clone()))
    }

    fn drop_empty_uncategorized(&mut self) {
        if self
            .roots
            .get(&RootKey::Uncategorized)
            .is_some_and(|root| root.pages.is_empty() && root.schedule.is_none())
        {
            self.roots.remove(&RootKey::Uncategorized);
        }
    }
}

/// Registry of root sites and their pages.
#[derive(Debug, Default)]
pub struct SiteRegistry {
    state: RwLock<RegistryState>,
}

impl SiteRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a root site, or updates an existing one.
    ///
    /// Re-adding a root replaces its schedule and settings and keeps its
    /// pages.
    pub async fn add_root(
        &self,
        key: RootKey,
        schedule: Option<Schedule>,
        settings: SiteSettings,
        now: DateTime<Utc>,
    ) -> RootSite {
        let mut state = self.state.write().await;
        let root = state
            .roots
            .entry(key.clone())
            .or_insert_with(|| RootSite::new(key, now));
        root.schedule = schedule;
        root.settings = settings;
        root.clone()
    }

    /// Registers a page.
    ///
    /// The root is `root_hint` when given, otherwise the longest registered
    /// root containing the URL, otherwise [`RootKey::Uncategorized`]. Site
    /// roots are only created by [`SiteRegistry::add_root`]. `schedule`, when
    /// given, replaces the root's schedule. Adding a registered page returns
    /// it unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::InvalidInput`] if `url` lies outside the
    /// hinted site root and [`MonitorError::NotFound`] if the hinted site
    /// root is not registered.
    pub async fn add_page(
        &self,
        url: PageUrl,
        root_hint: Option<RootKey>,
        schedule: Option<Schedule>,
        now: DateTime<Utc>,
    ) -> Result<Page, MonitorError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.pages.get(&url) {
            return Ok(existing.clone());
        }

        let root_key = match root_hint {
            Some(RootKey::Site(site)) if !url.is_within(&site) => {
                return Err(MonitorError::InvalidInput(format!(
                    "{url} is outside root site {site}"
                )));
            }
            Some(hint @ RootKey::Site(_)) if !state.roots.contains_key(&hint) => {
                return Err(MonitorError::NotFound(format!("root site {hint} is not monitored")));
            }
            Some(hint) => hint,
            None => state.resolve_root(&url),
        };

        let root = state
            .roots
            .entry(root_key.clone())
            .or_insert_with(|| RootSite::new(root_key.clone(), now));
        if schedule.is_some() {
            root.schedule = schedule;
        }
        root.pages.push(url.clone());
        let page = Page {
            url: url.clone(),
            root: root_key,
            last_scraped: None,
            summary: None,
            capture_screenshot: root.settings.capture_screenshot,
            api_key: root.settings.api_key.clone(),
            added_at: now,
        };
        state.pages.insert(url, page.clone());
        Ok(page)
    }

    /// Root that `url` would be grouped under.
    pub async fn resolve_root(&self, url: &PageUrl) -> RootKey {
        let state = self.state.read().await;
        match state.pages.get(url) {
            Some(page) => page.root.clone(),
            None => state.resolve_root(url),
        }
    }

    /// Removes a page. Removing an unknown page returns `None`.
    pub async fn remove_page(&self, url: &PageUrl) -> Option<Page> {
        let mut state = self.state.write().await;
        let page = state.pages.remove(url)?;
        if let Some(root) = state.roots.get_mut(&page.root) {
            root.pages.retain(|p| p != url);
        }
        state.drop_empty_uncategorized();
        Some(page)
    }

    /// Removes a root with all of its pages. Removing an unknown root
    /// returns `None`.
    pub async fn remove_root(&self, key: &RootKey) -> Option<RootSite> {
        let mut state = self.state.write().await;
        let root = state.roots.remove(key)?;
        for url in &root.pages {
            state.pages.remove(url);
        }
        Some(root)
    }

    /// Every root with its pages, sites first in URL order, then
    /// `Uncategorized`.
    pub async fn list_grouped(&self) -> Vec<RootGroup> {
        let state = self.state.read().await;
        state
            .roots
            .values()
            .map(|root| RootGroup {
                key: root.key.clone(),
                pages: root
                    .pages
                    .iter()
                    .filter_map(|url| state.pages.get(url).cloned())
                    .collect(),
                schedule: root.schedule,
                master_summary: root.master_summary.clone(),
            })
            .collect()
    }

    /// Sets the active flag of a root's schedule.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::NotFound`] if the root is unknown or has no
    /// schedule.
    pub async fn set_schedule_active(
        &self,
        key: &RootKey,
        active: bool,
    ) -> Result<Schedule, MonitorError> {
        let mut state = self.state.write().await;
        let schedule = state
            .roots
            .get_mut(key)
            .and_then(|root| root.schedule.as_mut())
            .ok_or_else(|| MonitorError::NotFound(format!("No schedule found for {key}")))?;
        schedule.set_active(active);
        Ok(*schedule)
    }

    /// Schedule of a root.
    pub async fn schedule(&self, key: &RootKey) -> Option<Schedule> {
        self.state
            .read()
            .await
            .roots
            .get(key)
            .and_then(|root| root.schedule)
    }

    /// Roots whose schedule is active.
    pub async fn active_schedules(&self) -> Vec<(RootKey, Schedule)> {
        self.state
            .read()
            .await
            .roots
            .values()
            .filter_map(|root| {
                root.schedule
                    .filter(Schedule::is_active)
                    .map(|schedule| (root.key.clone(), schedule))
            })
            .collect()
    }

    /// A registered root.
    pub async fn root(&self, key: &RootKey) -> Option<RootSite> {
        self.state.read().await.roots.get(key).cloned()
    }

    /// Pages of a root in registration order.
    pub async fn pages_of(&self, key: &RootKey) -> Vec<Page> {
        let state = self.state.read().await;
        state
            .roots
            .get(key)
            .map(|root| {
                root.pages
                    .iter()
                    .filter_map(|url| state.pages.get(url).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// A registered page.
    pub async fn page(&self, url: &PageUrl) -> Option<Page> {
        self.state.read().await.pages.get(url).cloned()
    }

    /// Number of pages registered under a root.
    pub async fn page_count(&self, key: &RootKey) -> usize {
        self.state
            .read()
            .await
            .roots
            .get(key)
            .map_or(0, |root| root.pages.len())
    }

    /// Records a successful scrape: advances `last_scraped` and replaces
    /// the summary when one was produced.
    pub async fn record_success(
        &self,
        url: &PageUrl,
        at: DateTime<Utc>,
        summary: Option<String>,
    ) -> Option<Page> {
        let mut state = self.state.write().await;
        let page = state.pages.get_mut(url)?;
        page.last_scraped = Some(page.last_scraped.map_or(at, |prev| prev.max(at)));
        if summary.is_some() {
            page.summary = summary;
        }
        Some(page.clone())
    }

    /// Stores the site-level summary of a root.
    pub async fn set_master_summary(&self, key: &RootKey, summary: String) -> bool {
        let mut state = self.state.write().await;
        match state.roots.get_mut(key) {
            Some(root) => {
                root.master_summary = Some(summary);
                true
            }
            None => false,
        }
    }

    /// Per-root counts for analytics.
    pub async fn overview(&self) -> Vec<RootOverview> {
        let state = self.state.read().await;
        state
            .roots
            .values()
            .map(|root| RootOverview {
                key: root.key.clone(),
                total_pages: root.pages.len(),
                last_scraped: root
                    .pages
                    .iter()
                    .filter_map(|url| state.pages.get(url).and_then(|p| p.last_scraped))
                    .max(),
            })
            .collect()
    }

    /// Reinserts a persisted root. Its page list is rebuilt by
    /// [`SiteRegistry::restore_page`].
    pub async fn restore_root(&self, mut root: RootSite) {
        let mut state = self.state.write().await;
        root.pages.clear();
        state.roots.insert(root.key.clone(), root);
    }

    /// Reinserts a persisted page, creating its root if needed.
    pub async fn restore_page(&self, page: Page) {
        let mut state = self.state.write().await;
        let root = state
            .roots
            .entry(page.root.clone())
            .or_insert_with(|| RootSite::new(page.root.clone(), page.added_at));
        if !root.pages.contains(&page.url) {
            root.pages.push(page.url.clone());
        }
        state.pages.insert(page.url.clone(), page);
    }
}
