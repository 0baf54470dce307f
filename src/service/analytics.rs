//! Windowed analytics over snapshot history.
//!
//! [`AnalyticsAggregator::compute`] is a pure function of the registry
//! overview and the snapshots captured in the window; nothing is
//! maintained incrementally, so a read right after an append reflects it.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{RootOverview, Snapshot};
use crate::error::MonitorError;

/// Number of entries in the top-N rankings.
const TOP_LIMIT: usize = 5;
/// Upper bound on a window, in days.
const MAX_WINDOW_DAYS: u32 = 3_660;

/// Unit of an [`AnalyticsWindow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowUnit {
    /// `<n>h`
    Hours,
    /// `<n>d`
    Days,
}

/// Relative time range ending now, parsed from tokens like `24h` or `7d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalyticsWindow {
    amount: u32,
    unit: WindowUnit,
}

impl AnalyticsWindow {
    /// Creates a window.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::InvalidInput`] if `amount` is zero or the
    /// window exceeds ten years.
    pub fn new(amount: u32, unit: WindowUnit) -> Result<Self, MonitorError> {
        let days = match unit {
            WindowUnit::Hours => amount.div_ceil(24),
            WindowUnit::Days => amount,
        };
        if amount == 0 || days > MAX_WINDOW_DAYS {
            return Err(MonitorError::InvalidInput(format!(
                "window must be between 1 and {MAX_WINDOW_DAYS} days"
            )));
        }
        Ok(Self { amount, unit })
    }

    /// Window length.
    #[must_use]
    pub fn duration(&self) -> Duration {
        let amount = i64::from(self.amount);
        match self.unit {
            WindowUnit::Hours => Duration::hours(amount),
            WindowUnit::Days => Duration::days(amount),
        }
    }
}

impl Default for AnalyticsWindow {
    fn default() -> Self {
        Self {
            amount: 24,
            unit: WindowUnit::Hours,
        }
    }
}

impl fmt::Display for AnalyticsWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = match self.unit {
            WindowUnit::Hours => 'h',
            WindowUnit::Days => 'd',
        };
        write!(f, "{}{suffix}", self.amount)
    }
}

impl FromStr for AnalyticsWindow {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().to_ascii_lowercase();
        let invalid = || MonitorError::InvalidInput(format!("invalid analytics window: {s}"));
        let (amount, unit) = if let Some(n) = token.strip_suffix('h') {
            (n, WindowUnit::Hours)
        } else if let Some(n) = token.strip_suffix('d') {
            (n, WindowUnit::Days)
        } else {
            return Err(invalid());
        };
        let amount: u32 = amount.parse().map_err(|_| invalid())?;
        Self::new(amount, unit)
    }
}

/// Headline numbers for the window.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Kpis {
    /// Registered root sites, including `Uncategorized` when it has pages.
    pub total_root_sites: usize,
    /// Registered pages.
    pub total_pages: usize,
    /// Scrape attempts in the window.
    pub scrapes_in_range: u64,
    /// Changed snapshots in the window.
    pub changes_in_range: u64,
    /// `succeeded / attempted` as a percentage, `"N/A"` without attempts.
    pub success_rate: String,
    /// Mean duration of successful scrapes, e.g. `"1.25s"`.
    pub avg_scrape_duration: String,
    /// Mean response size of successful scrapes, in bytes.
    pub avg_bytes_fetched: u64,
}

/// Daily counts covering every date of the window.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Trends {
    /// Scrape attempts per date (`YYYY-MM-DD`).
    pub daily_scrapes: BTreeMap<String, u64>,
    /// Changed snapshots per date (`YYYY-MM-DD`).
    pub daily_changes: BTreeMap<String, u64>,
}

/// Activity counts of one root or page.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ActivityRank {
    /// Root key or page URL.
    pub key: String,
    /// Scrape attempts in the window.
    pub scrapes: u64,
    /// Changed snapshots in the window.
    pub changes: u64,
}

/// Entry of the recent-changes feed.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RecentChange {
    /// Page URL.
    pub page_url: String,
    /// Capture instant.
    pub date: DateTime<Utc>,
    /// Snapshot summary.
    pub summary: Option<String>,
    /// Always `true`; kept for the dashboard's feed renderer.
    pub changed: bool,
}

/// Per-root statistics.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RootInsight {
    /// Registered pages.
    pub total_pages: usize,
    /// Latest successful scrape of any page.
    pub last_scraped: Option<DateTime<Utc>>,
    /// Scrape attempts in the window.
    pub scrapes_in_range: u64,
    /// Changed snapshots in the window.
    pub changes_in_range: u64,
    /// `changes / scrapes` as a percentage.
    pub change_rate: String,
    /// Page with the most changes in the window.
    pub most_active_page: Option<String>,
}

/// Full analytics answer.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnalyticsReport {
    /// Window token, e.g. `7d`.
    pub window: String,
    /// End of the window.
    pub generated_at: DateTime<Utc>,
    /// Headline numbers.
    pub kpis: Kpis,
    /// Daily series.
    pub trends: Trends,
    /// Roots ranked by changes, then scrapes.
    pub top_root_sites: Vec<ActivityRank>,
    /// Pages ranked by changes, then scrapes.
    pub top_pages: Vec<ActivityRank>,
    /// Most recent changed snapshots.
    pub recent_changes: Vec<RecentChange>,
    /// Statistics per registered root.
    pub per_root_site_insights: BTreeMap<String, RootInsight>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    scrapes: u64,
    changes: u64,
}

impl Tally {
    fn add(&mut self, snapshot: &Snapshot) {
        self.scrapes += 1;
        if snapshot.changed {
            self.changes += 1;
        }
    }
}

/// Computes [`AnalyticsReport`]s.
#[derive(Debug, Clone, Copy)]
pub struct AnalyticsAggregator {
    offset: FixedOffset,
    recent_limit: usize,
}

impl AnalyticsAggregator {
    /// Creates an aggregator bucketing days at `utc_offset_minutes` and
    /// keeping `recent_limit` entries in the recent-changes feed.
    #[must_use]
    pub fn new(utc_offset_minutes: i32, recent_limit: usize) -> Self {
        let offset = utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix());
        Self {
            offset,
            recent_limit,
        }
    }

    /// Computes the report for `window` ending at `now`.
    #[must_use]
    pub fn compute(
        &self,
        window: AnalyticsWindow,
        now: DateTime<Utc>,
        roots: &[RootOverview],
        snapshots: &[Arc<Snapshot>],
    ) -> AnalyticsReport {
        let start = now - window.duration();
        let in_range: Vec<&Snapshot> = snapshots
            .iter()
            .map(|s| &**s)
            .filter(|s| s.captured_at >= start && s.captured_at <= now)
            .collect();

        let mut daily_scrapes = self.empty_days(start, now);
        let mut daily_changes = daily_scrapes.clone();
        let mut by_root: HashMap<String, Tally> = HashMap::new();
        let mut by_page: HashMap<String, Tally> = HashMap::new();
        let mut pages_by_root: HashMap<String, HashMap<String, Tally>> = HashMap::new();
        let mut total = Tally::default();
        let mut successes = 0u64;
        let mut duration_ms = 0u64;
        let mut bytes = 0u64;

        for snapshot in &in_range {
            let day = self.day_key(snapshot.captured_at);
            *daily_scrapes.entry(day.clone()).or_default() += 1;
            if snapshot.changed {
                *daily_changes.entry(day).or_default() += 1;
            }
            let root = snapshot.root.to_string();
            let page = snapshot.page_url.to_string();
            total.add(snapshot);
            by_root.entry(root.clone()).or_default().add(snapshot);
            by_page.entry(page.clone()).or_default().add(snapshot);
            pages_by_root
                .entry(root)
                .or_default()
                .entry(page)
                .or_default()
                .add(snapshot);
            if snapshot.is_success() {
                successes += 1;
                duration_ms = duration_ms.saturating_add(snapshot.duration_ms);
                bytes = bytes.saturating_add(snapshot.bytes_fetched);
            }
        }

        let kpis = Kpis {
            total_root_sites: roots.len(),
            total_pages: roots.iter().map(|r| r.total_pages).sum(),
            scrapes_in_range: total.scrapes,
            changes_in_range: total.changes,
            success_rate: percentage(successes, total.scrapes).unwrap_or_else(|| "N/A".to_string()),
            avg_scrape_duration: format!("{:.2}s", mean(duration_ms, successes) / 1000.0),
            avg_bytes_fetched: bytes.checked_div(successes).unwrap_or(0),
        };

        let per_root_site_insights = roots
            .iter()
            .map(|root| {
                let key = root.key.to_string();
                let tally = by_root.get(&key).copied().unwrap_or_default();
                let most_active_page = pages_by_root.get(&key).and_then(|pages| {
                    rank(pages)
                        .into_iter()
                        .find(|entry| entry.changes > 0)
                        .map(|entry| entry.key)
                });
                let insight = RootInsight {
                    total_pages: root.total_pages,
                    last_scraped: root.last_scraped,
                    scrapes_in_range: tally.scrapes,
                    changes_in_range: tally.changes,
                    change_rate: percentage(tally.changes, tally.scrapes)
                        .unwrap_or_else(|| "0.0%".to_string()),
                    most_active_page,
                };
                (key, insight)
            })
            .collect();

        let mut changed: Vec<&Snapshot> = in_range.iter().copied().filter(|s| s.changed).collect();
        changed.sort_by_key(|s| Reverse((s.captured_at, s.seq)));
        let recent_changes = changed
            .into_iter()
            .take(self.recent_limit)
            .map(|s| RecentChange {
                page_url: s.page_url.to_string(),
                date: s.captured_at,
                summary: s.summary.clone(),
                changed: true,
            })
            .collect();

        AnalyticsReport {
            window: window.to_string(),
            generated_at: now,
            kpis,
            trends: Trends {
                daily_scrapes,
                daily_changes,
            },
            top_root_sites: rank(&by_root).into_iter().take(TOP_LIMIT).collect(),
            top_pages: rank(&by_page).into_iter().take(TOP_LIMIT).collect(),
            recent_changes,
            per_root_site_insights,
        }
    }

    fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    fn day_key(&self, at: DateTime<Utc>) -> String {
        self.local_date(at).format("%Y-%m-%d").to_string()
    }

    /// Every date touched by `[start, end]`, mapped to zero.
    fn empty_days(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> BTreeMap<String, u64> {
        let last = self.local_date(end);
        self.local_date(start)
            .iter_days()
            .take_while(|day| *day <= last)
            .map(|day| (day.format("%Y-%m-%d").to_string(), 0))
            .collect()
    }
}

impl Default for AnalyticsAggregator {
    fn default() -> Self {
        Self::new(0, 20)
    }
}

/// Entries with at least one scrape, by changes desc, scrapes desc, key asc.
fn rank(tallies: &HashMap<String, Tally>) -> Vec<ActivityRank> {
    let mut ranked: Vec<ActivityRank> = tallies
        .iter()
        .filter(|(_, tally)| tally.scrapes > 0)
        .map(|(key, tally)| ActivityRank {
            key: key.clone(),
            scrapes: tally.scrapes,
            changes: tally.changes,
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.changes
            .cmp(&a.changes)
            .then(b.scrapes.cmp(&a.scrapes))
            .then_with(|| a.key.cmp(&b.key))
    });
    ranked
}

#[allow(clippy::cast_precision_loss)]
fn mean(sum: u64, count: u64) -> f64 {
    if count == 0 { 0.0 } else { sum as f64 / count as f64 }
}

#[allow(clippy::cast_precision_loss)]
fn percentage(part: u64, whole: u64) -> Option<String> {
    (whole > 0).then(|| format!("{:.1}%", part as f64 * 100.0 / whole as f64))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{PageUrl, RootKey, ScrapeStatus};
    use chrono::TimeZone;

    fn url(raw: &str) -> PageUrl {
        let Ok(url) = PageUrl::parse(raw) else {
            panic!("valid url");
        };
        url
    }

    fn snap(seq: u64, page: &str, root: &RootKey, at: DateTime<Utc>, changed: bool) -> Arc<Snapshot> {
        Arc::new(Snapshot {
            seq,
            page_url: url(page),
            root: root.clone(),
            captured_at: at,
            status: ScrapeStatus::Success,
            error: None,
            content: Some("x".to_string()),
            content_hash: None,
            summary: Some(format!("summary {seq}")),
            changed,
            duration_ms: 1_500,
            bytes_fetched: 100,
        })
    }

    fn failed(seq: u64, page: &str, root: &RootKey, at: DateTime<Utc>) -> Arc<Snapshot> {
        let mut snapshot = (*snap(seq, page, root, at, false)).clone();
        snapshot.status = ScrapeStatus::Failed;
        snapshot.content = None;
        snapshot.summary = None;
        Arc::new(snapshot)
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        let Some(at) = Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).single() else {
            panic!("valid date");
        };
        at
    }

    fn window(token: &str) -> AnalyticsWindow {
        let Ok(window) = token.parse() else {
            panic!("valid window");
        };
        window
    }

    #[test]
    fn window_tokens() {
        assert_eq!(window("24h").duration(), Duration::hours(24));
        assert_eq!(window("7D").to_string(), "7d");
        assert!("0d".parse::<AnalyticsWindow>().is_err());
        assert!("week".parse::<AnalyticsWindow>().is_err());
        assert!("99999d".parse::<AnalyticsWindow>().is_err());
    }

    #[test]
    fn empty_history_reports_na_and_dense_zero_trends() {
        let report = AnalyticsAggregator::default().compute(window("7d"), at(10, 12), &[], &[]);
        assert_eq!(report.kpis.success_rate, "N/A");
        assert_eq!(report.kpis.avg_scrape_duration, "0.00s");
        assert_eq!(report.trends.daily_scrapes.len(), 8);
        assert!(report.trends.daily_scrapes.values().all(|count| *count == 0));
        assert!(report.top_root_sites.is_empty());
    }

    #[test]
    fn trends_are_densified_across_gaps() {
        let root = RootKey::Site(url("https://example.com"));
        let snapshots = vec![
            snap(1, "https://example.com", &root, at(1, 13), false),
            snap(2, "https://example.com", &root, at(3, 10), true),
        ];
        let report = AnalyticsAggregator::default().compute(window("2d"), at(3, 12), &[], &snapshots);
        let scrapes: Vec<(&str, u64)> = report
            .trends
            .daily_scrapes
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect();
        assert_eq!(
            scrapes,
            vec![("2024-05-01", 1), ("2024-05-02", 0), ("2024-05-03", 1)]
        );
        assert_eq!(report.trends.daily_changes.get("2024-05-03"), Some(&1));
        assert_eq!(report.trends.daily_changes.get("2024-05-02"), Some(&0));
    }

    #[test]
    fn kpis_and_rankings() {
        let a = RootKey::Site(url("https://a.example"));
        let b = RootKey::Site(url("https://b.example"));
        let roots = vec![
            RootOverview {
                key: a.clone(),
                total_pages: 2,
                last_scraped: Some(at(2, 9)),
            },
            RootOverview {
                key: b.clone(),
                total_pages: 1,
                last_scraped: None,
            },
        ];
        let snapshots = vec![
            snap(1, "https://a.example/x", &a, at(2, 1), false),
            snap(2, "https://a.example/x", &a, at(2, 2), true),
            snap(3, "https://a.example/y", &a, at(2, 3), false),
            failed(4, "https://b.example", &b, at(2, 4)),
            // Outside the window.
            snap(5, "https://b.example", &b, at(1, 1), true),
        ];
        let report = AnalyticsAggregator::default().compute(window("24h"), at(2, 12), &roots, &snapshots);

        assert_eq!(report.kpis.total_root_sites, 2);
        assert_eq!(report.kpis.total_pages, 3);
        assert_eq!(report.kpis.scrapes_in_range, 4);
        assert_eq!(report.kpis.changes_in_range, 1);
        assert_eq!(report.kpis.success_rate, "75.0%");
        assert_eq!(report.kpis.avg_scrape_duration, "1.50s");
        assert_eq!(report.kpis.avg_bytes_fetched, 100);

        let Some(top) = report.top_root_sites.first() else {
            panic!("ranked roots");
        };
        assert_eq!(top.key, "https://a.example");
        assert_eq!(report.top_root_sites.len(), 2);

        let Some(insight) = report.per_root_site_insights.get("https://a.example") else {
            panic!("insight for a");
        };
        assert_eq!(insight.scrapes_in_range, 3);
        assert_eq!(insight.change_rate, "33.3%");
        assert_eq!(insight.most_active_page.as_deref(), Some("https://a.example/x"));

        let Some(quiet) = report.per_root_site_insights.get("https://b.example") else {
            panic!("insight for b");
        };
        assert_eq!(quiet.change_rate, "0.0%");
        assert!(quiet.most_active_page.is_none());

        assert_eq!(report.recent_changes.len(), 1);
    }

    #[test]
    fn recent_changes_are_newest_first_and_limited() {
        let root = RootKey::Uncategorized;
        let snapshots: Vec<_> = (0..5)
            .map(|i| snap(i, "https://example.com", &root, at(2, i as u32), true))
            .collect();
        let report = AnalyticsAggregator::new(0, 3).compute(window("1d"), at(2, 12), &[], &snapshots);
        let seqs: Vec<String> = report
            .recent_changes
            .iter()
            .filter_map(|c| c.summary.clone())
            .collect();
        assert_eq!(seqs, vec!["summary 4", "summary 3", "summary 2"]);
    }

    #[test]
    fn offset_moves_day_boundaries() {
        let root = RootKey::Uncategorized;
        let snapshots = vec![snap(1, "https://example.com", &root, at(2, 23), false)];
        let report = AnalyticsAggregator::new(120, 20).compute(window("1d"), at(2, 23), &[], &snapshots);
        assert_eq!(report.trends.daily_scrapes.get("2024-05-03"), Some(&1));
    }
}
