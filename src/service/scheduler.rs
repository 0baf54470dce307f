//! Periodic re-scraping of roots with an active schedule.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::time::{Instant, MissedTickBehavior};

use super::monitor_service::{MonitorService, ScrapeSummary};
use crate::domain::RootKey;

/// How often the retention policy is applied.
const RETENTION_EVERY: Duration = Duration::from_secs(60 * 60);

/// Result of one scheduler tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Roots that were due and crawled.
    pub roots_run: Vec<RootKey>,
    /// Totals across every crawl of the tick.
    pub summary: ScrapeSummary,
}

/// Drives scheduled crawls.
///
/// Time is read from the service's clock, so [`Scheduler::tick`] can be
/// driven deterministically with a manual clock.
#[derive(Debug)]
pub struct Scheduler {
    monitor: Arc<MonitorService>,
    tick_interval: Duration,
    last_runs: Mutex<HashMap<RootKey, DateTime<Utc>>>,
}

impl Scheduler {
    /// Creates a scheduler ticking every `tick_interval`.
    #[must_use]
    pub fn new(monitor: Arc<MonitorService>, tick_interval: Duration) -> Self {
        Self {
            monitor,
            tick_interval,
            last_runs: Mutex::new(HashMap::new()),
        }
    }

    /// Last run recorded for a root.
    #[must_use]
    pub fn last_run(&self, root: &RootKey) -> Option<DateTime<Utc>> {
        self.last_runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(root)
            .copied()
    }

    /// Roots whose active schedule is due at `now`.
    ///
    /// A root this scheduler never ran falls back to the latest successful
    /// scrape of its pages, so a restart does not re-run every root at once.
    pub async fn due_roots(&self, now: DateTime<Utc>) -> Vec<RootKey> {
        let schedules = self.monitor.registry().active_schedules().await;
        if schedules.is_empty() {
            return Vec::new();
        }
        let overview: HashMap<RootKey, Option<DateTime<Utc>>> = self
            .monitor
            .registry()
            .overview()
            .await
            .into_iter()
            .map(|root| (root.key, root.last_scraped))
            .collect();

        let last_runs = self.last_runs.lock().unwrap_or_else(PoisonError::into_inner);
        schedules
            .into_iter()
            .filter(|(key, schedule)| {
                let last_run = last_runs
                    .get(key)
                    .copied()
                    .or_else(|| overview.get(key).copied().flatten());
                schedule.is_due(last_run, now)
            })
            .map(|(key, _)| key)
            .collect()
    }

    /// Runs every due root once and waits for the crawls to finish.
    ///
    /// A root's last run is stamped when it is enqueued, so a slow crawl
    /// does not push its next run back.
    pub async fn tick(&self) -> TickReport {
        let now = self.monitor.clock().now();
        let due = self.due_roots(now).await;
        self.forget_removed_roots().await;
        if due.is_empty() {
            return TickReport::default();
        }

        {
            let mut last_runs = self.last_runs.lock().unwrap_or_else(PoisonError::into_inner);
            for root in &due {
                last_runs.insert(root.clone(), now);
            }
        }
        tracing::info!(roots = due.len(), "scheduled crawl started");

        let summaries = join_all(due.iter().map(|root| self.monitor.run_scheduled(root))).await;
        let mut summary = ScrapeSummary::default();
        for run in &summaries {
            summary.merge(run);
        }
        tracing::info!(
            roots = due.len(),
            scraped = summary.pages_scraped,
            failed = summary.pages_failed,
            changed = summary.changes_detected,
            "scheduled crawl finished"
        );
        TickReport {
            roots_run: due,
            summary,
        }
    }

    async fn forget_removed_roots(&self) {
        let scheduled: Vec<RootKey> = self
            .monitor
            .registry()
            .active_schedules()
            .await
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        self.last_runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|key, _| scheduled.contains(key));
    }

    /// Ticks until `shutdown` resolves. Missed ticks are skipped.
    ///
    /// A tick in progress when shutdown fires is allowed to finish.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_prune: Option<Instant> = None;
        tokio::pin!(shutdown);

        tracing::info!(tick = ?self.tick_interval, "scheduler started");
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = interval.tick() => {}
            }

            let report = self.tick().await;
            if !report.roots_run.is_empty() {
                tracing::debug!(roots = ?report.roots_run, "tick complete");
            }

            if last_prune.is_none_or(|at| at.elapsed() >= RETENTION_EVERY) {
                last_prune = Some(Instant::now());
                let _ = self.monitor.prune_snapshots().await;
            }
        }
        tracing::info!("scheduler stopped");
    }
}
