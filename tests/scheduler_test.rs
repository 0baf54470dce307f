//! Scheduler behavior driven by a manual clock.

#![allow(clippy::panic)]

mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio_test::assert_ok;

use sitewatch::clock::ManualClock;
use sitewatch::domain::{IntervalUnit, PageUrl, RootKey, ScrapeStatus};
use sitewatch::error::MonitorError;
use sitewatch::service::{MonitorPolicy, MonitorService, Scheduler};

use common::{ScriptedFetcher, html, monitor, monitor_with, policy, start};

const ROOT: &str = "https://example.com";

fn root_key() -> RootKey {
    assert_ok!(RootKey::parse(ROOT))
}

fn fixture() -> (Arc<ScriptedFetcher>, Arc<ManualClock>, Arc<MonitorService>, Scheduler) {
    let fetcher = Arc::new(ScriptedFetcher::default());
    let clock = Arc::new(ManualClock::new(start()));
    let service = monitor(&fetcher, &clock);
    let scheduler = Scheduler::new(Arc::clone(&service), StdDuration::from_secs(30));
    (fetcher, clock, service, scheduler)
}

async fn add_hourly_root(service: &MonitorService) {
    assert_ok!(
        service
            .add_site(ROOT, None, 1, IntervalUnit::Hours, false)
            .await
    );
}

#[tokio::test]
async fn hourly_root_runs_only_when_due() {
    let (fetcher, clock, service, scheduler) = fixture();
    fetcher.set(ROOT, &html("<p>hello</p>"));
    add_hourly_root(&service).await;

    // Never ran: due immediately, and the root URL itself is scraped.
    let first = scheduler.tick().await;
    assert_eq!(first.roots_run, vec![root_key()]);
    assert_eq!(first.summary.pages_scraped, 1);
    assert_eq!(scheduler.last_run(&root_key()), Some(start()));

    clock.advance(Duration::minutes(59));
    let early = scheduler.tick().await;
    assert!(early.roots_run.is_empty());

    clock.advance(Duration::minutes(2));
    let due = scheduler.tick().await;
    assert_eq!(due.roots_run, vec![root_key()]);

    let history = assert_ok!(service.history(ROOT, None).await);
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn paused_root_is_skipped_until_resumed() {
    let (fetcher, _clock, service, scheduler) = fixture();
    fetcher.set(ROOT, &html("<p>hello</p>"));
    add_hourly_root(&service).await;

    assert_ok!(service.set_schedule_active(ROOT, false).await);
    assert!(scheduler.tick().await.roots_run.is_empty());
    assert_eq!(fetcher.calls(), 0);

    assert_ok!(service.set_schedule_active(ROOT, true).await);
    assert_eq!(scheduler.tick().await.roots_run.len(), 1);
}

#[tokio::test]
async fn failing_page_does_not_block_siblings() {
    let (fetcher, _clock, service, scheduler) = fixture();
    fetcher.set(ROOT, &html("<p>home</p>"));
    add_hourly_root(&service).await;
    let broken = assert_ok!(PageUrl::parse("https://example.com/broken"));
    assert_ok!(service.add_page(broken.clone(), Some(root_key()), None).await);

    let report = scheduler.tick().await;
    assert_eq!(report.summary.pages_scraped, 1);
    assert_eq!(report.summary.pages_failed, 1);

    let history = assert_ok!(service.history(broken.as_str(), None).await);
    let Some(latest) = history.first() else {
        panic!("failed attempt is recorded");
    };
    assert_eq!(latest.status, ScrapeStatus::Failed);
    assert!(!latest.changed);
    // Every attempt was made before giving up.
    assert_eq!(fetcher.calls(), 3);
}

#[tokio::test]
async fn scheduled_run_skips_page_scraped_on_demand() {
    let (fetcher, _clock, service, scheduler) = fixture();
    fetcher.set(ROOT, &html("<p>home</p>"));
    add_hourly_root(&service).await;

    fetcher.hold(ROOT);
    let on_demand = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.scrape_now(ROOT).await })
    };
    fetcher.wait_until_held().await;

    // A second explicit request is rejected outright.
    let busy = service.scrape_now(ROOT).await;
    assert!(matches!(busy, Err(MonitorError::Busy(_))));

    // The scheduled pass skips the page instead.
    let report = scheduler.tick().await;
    assert_eq!(report.summary.pages_skipped, 1);
    assert_eq!(report.summary.pages_scraped, 0);

    fetcher.release(ROOT);
    let Ok(Ok(summary)) = on_demand.await else {
        panic!("on-demand scrape completes");
    };
    assert_eq!(summary.pages_scraped, 1);

    let history = assert_ok!(service.history(ROOT, None).await);
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn discovered_links_join_the_root() {
    let (fetcher, _clock, service, scheduler) = fixture();
    fetcher.set(ROOT, &html(r#"<a href="/pricing">Pricing</a><a href="https://elsewhere.example/">x</a>"#));
    fetcher.set("https://example.com/pricing", &html("<p>Basic: $10</p>"));
    add_hourly_root(&service).await;

    let report = scheduler.tick().await;
    assert_eq!(report.summary.pages_scraped, 2);

    let pages = service.registry().pages_of(&root_key()).await;
    let urls: Vec<&str> = pages.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(urls, vec![ROOT, "https://example.com/pricing"]);
}

#[tokio::test]
async fn removed_root_is_forgotten() {
    let (fetcher, _clock, service, scheduler) = fixture();
    fetcher.set(ROOT, &html("<p>home</p>"));
    add_hourly_root(&service).await;

    let _ = scheduler.tick().await;
    assert!(scheduler.last_run(&root_key()).is_some());

    assert_ok!(service.remove_root(ROOT).await);
    let report = scheduler.tick().await;
    assert!(report.roots_run.is_empty());
    assert!(scheduler.last_run(&root_key()).is_none());
}

#[tokio::test]
async fn pausing_mid_crawl_stops_before_the_next_wave() {
    let (fetcher, _clock, service, scheduler) = fixture();
    fetcher.set(ROOT, &html(r#"<a href="/pricing">Pricing</a>"#));
    fetcher.set("https://example.com/pricing", &html("<p>Basic: $10</p>"));
    add_hourly_root(&service).await;
    fetcher.hold(ROOT);

    let (report, ()) = tokio::join!(scheduler.tick(), async {
        fetcher.wait_until_held().await;
        assert_ok!(service.set_schedule_active(ROOT, false).await);
        fetcher.release(ROOT);
    });

    // The page already in flight completes; the discovered one is never fetched.
    assert_eq!(report.summary.pages_scraped, 1);
    assert_eq!(fetcher.calls(), 1);
    let pricing = assert_ok!(service.history("https://example.com/pricing", None).await);
    assert!(pricing.is_empty());
}

#[tokio::test]
async fn root_removed_mid_crawl_stays_removed() {
    let (fetcher, _clock, service, scheduler) = fixture();
    fetcher.set(ROOT, &html(r#"<a href="/a">A</a><a href="/b">B</a>"#));
    fetcher.set("https://example.com/a", &html(r#"<a href="/c">C</a>"#));
    fetcher.set("https://example.com/b", &html("<p>b</p>"));
    fetcher.set("https://example.com/c", &html("<p>c</p>"));
    add_hourly_root(&service).await;
    fetcher.hold("https://example.com/b");

    let (report, removal) = tokio::join!(scheduler.tick(), async {
        fetcher.wait_until_held().await;
        let removal = service.remove_root(ROOT).await;
        fetcher.release("https://example.com/b");
        removal
    });
    let removal = assert_ok!(removal);
    assert_eq!(removal.pages_removed, 3);
    assert_eq!(report.roots_run, vec![root_key()]);

    // Nothing under the root survives, and /c was never fetched.
    assert_eq!(fetcher.calls(), 3);
    assert!(service.grouped_pages().await.is_empty());
    assert!(service.registry().root(&root_key()).await.is_none());
    assert_eq!(service.store().page_count().await, 0);
    for url in [ROOT, "https://example.com/a", "https://example.com/b", "https://example.com/c"] {
        assert!(matches!(
            service.history(url, None).await,
            Err(MonitorError::NotFound(_))
        ));
    }

    // A run enqueued before the removal does not bring the root back.
    let late = service.run_scheduled(&root_key()).await;
    assert_eq!(late.pages_scraped, 0);
    assert!(service.grouped_pages().await.is_empty());
}

#[tokio::test]
async fn slow_fetch_is_recorded_as_a_failed_attempt() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    let clock = Arc::new(ManualClock::new(start()));
    let service = monitor_with(
        &fetcher,
        &clock,
        MonitorPolicy {
            fetch_timeout: StdDuration::from_millis(50),
            ..policy()
        },
    );
    fetcher.set(ROOT, &html("<p>slow</p>"));
    fetcher.hold(ROOT);

    let summary = assert_ok!(service.scrape_now(ROOT).await);
    assert_eq!(summary.pages_failed, 1);
    assert_eq!(summary.pages_scraped, 0);
    assert_eq!(fetcher.calls(), 2);

    let history = assert_ok!(service.history(ROOT, None).await);
    let Some(latest) = history.first() else {
        panic!("timed out attempt is recorded");
    };
    assert_eq!(latest.status, ScrapeStatus::Failed);
    assert!(!latest.changed);
    assert!(latest.error.as_deref().is_some_and(|e| e.contains("timed out")));
}
