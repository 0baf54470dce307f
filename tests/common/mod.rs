//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::{Notify, Semaphore};

use sitewatch::api;
use sitewatch::app_state::AppState;
use sitewatch::clock::ManualClock;
use sitewatch::domain::EventBus;
use sitewatch::error::MonitorError;
use sitewatch::fetch::http::extract;
use sitewatch::fetch::{FetchRequest, FetchedPage, PageFetcher, PreviewSummarizer};
use sitewatch::service::{MonitorPolicy, MonitorService};

/// Serves scripted HTML per URL. Unscripted URLs fail with a 404-style
/// error; held URLs block until released.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    pages: Mutex<HashMap<String, String>>,
    held: Mutex<HashMap<String, Arc<Semaphore>>>,
    started: Notify,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    /// Serves `html` for `url` from now on.
    pub fn set(&self, url: &str, html: &str) {
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), html.to_string());
    }

    /// Makes fetches of `url` fail.
    pub fn remove(&self, url: &str) {
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(url);
    }

    /// Blocks fetches of `url` until [`ScriptedFetcher::release`].
    pub fn hold(&self, url: &str) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), Arc::new(Semaphore::new(0)));
    }

    /// Lets held fetches of `url` proceed.
    pub fn release(&self, url: &str) {
        if let Some(gate) = self
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(url)
        {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    /// Resolves once a held fetch has started.
    pub async fn wait_until_held(&self) {
        self.started.notified().await;
    }

    /// Number of fetch calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPage, MonitorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(request.url.as_str())
            .cloned();
        if let Some(gate) = gate {
            self.started.notify_one();
            let _ = gate.acquire().await;
        }

        let html = self
            .pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(request.url.as_str())
            .cloned();
        let Some(html) = html else {
            return Err(MonitorError::FetchFailure(format!(
                "{}: 404 Not Found",
                request.url
            )));
        };
        let (text, links) = extract(&html)?;
        Ok(FetchedPage {
            text,
            content_type: Some("text/html".to_string()),
            bytes_fetched: html.len() as u64,
            links,
        })
    }
}

/// A fixed starting instant.
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Test policy: two immediate attempts, small crawl cap.
pub fn policy() -> MonitorPolicy {
    MonitorPolicy {
        fetch_attempts: 2,
        retry_backoff: Duration::ZERO,
        fetch_timeout: Duration::from_secs(5),
        max_pages_per_root: 5,
        ..MonitorPolicy::default()
    }
}

/// A service over the scripted fetcher and a manual clock.
pub fn monitor(fetcher: &Arc<ScriptedFetcher>, clock: &Arc<ManualClock>) -> Arc<MonitorService> {
    monitor_with(fetcher, clock, policy())
}

/// Like [`monitor`], with an explicit policy.
pub fn monitor_with(
    fetcher: &Arc<ScriptedFetcher>,
    clock: &Arc<ManualClock>,
    policy: MonitorPolicy,
) -> Arc<MonitorService> {
    Arc::new(MonitorService::new(
        policy,
        Arc::clone(fetcher) as Arc<dyn PageFetcher>,
        Arc::new(PreviewSummarizer),
        Arc::clone(clock) as Arc<dyn sitewatch::clock::Clock>,
        EventBus::new(256),
    ))
}

/// The HTTP router over `monitor`.
pub fn app(monitor: &Arc<MonitorService>) -> Router {
    api::build_router().with_state(AppState::new(Arc::clone(monitor)))
}

/// A minimal HTML page.
pub fn html(body: &str) -> String {
    format!("<html><head><title>t</title></head><body>{body}</body></html>")
}
