//! External collaborators consumed by the scrape path.
//!
//! [`PageFetcher`] turns a URL into extracted text plus outgoing links;
//! [`Summarizer`] turns text into prose. Both are trait objects so the
//! service can run against the real [`HttpFetcher`] in production and a
//! scripted fetcher in tests.

pub mod http;

use std::fmt::Debug;

use async_trait::async_trait;

use crate::domain::{ApiKey, PageUrl};
use crate::error::MonitorError;

pub use http::HttpFetcher;

/// Characters kept by [`PreviewSummarizer`].
const PREVIEW_CHARS: usize = 200;

/// A single fetch request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Page to fetch.
    pub url: PageUrl,
    /// Whether a screenshot should be captured alongside the content.
    pub capture_screenshot: bool,
}

/// Content extracted from a fetched page.
#[derive(Debug, Clone, Default)]
pub struct FetchedPage {
    /// Visible text, one block per line.
    pub text: String,
    /// `Content-Type` reported by the server.
    pub content_type: Option<String>,
    /// Raw body size in bytes.
    pub bytes_fetched: u64,
    /// `href` values of anchors, unresolved.
    pub links: Vec<String>,
}

/// Fetches and extracts page content.
#[async_trait]
pub trait PageFetcher: Send + Sync + Debug {
    /// Fetches one page.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::FetchFailure`] on network, status or
    /// decoding errors.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPage, MonitorError>;
}

/// Produces prose summaries of page content.
#[async_trait]
pub trait Summarizer: Send + Sync + Debug {
    /// Summarizes the content of one page.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::DependencyUnavailable`] when the backend
    /// cannot answer.
    async fn summarize(&self, text: &str, api_key: Option<&ApiKey>) -> Result<String, MonitorError>;

    /// Synthesizes a site-level summary from page summaries.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::DependencyUnavailable`] when the backend
    /// cannot answer.
    async fn summarize_site(
        &self,
        page_summaries: &[String],
        api_key: Option<&ApiKey>,
    ) -> Result<String, MonitorError>;
}

/// Offline summarizer: a short preview plus a word count.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreviewSummarizer;

#[async_trait]
impl Summarizer for PreviewSummarizer {
    async fn summarize(&self, text: &str, _api_key: Option<&ApiKey>) -> Result<String, MonitorError> {
        let preview: String = text
            .chars()
            .take(PREVIEW_CHARS)
            .map(|c| if c == '\n' { ' ' } else { c })
            .collect();
        let words = text.split_whitespace().count();
        Ok(format!("Preview: {}...\n(Total words: {words})", preview.trim()))
    }

    async fn summarize_site(
        &self,
        _page_summaries: &[String],
        _api_key: Option<&ApiKey>,
    ) -> Result<String, MonitorError> {
        Err(MonitorError::DependencyUnavailable(
            "site summaries need a text-generation backend".to_string(),
        ))
    }
}
