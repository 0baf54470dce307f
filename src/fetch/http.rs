//! `reqwest` + `scraper` implementation of [`PageFetcher`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use scraper::{Html, Node, Selector};

use super::{FetchRequest, FetchedPage, PageFetcher};
use crate::error::MonitorError;

/// Elements whose text is never part of the visible content.
const HIDDEN_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Fetches pages over HTTP and extracts their visible text.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a fetcher with the given per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Internal`] if the HTTP client cannot be
    /// built.
    pub fn new(timeout: Duration) -> Result<Self, MonitorError> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| MonitorError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPage, MonitorError> {
        if request.capture_screenshot {
            tracing::debug!(url = %request.url, "screenshot capture requested; not supported by the HTTP fetcher");
        }

        let response = self
            .client
            .get(request.url.as_str())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| MonitorError::FetchFailure(format!("{}: {e}", request.url)))?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| MonitorError::FetchFailure(format!("{}: {e}", request.url)))?;
        let raw = String::from_utf8_lossy(&body);

        let is_html = content_type
            .as_deref()
            .is_none_or(|ct| ct.to_ascii_lowercase().contains("html"));
        let (text, links) = if is_html {
            extract(&raw)?
        } else {
            (raw.into_owned(), Vec::new())
        };

        Ok(FetchedPage {
            text,
            content_type,
            bytes_fetched: body.len() as u64,
            links,
        })
    }
}

/// Visible text (one text block per line) and anchor targets of a document.
///
/// # Errors
///
/// Returns [`MonitorError::Internal`] if the link selector fails to parse.
pub fn extract(html: &str) -> Result<(String, Vec<String>), MonitorError> {
    let document = Html::parse_document(html);

    let mut lines = Vec::new();
    for node in document.tree.nodes() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| HIDDEN_ELEMENTS.contains(&el.name()))
        });
        let trimmed = text.trim();
        if !hidden && !trimmed.is_empty() {
            lines.push(trimmed.to_string());
        }
    }

    let anchors = Selector::parse("a[href]")
        .map_err(|e| MonitorError::Internal(format!("invalid link selector: {e}")))?;
    let links = document
        .select(&anchors)
        .filter_map(|a| a.value().attr("href"))
        .map(str::to_string)
        .collect();

    Ok((lines.join("\n"), links))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><title>Pricing</title><style>body { color: red }</style></head>
<body><h1>Plans</h1><script>var x = 1;</script><p>Basic: $10</p>
<a href="/pro">Pro</a><a href="mailto:sales@example.com">Sales</a></body></html>"#;

    #[test]
    fn extracts_visible_text_only() {
        let Ok((text, _)) = extract(PAGE) else {
            panic!("extraction succeeds");
        };
        assert!(text.contains("Plans"));
        assert!(text.contains("Basic: $10"));
        assert!(!text.contains("var x"));
        assert!(!text.contains("color: red"));
    }

    #[test]
    fn collects_anchor_targets() {
        let Ok((_, links)) = extract(PAGE) else {
            panic!("extraction succeeds");
        };
        assert_eq!(links, vec!["/pro".to_string(), "mailto:sales@example.com".to_string()]);
    }

    #[test]
    fn client_builds() {
        assert!(HttpFetcher::new(Duration::from_secs(5)).is_ok());
    }
}
