//! Normalized page URLs and root-site grouping keys.
//!
//! [`PageUrl`] is the identity of a monitored page. Two spellings of the
//! same address (`HTTPS://Example.com/#top` and `https://example.com`)
//! normalize to the same value, so history, locks and registry entries are
//! always keyed consistently.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use crate::error::MonitorError;

/// Sentinel group for pages with no discernible root site.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Normalized absolute `http`/`https` URL.
///
/// Normalization lowercases scheme and host, drops the fragment, and drops
/// the trailing slash of a bare origin (`https://example.com/` becomes
/// `https://example.com`). Paths and query strings are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PageUrl(String);

impl PageUrl {
    /// Parses and normalizes a raw URL.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::InvalidInput`] if the input is empty, is not
    /// an absolute URL, or uses a scheme other than `http`/`https`.
    pub fn parse(raw: &str) -> Result<Self, MonitorError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(MonitorError::InvalidInput("URL is required".to_string()));
        }
        let mut url = Url::parse(trimmed)
            .map_err(|e| MonitorError::InvalidInput(format!("invalid URL {trimmed}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(MonitorError::InvalidInput(format!(
                "unsupported URL scheme: {}",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(MonitorError::InvalidInput(format!("URL has no host: {trimmed}")));
        }
        url.set_fragment(None);

        let mut normalized = url.to_string();
        if url.path() == "/" && url.query().is_none() && normalized.ends_with('/') {
            normalized.pop();
        }
        Ok(Self(normalized))
    }

    /// Returns the normalized URL string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Host with a leading `www.` removed, used for same-site checks.
    #[must_use]
    pub fn site_host(&self) -> Option<String> {
        let url = Url::parse(&self.0).ok()?;
        let host = url.host_str()?;
        Some(host.strip_prefix("www.").unwrap_or(host).to_string())
    }

    /// Returns `true` when `self` lives on the same site as `root` and its
    /// path is at or below the root's path.
    #[must_use]
    pub fn is_within(&self, root: &Self) -> bool {
        let (Ok(page), Ok(base)) = (Url::parse(&self.0), Url::parse(&root.0)) else {
            return false;
        };
        if self.site_host() != root.site_host() {
            return false;
        }
        let base_path = base.path().trim_end_matches('/');
        let path = page.path();
        path == base_path
            || base_path.is_empty()
            || path
                .strip_prefix(base_path)
                .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Resolves a link found on this page into a normalized absolute URL.
    ///
    /// Returns `None` for `javascript:`, `mailto:`, `tel:` and anchor-only
    /// links, and for anything that does not resolve to `http`/`https`.
    #[must_use]
    pub fn join(&self, href: &str) -> Option<Self> {
        let href = href.trim();
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
        {
            return None;
        }
        let base = Url::parse(&self.0).ok()?;
        let joined = base.join(href).ok()?;
        Self::parse(joined.as_str()).ok()
    }
}

impl fmt::Display for PageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PageUrl {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PageUrl {
    type Error = MonitorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PageUrl> for String {
    fn from(url: PageUrl) -> Self {
        url.0
    }
}

/// Grouping key under which pages are monitored together.
///
/// Ordered so that real sites sort before [`RootKey::Uncategorized`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RootKey {
    /// A root site identified by its normalized URL.
    Site(PageUrl),
    /// Pages with no discernible root site.
    Uncategorized,
}

impl RootKey {
    /// Parses a root identifier as sent by clients: either the literal
    /// `"Uncategorized"` or a URL.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::InvalidInput`] if the identifier is empty or
    /// not a valid URL.
    pub fn parse(raw: &str) -> Result<Self, MonitorError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(MonitorError::InvalidInput("Root URL is required".to_string()));
        }
        if trimmed == UNCATEGORIZED {
            return Ok(Self::Uncategorized);
        }
        PageUrl::parse(trimmed).map(Self::Site)
    }

    /// Returns the site URL, or `None` for [`RootKey::Uncategorized`].
    #[must_use]
    pub const fn site(&self) -> Option<&PageUrl> {
        match self {
            Self::Site(url) => Some(url),
            Self::Uncategorized => None,
        }
    }
}

impl fmt::Display for RootKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Site(url) => f.write_str(url.as_str()),
            Self::Uncategorized => f.write_str(UNCATEGORIZED),
        }
    }
}

impl Serialize for RootKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RootKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn url(raw: &str) -> PageUrl {
        let Ok(url) = PageUrl::parse(raw) else {
            panic!("valid url: {raw}");
        };
        url
    }

    #[test]
    fn bare_origin_drops_trailing_slash() {
        assert_eq!(url("https://Example.com/").as_str(), "https://example.com");
        assert_eq!(url("https://example.com").as_str(), "https://example.com");
    }

    #[test]
    fn fragment_is_removed_and_path_kept() {
        assert_eq!(
            url("https://example.com/docs/#intro").as_str(),
            "https://example.com/docs/"
        );
    }

    #[test]
    fn rejects_empty_and_non_http() {
        assert!(PageUrl::parse("  ").is_err());
        assert!(PageUrl::parse("ftp://example.com").is_err());
        assert!(PageUrl::parse("not a url").is_err());
    }

    #[test]
    fn within_root_ignores_www() {
        let root = url("https://example.com");
        assert!(url("https://www.example.com/pricing").is_within(&root));
        assert!(!url("https://other.com/pricing").is_within(&root));
    }

    #[test]
    fn within_root_respects_path_boundary() {
        let root = url("https://example.com/blog");
        assert!(url("https://example.com/blog/post-1").is_within(&root));
        assert!(url("https://example.com/blog").is_within(&root));
        assert!(!url("https://example.com/blogroll").is_within(&root));
        assert!(!url("https://example.com/about").is_within(&root));
    }

    #[test]
    fn join_skips_non_navigational_links() {
        let base = url("https://example.com/docs/");
        assert!(base.join("mailto:a@b.c").is_none());
        assert!(base.join("#top").is_none());
        let Some(joined) = base.join("guide?x=1#frag") else {
            panic!("relative link resolves");
        };
        assert_eq!(joined.as_str(), "https://example.com/docs/guide?x=1");
    }

    #[test]
    fn root_key_parses_sentinel() {
        let Ok(key) = RootKey::parse("Uncategorized") else {
            panic!("sentinel parses");
        };
        assert_eq!(key, RootKey::Uncategorized);
        assert_eq!(key.to_string(), UNCATEGORIZED);
        assert!(RootKey::parse("").is_err());
    }

    #[test]
    fn root_key_serializes_as_string() {
        let key = RootKey::Site(url("https://example.com"));
        let json = serde_json::to_string(&key).unwrap_or_default();
        assert_eq!(json, "\"https://example.com\"");
    }

    #[test]
    fn sites_sort_before_uncategorized() {
        let site = RootKey::Site(url("https://zzz.example"));
        assert!(site < RootKey::Uncategorized);
    }
}
