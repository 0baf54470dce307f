//! Change detection.
//!
//! [`ChangeDetector`] decides whether two captures of a page differ once
//! volatile noise is normalized away, fingerprints content for the snapshot
//! store, and produces a [`TextDiff`] for HTML presentation. The same diff
//! primitive backs both the stored-version compare and the free-text diff.

pub mod myers;
pub mod render;

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

pub use render::{DiffOp, HtmlOptions, TextDiff, escape_html};

/// Date-times (`2024-05-01T10:20:30Z`, `2024-05-01 10:20`) and clock times
/// with seconds or an am/pm marker.
static TIMESTAMP: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b\d{4}-\d{2}-\d{2}[t ]\d{1,2}:\d{2}(?::\d{2}(?:\.\d+)?)?(?: ?(?:z|utc|[+-]\d{2}:?\d{2}))?|\b\d{1,2}:\d{2}:\d{2}\b|\b\d{1,2}:\d{2} ?[ap]m\b",
    )
    .ok()
});

/// Rules applied identically to both sides before comparing content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizationRules {
    /// Trim lines, collapse whitespace runs and drop blank lines.
    pub collapse_whitespace: bool,
    /// Remove embedded date-times and clock times.
    pub strip_timestamps: bool,
}

impl Default for NormalizationRules {
    fn default() -> Self {
        Self {
            collapse_whitespace: true,
            strip_timestamps: true,
        }
    }
}

/// Result of comparing a capture against its predecessor.
#[derive(Debug, Clone)]
pub struct Comparison {
    /// Whether normalized content differs. Always `false` without a
    /// predecessor.
    pub changed: bool,
    /// Raw line diff, absent when there was no predecessor.
    pub diff: Option<TextDiff>,
}

/// Normalizes, fingerprints and diffs page content.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector {
    rules: NormalizationRules,
}

impl ChangeDetector {
    /// Creates a detector with the given rules.
    #[must_use]
    pub const fn new(rules: NormalizationRules) -> Self {
        Self { rules }
    }

    /// Active normalization rules.
    #[must_use]
    pub const fn rules(&self) -> NormalizationRules {
        self.rules
    }

    /// Applies the normalization rules.
    #[must_use]
    pub fn normalize(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for line in text.lines() {
            let line = match (&*TIMESTAMP, self.rules.strip_timestamps) {
                (Some(re), true) => re.replace_all(line, ""),
                _ => Cow::Borrowed(line),
            };
            if self.rules.collapse_whitespace {
                let mut words = line.split_whitespace().peekable();
                if words.peek().is_none() {
                    continue;
                }
                for (i, word) in words.enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    out.push_str(word);
                }
            } else {
                out.push_str(&line);
            }
            out.push('\n');
        }
        out
    }

    /// SHA-256 hex digest of the normalized content.
    #[must_use]
    pub fn fingerprint(&self, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.normalize(text).as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Compares a capture against its predecessor.
    #[must_use]
    pub fn compare(&self, previous: Option<&str>, current: &str) -> Comparison {
        match previous {
            None => Comparison {
                changed: false,
                diff: None,
            },
            Some(previous) => Comparison {
                changed: self.normalize(previous) != self.normalize(current),
                diff: Some(TextDiff::lines(previous, current)),
            },
        }
    }

    /// Stateless two-text diff rendered as a full HTML table.
    #[must_use]
    pub fn diff_html(&self, old: &str, new: &str) -> String {
        TextDiff::lines(old, new).to_html(&HtmlOptions::default())
    }
}
