//! Standard report objects produced by every reporter.
//!
//! A report carries a title, a plain-text summary, an optional link, the
//! moment the upstream change happened, and hashtags. It renders as plain
//! text (`Display`), as markdown, as a listing line for the prompt, and as a
//! [`Post`] ready for a channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dates::format_listing;
use crate::post::Post;

/// Width of the horizontal rule printed around previews.
pub const RULE_WIDTH: usize = 72;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub title: String,
    pub summary: String,
    pub url: Option<String>,
    pub when: DateTime<Utc>,
    pub tags: Vec<String>,
    /// Name of the reporter that produced this report.
    pub source: String,
}

impl Report {
    pub fn new(
        source: impl Into<String>,
        title: impl Into<String>,
        summary: impl Into<String>,
        when: DateTime<Utc>,
    ) -> Self {
        Report {
            title: title.into(),
            summary: summary.into(),
            url: None,
            when,
            tags: Vec::new(),
            source: source.into(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn to_markdown(&self) -> String {
        let mut md = format!("**{}**", self.title);
        if !self.summary.is_empty() {
            md.push_str("\n\n");
            md.push_str(&self.summary);
        }
        if let Some(url) = &self.url {
            md.push_str(&format!("\n\n<{url}>"));
        }
        md
    }

    pub fn to_post(&self) -> Post {
        Post::new(format!("{}\n\n{}", self.title, self), self.tags.clone())
    }

    /// One line of the numbered listing shown at the prompt (`index` is 1-based).
    pub fn listing_line(&self, index: usize) -> String {
        format!("{}. {} ({})", index, self.title, format_listing(&self.when))
    }

    pub fn preview(&self) -> String {
        format!("{}\n{}\n\n{}", "-".repeat(RULE_WIDTH), self.title, self)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.url, self.summary.is_empty()) {
            (Some(url), false) => write!(f, "{}\n\n{}", self.summary, url),
            (Some(url), true) => write!(f, "{url}"),
            (None, _) => write!(f, "{}", self.summary),
        }
    }
}

pub fn sort_newest_first(reports: &mut [Report]) {
    reports.sort_by(|a, b| b.when.cmp(&a.when));
}
