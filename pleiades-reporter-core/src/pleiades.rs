//! Reporters for the Pleiades gazetteer: new places, the project blog, and
//! edits to published places.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::contract::{Reporter, ReporterError, WebRequest};
use crate::dates::parse_datetime;
use crate::report::{sort_newest_first, Report};
use crate::reporter::ReporterBase;
use crate::rss::{DatedEntry, FeedHandler};
use crate::text::norm;

pub const NEW_PLACES_FEED: &str = "https://pleiades.stoa.org/indexes/published/RSS";
pub const CHANGES_FEED: &str =
    "https://pleiades.stoa.org/indexes/published-places-names-locations-connections/RSS";
pub const BLOG_FEED: &str = "https://pleiades.stoa.org/news/RSS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PleiadesFeedKind {
    NewPlaces,
    Blog,
}

impl PleiadesFeedKind {
    fn title_prefix(self) -> &'static str {
        match self {
            PleiadesFeedKind::NewPlaces => "New Pleiades place",
            PleiadesFeedKind::Blog => "Pleiades blog",
        }
    }

    fn tags(self) -> [&'static str; 2] {
        match self {
            PleiadesFeedKind::NewPlaces => ["Pleiades", "AncientGeography"],
            PleiadesFeedKind::Blog => ["Pleiades", "AncientHistory"],
        }
    }
}

/// Reports each new entry of a Pleiades RSS feed.
pub struct PleiadesFeedReporter {
    base: ReporterBase,
    handler: FeedHandler,
    kind: PleiadesFeedKind,
}

impl PleiadesFeedReporter {
    pub fn new(
        base: ReporterBase,
        kind: PleiadesFeedKind,
        cache_dir: Option<&Path>,
    ) -> Result<Self, ReporterError> {
        let handler = FeedHandler::new(base.name().to_string(), cache_dir)?;
        Ok(PleiadesFeedReporter {
            base,
            handler,
            kind,
        })
    }

    pub fn handler_mut(&mut self) -> &mut FeedHandler {
        &mut self.handler
    }

    fn entry_report(&self, entry: &DatedEntry) -> Report {
        let summary = match &entry.summary {
            Some(s) if !s.is_empty() => format!("{}: {}", entry.title, s),
            _ => entry.title.clone(),
        };
        let report = Report::new(
            self.base.name(),
            format!("{}: {}", self.kind.title_prefix(), entry.title),
            summary,
            entry.when,
        )
        .with_tags(self.kind.tags());
        match &entry.link {
            Some(link) => report.with_url(link.clone()),
            None => report,
        }
    }
}

#[async_trait]
impl Reporter for PleiadesFeedReporter {
    fn name(&self) -> String {
        self.base.name().to_string()
    }

    async fn check(&mut self) -> Result<Vec<Report>, ReporterError> {
        let feed_url = self.base.api_base_uri().to_string();
        let priming = !self.handler.has_state();
        let entries = match self
            .handler
            .fetch(&feed_url, &mut self.base, !priming, true)
            .await
        {
            Ok(entries) => entries,
            Err(ReporterError::Wait { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        self.handler.set_last_check(Utc::now())?;
        if priming {
            info!(reporter = %self.base.name(), seen = entries.len(), "Primed feed; nothing to report on first run");
            return Ok(Vec::new());
        }
        let mut reports: Vec<Report> = entries.iter().map(|e| self.entry_report(e)).collect();
        sort_newest_first(&mut reports);
        info!(reporter = %self.base.name(), count = reports.len(), "Feed check complete");
        Ok(reports)
    }
}

fn place_pattern() -> &'static Regex {
    static PLACE: OnceLock<Regex> = OnceLock::new();
    PLACE.get_or_init(|| Regex::new(r"^(https?://[^/]+/places/\d+)").expect("place pattern is valid"))
}

/// The place URL that a place, name, location or connection URL belongs to.
pub fn place_url(link: &str) -> Option<String> {
    place_pattern()
        .captures(link)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Summarise the history entries of a Pleiades place modified after `cutoff`,
/// one line per entry, oldest first. Empty when nothing qualifies.
pub fn modification_summary(place: &Value, cutoff: DateTime<Utc>) -> String {
    let Some(history) = place.get("history").and_then(Value::as_array) else {
        return String::new();
    };
    let mut changes: Vec<(DateTime<Utc>, String)> = history
        .iter()
        .filter_map(|h| {
            let modified = h.get("modified").and_then(Value::as_str)?;
            let when = match parse_datetime(modified) {
                Ok(when) => when,
                Err(e) => {
                    warn!(error = %e, "Skipping history entry with unreadable date");
                    return None;
                }
            };
            if when <= cutoff {
                return None;
            }
            let comment = h
                .get("comment")
                .and_then(Value::as_str)
                .map(|c| norm(c, &[], true))
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| "Edited".to_string());
            let line = match h.get("modifiedBy").and_then(Value::as_str) {
                Some(by) if !by.is_empty() => {
                    format!("{}: {} ({})", when.format("%Y-%m-%d"), comment, by)
                }
                _ => format!("{}: {}", when.format("%Y-%m-%d"), comment),
            };
            Some((when, line))
        })
        .collect();
    changes.sort_by(|a, b| a.0.cmp(&b.0));
    changes
        .into_iter()
        .map(|(_, line)| line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reports edits to published Pleiades places, one report per place.
pub struct PleiadesChangesReporter {
    base: ReporterBase,
    handler: FeedHandler,
}

impl PleiadesChangesReporter {
    pub fn new(base: ReporterBase, cache_dir: Option<&Path>) -> Result<Self, ReporterError> {
        let handler = FeedHandler::new(base.name().to_string(), cache_dir)?;
        Ok(PleiadesChangesReporter { base, handler })
    }

    pub fn handler_mut(&mut self) -> &mut FeedHandler {
        &mut self.handler
    }

    /// Fetch the JSON representation of a Pleiades resource.
    pub async fn get_pleiades_json(&mut self, url: &str) -> Result<Value, ReporterError> {
        self.place_json(url, false).await
    }

    async fn place_json(&mut self, url: &str, bypass_cache: bool) -> Result<Value, ReporterError> {
        let json_url = format!("{}/json", url.trim_end_matches('/'));
        let response = self
            .base
            .web_get(WebRequest::new(&json_url).bypass_cache(bypass_cache))
            .await?;
        if !response.is_success() {
            return Err(ReporterError::Http {
                status: response.status,
                url: json_url,
            });
        }
        Ok(serde_json::from_str(&response.body)?)
    }
}

#[async_trait]
impl Reporter for PleiadesChangesReporter {
    fn name(&self) -> String {
        self.base.name().to_string()
    }

    async fn check(&mut self) -> Result<Vec<Report>, ReporterError> {
        let feed_url = self.base.api_base_uri().to_string();
        let priming = !self.handler.has_state();
        let started = Utc::now();
        let cutoff = self.handler.last_check().unwrap_or(started);
        let entries = match self
            .handler
            .fetch_unmarked(&feed_url, &mut self.base, !priming, true)
            .await
        {
            Ok(entries) => entries,
            Err(ReporterError::Wait { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        if priming {
            self.handler.mark_seen(&entries);
            self.handler.set_last_check(started)?;
            info!(reporter = %self.base.name(), seen = entries.len(), "Primed feed; nothing to report on first run");
            return Ok(Vec::new());
        }

        // Several entries (names, locations, connections) can point at one place.
        let mut places: BTreeMap<String, Vec<&DatedEntry>> = BTreeMap::new();
        let mut elsewhere = Vec::new();
        for entry in &entries {
            match entry.link.as_deref().and_then(place_url) {
                Some(url) => places.entry(url).or_default().push(entry),
                None => {
                    debug!(guid = %entry.guid, "Feed entry does not point at a place");
                    elsewhere.push(entry);
                }
            }
        }
        self.handler.mark_seen(elsewhere);
        let retries: Vec<String> = self.handler.pending().keys().cloned().collect();
        for url in retries {
            places.entry(url).or_default();
        }

        let mut reports = Vec::new();
        let mut gated = false;
        for (url, place_entries) in places {
            let place_cutoff = self.handler.pending().get(&url).copied().unwrap_or(cutoff);
            let place = if gated {
                None
            } else {
                match self.place_json(&url, true).await {
                    Ok(place) => Some(place),
                    Err(e) => {
                        gated = matches!(e, ReporterError::Wait { .. });
                        warn!(error = %e, url = %url, "Place JSON unavailable; retrying next check");
                        None
                    }
                }
            };
            let Some(place) = place else {
                self.handler.set_pending(&url, place_cutoff);
                continue;
            };
            self.handler.clear_pending(&url);
            self.handler.mark_seen(place_entries.iter().copied());

            let summary = modification_summary(&place, place_cutoff);
            if summary.is_empty() {
                debug!(url = %url, "No modifications after cutoff");
                continue;
            }
            let newest = place_entries.iter().max_by_key(|e| e.when);
            let title = place
                .get("title")
                .and_then(Value::as_str)
                .map(|t| norm(t, &[], true))
                .or_else(|| newest.map(|e| e.title.clone()))
                .unwrap_or_else(|| url.clone());
            let when = newest.map(|e| e.when).unwrap_or(started);
            reports.push(
                Report::new(
                    self.base.name(),
                    format!("Pleiades place updated: {title}"),
                    summary,
                    when,
                )
                .with_url(url)
                .with_tags(["Pleiades", "AncientGeography"]),
            );
        }
        self.handler.set_last_check(started)?;
        sort_newest_first(&mut reports);
        info!(
            reporter = %self.base.name(),
            count = reports.len(),
            pending = self.handler.pending().len(),
            "Changes check complete"
        );
        Ok(reports)
    }
}
