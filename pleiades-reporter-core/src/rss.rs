//! Fetch RSS/Atom feeds and keep track of which entries have been seen.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::contract::{ReporterError, WebRequest};
use crate::reporter::ReporterBase;
use crate::state;
use crate::text::{norm, strip_tags};

/// What a feed handler remembers between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedState {
    /// Entry guid → ISO 8601 date of the entry.
    pub seen: BTreeMap<String, String>,
    pub last_check: Option<DateTime<Utc>>,
    /// Keys whose processing failed → the cutoff to retry them from.
    #[serde(default)]
    pub pending: BTreeMap<String, DateTime<Utc>>,
}

/// A feed entry reduced to what reporters need, with a date it can be sorted by.
#[derive(Debug, Clone, PartialEq)]
pub struct DatedEntry {
    pub guid: String,
    pub title: String,
    pub link: Option<String>,
    pub summary: Option<String>,
    pub when: DateTime<Utc>,
}

impl DatedEntry {
    pub fn iso_date(&self) -> String {
        self.when.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

pub struct FeedHandler {
    name: String,
    state_path: Option<PathBuf>,
    state: FeedState,
}

impl FeedHandler {
    /// Create a handler, loading its state from `{cache_dir}/{name}.json` when present.
    pub fn new(name: impl Into<String>, cache_dir: Option<&Path>) -> Result<Self, ReporterError> {
        let name = name.into();
        let state_path = cache_dir.map(|dir| dir.join(format!("{}.json", state::slug(&name))));
        let state = match &state_path {
            Some(path) => state::load_json::<FeedState>(path)?.unwrap_or_default(),
            None => FeedState::default(),
        };
        debug!(handler = %name, seen = state.seen.len(), "Feed handler ready");
        Ok(FeedHandler {
            name,
            state_path,
            state,
        })
    }

    /// Whether this feed has been read before (in this run or a previous one).
    pub fn has_state(&self) -> bool {
        !self.state.seen.is_empty() || self.state.last_check.is_some()
    }

    pub fn state(&self) -> &FeedState {
        &self.state
    }

    pub fn set_seen(&mut self, seen: BTreeMap<String, String>) {
        self.state.seen = seen;
    }

    pub fn last_check(&self) -> Option<DateTime<Utc>> {
        self.state.last_check
    }

    pub fn set_last_check(&mut self, when: DateTime<Utc>) -> Result<(), ReporterError> {
        self.state.last_check = Some(when);
        self.save()
    }

    /// Forget everything, in memory and on disk.
    pub fn reset(&mut self) -> Result<(), ReporterError> {
        self.state = FeedState::default();
        if let Some(path) = &self.state_path {
            state::remove(path)?;
        }
        info!(handler = %self.name, "Feed handler state reset");
        Ok(())
    }

    pub fn mark_seen<'a>(&mut self, entries: impl IntoIterator<Item = &'a DatedEntry>) {
        for entry in entries {
            self.state.seen.insert(entry.guid.clone(), entry.iso_date());
        }
    }

    pub fn pending(&self) -> &BTreeMap<String, DateTime<Utc>> {
        &self.state.pending
    }

    /// Remember `key` for a retry. An earlier cutoff already on record wins.
    pub fn set_pending(&mut self, key: &str, cutoff: DateTime<Utc>) {
        let slot = self.state.pending.entry(key.to_string()).or_insert(cutoff);
        *slot = (*slot).min(cutoff);
    }

    pub fn clear_pending(&mut self, key: &str) {
        self.state.pending.remove(key);
    }

    pub fn save(&self) -> Result<(), ReporterError> {
        if let Some(path) = &self.state_path {
            state::save_json(path, &self.state)?;
        }
        Ok(())
    }

    /// Parse a feed body into dated entries, newest first. Entries without a
    /// published or updated date are dated `fetched_at`.
    pub fn parse(
        feed_url: &str,
        body: &str,
        fetched_at: DateTime<Utc>,
    ) -> Result<Vec<DatedEntry>, ReporterError> {
        let feed = feed_rs::parser::parse(body.as_bytes()).map_err(|e| ReporterError::Protocol {
            url: feed_url.to_string(),
            reason: format!("unparseable feed: {e}"),
        })?;
        let mut entries: Vec<DatedEntry> = feed
            .entries
            .into_iter()
            .map(|entry| DatedEntry {
                guid: entry.id,
                title: entry
                    .title
                    .map(|t| norm(&t.content, &[], true))
                    .unwrap_or_default(),
                link: entry.links.first().map(|l| l.href.clone()),
                summary: entry
                    .summary
                    .map(|s| strip_tags(&s.content))
                    .filter(|s| !s.is_empty()),
                when: entry.published.or(entry.updated).unwrap_or(fetched_at),
            })
            .collect();
        entries.sort_by(|a, b| b.when.cmp(&a.when));
        Ok(entries)
    }

    /// Fetch the feed. With `filter`, entries already seen are dropped. Every
    /// entry returned is then marked as seen and the state is saved.
    pub async fn fetch(
        &mut self,
        feed_url: &str,
        base: &mut ReporterBase,
        filter: bool,
        bypass_cache: bool,
    ) -> Result<Vec<DatedEntry>, ReporterError> {
        let entries = self
            .fetch_unmarked(feed_url, base, filter, bypass_cache)
            .await?;
        self.mark_seen(&entries);
        self.save()?;
        Ok(entries)
    }

    /// Like [`FeedHandler::fetch`], but leaves marking to the caller.
    ///
    /// Guids that dropped out of the feed are forgotten here.
    pub async fn fetch_unmarked(
        &mut self,
        feed_url: &str,
        base: &mut ReporterBase,
        filter: bool,
        bypass_cache: bool,
    ) -> Result<Vec<DatedEntry>, ReporterError> {
        let response = base
            .web_get(WebRequest::new(feed_url).bypass_cache(bypass_cache))
            .await?;
        if !response.is_success() {
            return Err(ReporterError::Http {
                status: response.status,
                url: feed_url.to_string(),
            });
        }
        let mut entries = Self::parse(feed_url, &response.body, Utc::now())?;
        let total = entries.len();

        let present: HashSet<&str> = entries.iter().map(|e| e.guid.as_str()).collect();
        let before = self.state.seen.len();
        self.state.seen.retain(|guid, _| present.contains(guid.as_str()));
        if self.state.seen.len() < before {
            debug!(handler = %self.name, forgotten = before - self.state.seen.len(), "Forgot entries no longer in the feed");
        }

        if filter {
            entries.retain(|e| !self.state.seen.contains_key(&e.guid));
        }
        info!(
            handler = %self.name,
            feed_url,
            total,
            returned = entries.len(),
            filter,
            "Fetched feed"
        );
        Ok(entries)
    }
}
