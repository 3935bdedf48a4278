//! Report on activity in the Pleiades Zotero library.
//!
//! Uses the Zotero Web API v3. A library has a single version number that
//! increases with every change; the reporter remembers the last version it
//! saw and, when the library has moved on, asks for the top-level items
//! modified since then and keeps those *added* after the previous check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::contract::{Reporter, ReporterError, WebRequest, WebResponse};
use crate::dates::{dawn_of_time, parse_datetime};
use crate::report::{sort_newest_first, Report};
use crate::reporter::ReporterBase;
use crate::state;
use crate::text::norm;

pub const ZOTERO_API_BASE: &str = "https://api.zotero.org";
pub const PLEIADES_LIBRARY: &str = "groups/2533";
pub const PLEIADES_ITEMS_BASE_URL: &str = "https://www.zotero.org/groups/2533/items";
const API_VERSION: &str = "3";

#[derive(Debug, Clone)]
pub struct ZoteroSettings {
    /// Library path, e.g. `groups/2533` or `users/12345`.
    pub library: String,
    /// Where a human can view an item; the item key is appended.
    pub items_base_url: String,
    pub page_limit: usize,
    pub bypass_cache: bool,
}

impl Default for ZoteroSettings {
    fn default() -> Self {
        ZoteroSettings {
            library: PLEIADES_LIBRARY.to_string(),
            items_base_url: PLEIADES_ITEMS_BASE_URL.to_string(),
            page_limit: 100,
            bypass_cache: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ZoteroState {
    pub last_version: Option<u64>,
    /// Items added at or before this moment have been reported.
    pub last_check: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Creator {
    pub creator_type: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Single-field names (institutions).
    pub name: Option<String>,
}

impl Creator {
    fn short_name(&self) -> Option<String> {
        self.last_name
            .as_deref()
            .or(self.name.as_deref())
            .map(|n| norm(n, &[], true))
            .filter(|n| !n.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ZoteroItemData {
    pub item_type: String,
    pub title: String,
    pub short_title: String,
    pub creators: Vec<Creator>,
    pub date: String,
    pub date_added: String,
    pub publication_title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ZoteroItem {
    pub key: String,
    pub version: u64,
    pub data: ZoteroItemData,
}

fn year_pattern() -> &'static Regex {
    static YEAR: OnceLock<Regex> = OnceLock::new();
    YEAR.get_or_init(|| Regex::new(r"\b(\d{4})\b").expect("year pattern is valid"))
}

impl ZoteroItem {
    pub fn date_added(&self) -> Option<DateTime<Utc>> {
        parse_datetime(&self.data.date_added).ok()
    }

    pub fn display_title(&self) -> String {
        let title = if self.data.short_title.trim().is_empty() {
            &self.data.title
        } else {
            &self.data.short_title
        };
        let title = norm(title, &[], true);
        if title.is_empty() {
            "[untitled]".to_string()
        } else {
            title
        }
    }

    /// Short citation: creators (up to three, else the first plus "et al."),
    /// year, title, publication.
    pub fn citation(&self) -> String {
        let authors: Vec<&Creator> = self
            .data
            .creators
            .iter()
            .filter(|c| c.creator_type == "author")
            .collect();
        let chosen: Vec<&Creator> = if authors.is_empty() {
            self.data.creators.iter().collect()
        } else {
            authors
        };
        let names: Vec<String> = chosen.into_iter().filter_map(Creator::short_name).collect();
        let creators = match names.len() {
            0 => String::new(),
            1 => names[0].clone(),
            2 => format!("{} and {}", names[0], names[1]),
            3 => format!("{}, {} and {}", names[0], names[1], names[2]),
            _ => format!("{} et al.", names[0]),
        };
        let mut parts = Vec::new();
        if !creators.is_empty() {
            parts.push(creators);
        }
        if let Some(year) = year_pattern().captures(&self.data.date).and_then(|c| c.get(1)) {
            parts.push(format!("({})", year.as_str()));
        }
        let mut citation = parts.join(" ");
        let title = norm(&self.data.title, &[], true);
        if !title.is_empty() {
            if !citation.is_empty() {
                citation.push_str(". ");
            }
            citation.push_str(&title);
        }
        let publication = norm(&self.data.publication_title, &[], true);
        if !publication.is_empty() {
            citation.push_str(". ");
            citation.push_str(&publication);
        }
        if !citation.is_empty() && !citation.ends_with('.') {
            citation.push('.');
        }
        citation
    }
}

pub struct ZoteroReporter {
    base: ReporterBase,
    settings: ZoteroSettings,
    state: ZoteroState,
    state_path: Option<PathBuf>,
}

impl ZoteroReporter {
    pub fn new(
        base: ReporterBase,
        settings: ZoteroSettings,
        cache_dir: Option<&Path>,
    ) -> Result<Self, ReporterError> {
        let state_path =
            cache_dir.map(|dir| dir.join(format!("{}.json", state::slug(base.name()))));
        let state = match &state_path {
            Some(path) => state::load_json::<ZoteroState>(path)?.unwrap_or_default(),
            None => ZoteroState::default(),
        };
        info!(
            reporter = %base.name(),
            library = %settings.library,
            last_version = ?state.last_version,
            "Initialised Zotero reporter"
        );
        Ok(ZoteroReporter {
            base,
            settings,
            state,
            state_path,
        })
    }

    pub fn state(&self) -> &ZoteroState {
        &self.state
    }

    pub fn set_state(&mut self, state: ZoteroState) {
        self.state = state;
    }

    fn library_url(&self, path_and_query: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base.api_base_uri().trim_end_matches('/'),
            self.settings.library.trim_matches('/'),
            path_and_query
        )
    }

    fn request(&self, url: &str, bypass_cache: bool) -> WebRequest {
        WebRequest::new(url)
            .header("Zotero-API-Version", API_VERSION)
            .bypass_cache(bypass_cache)
    }

    fn header_number(response: &WebResponse, name: &str, url: &str) -> Result<u64, ReporterError> {
        response
            .header(name)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .ok_or_else(|| ReporterError::Protocol {
                url: url.to_string(),
                reason: format!("missing or invalid {name} header"),
            })
    }

    /// Current library version. With a reference version, a 304 answer means
    /// nothing changed and the reference is returned.
    pub async fn check_for_latest_version(
        &mut self,
        bypass_cache: bool,
        reference_version: Option<u64>,
    ) -> Result<u64, ReporterError> {
        let url = self.library_url("items/top?format=versions&limit=1");
        let mut request = self.request(&url, bypass_cache);
        if let Some(reference) = reference_version {
            request = request.header("If-Modified-Since-Version", reference.to_string());
        }
        let response = self.base.web_get(request).await?;
        match (response.status, reference_version) {
            (304, Some(reference)) => {
                debug!(reporter = %self.base.name(), version = reference, "Library unchanged");
                Ok(reference)
            }
            (200, _) => {
                let version = Self::header_number(&response, "Last-Modified-Version", &url)?;
                debug!(reporter = %self.base.name(), version, "Library version");
                Ok(version)
            }
            (status, _) => Err(ReporterError::Http { status, url }),
        }
    }

    /// All top-level items modified since `since_version`, across pages.
    pub async fn get_modified_records(
        &mut self,
        since_version: u64,
        bypass_cache: bool,
    ) -> Result<Vec<ZoteroItem>, ReporterError> {
        let mut items: Vec<ZoteroItem> = Vec::new();
        let mut start = 0usize;
        loop {
            let url = self.library_url(&format!(
                "items/top?since={}&format=json&include=data&sort=dateAdded&direction=desc&limit={}&start={}",
                since_version, self.settings.page_limit, start
            ));
            let request = self.request(&url, bypass_cache);
            let response = self.base.web_get(request).await?;
            if !response.is_success() {
                return Err(ReporterError::Http {
                    status: response.status,
                    url,
                });
            }
            let page: Vec<ZoteroItem> = serde_json::from_str(&response.body)?;
            let page_len = page.len();
            items.extend(page);
            let total = response
                .header("Total-Results")
                .and_then(|v| v.trim().parse::<usize>().ok());
            debug!(start, page_len, ?total, "Fetched page of modified Zotero items");
            start += page_len;
            if page_len == 0 || total.map(|t| start >= t).unwrap_or(page_len < self.settings.page_limit) {
                break;
            }
        }
        info!(reporter = %self.base.name(), since_version, count = items.len(), "Fetched modified Zotero items");
        Ok(items)
    }

    /// Modified items whose `dateAdded` is after `since_datetime`.
    pub async fn get_new_records(
        &mut self,
        since_version: u64,
        since_datetime: DateTime<Utc>,
        bypass_cache: bool,
    ) -> Result<Vec<ZoteroItem>, ReporterError> {
        let modified = self.get_modified_records(since_version, bypass_cache).await?;
        Ok(modified
            .into_iter()
            .filter(|item| match item.date_added() {
                Some(added) => added > since_datetime,
                None => {
                    warn!(key = %item.key, date_added = %item.data.date_added, "Zotero item has unreadable dateAdded");
                    false
                }
            })
            .collect())
    }

    pub fn item_report(&self, item: &ZoteroItem) -> Report {
        Report::new(
            self.base.name(),
            format!("New in the Pleiades Zotero library: {}", item.display_title()),
            item.citation(),
            item.date_added().unwrap_or_else(Utc::now),
        )
        .with_url(format!(
            "{}/{}",
            self.settings.items_base_url.trim_end_matches('/'),
            item.key
        ))
        .with_tags(["Pleiades", "Zotero", "Bibliography"])
    }

    fn save(&self) -> Result<(), ReporterError> {
        if let Some(path) = &self.state_path {
            state::save_json(path, &self.state)?;
        }
        Ok(())
    }

    async fn check_inner(&mut self) -> Result<Vec<Report>, ReporterError> {
        let bypass = self.settings.bypass_cache;
        let now = Utc::now();
        let Some(last_version) = self.state.last_version else {
            let version = self.check_for_latest_version(bypass, None).await?;
            self.state = ZoteroState {
                last_version: Some(version),
                last_check: Some(now),
            };
            self.save()?;
            info!(reporter = %self.base.name(), version, "Recorded baseline library version; nothing to report on first run");
            return Ok(Vec::new());
        };

        let latest = self.check_for_latest_version(bypass, Some(last_version)).await?;
        if latest <= last_version {
            self.state.last_check = Some(now);
            self.save()?;
            return Ok(Vec::new());
        }

        let since = self.state.last_check.unwrap_or_else(dawn_of_time);
        let new_items = self.get_new_records(last_version, since, bypass).await?;
        let mut reports: Vec<Report> = new_items.iter().map(|i| self.item_report(i)).collect();
        sort_newest_first(&mut reports);
        // Items can be added between `now` and the page requests.
        let newest_added = new_items.iter().filter_map(ZoteroItem::date_added).max();
        self.state = ZoteroState {
            last_version: Some(latest),
            last_check: Some(newest_added.map_or(now, |added| added.max(now))),
        };
        self.save()?;
        info!(reporter = %self.base.name(), version = latest, count = reports.len(), "Zotero check complete");
        Ok(reports)
    }
}

#[async_trait]
impl Reporter for ZoteroReporter {
    fn name(&self) -> String {
        self.base.name().to_string()
    }

    async fn check(&mut self) -> Result<Vec<Report>, ReporterError> {
        match self.check_inner().await {
            Err(ReporterError::Wait { until }) => {
                debug!(reporter = %self.base.name(), %until, "Zotero check postponed");
                Ok(Vec::new())
            }
            other => other,
        }
    }
}
