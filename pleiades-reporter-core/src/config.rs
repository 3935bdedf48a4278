use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::schedule::{CHANNEL_PERIOD_SECS, NEW_PLACES_PERIOD_SECS, ZOTERO_PERIOD_SECS};
use crate::zotero::{PLEIADES_ITEMS_BASE_URL, PLEIADES_LIBRARY, ZOTERO_API_BASE};

/// Selects the kind of reporter to build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ReporterConfig {
    PleiadesNewPlaces(FeedReporterConfig),
    PleiadesChanges(FeedReporterConfig),
    PleiadesBlog(FeedReporterConfig),
    Zotero(ZoteroReporterConfig),
}

impl ReporterConfig {
    pub fn name(&self) -> &str {
        match self {
            ReporterConfig::PleiadesNewPlaces(c)
            | ReporterConfig::PleiadesChanges(c)
            | ReporterConfig::PleiadesBlog(c) => &c.name,
            ReporterConfig::Zotero(z) => &z.name,
        }
    }

    /// Seconds between checks, falling back to the default for the reporter type.
    pub fn period(&self) -> u64 {
        match self {
            ReporterConfig::PleiadesNewPlaces(c)
            | ReporterConfig::PleiadesChanges(c)
            | ReporterConfig::PleiadesBlog(c) => c.period.unwrap_or(NEW_PLACES_PERIOD_SECS),
            ReporterConfig::Zotero(z) => z.period.unwrap_or(ZOTERO_PERIOD_SECS),
        }
    }

    pub fn trace_loaded(&self) {
        match self {
            ReporterConfig::PleiadesNewPlaces(c) => {
                info!(name = %c.name, api_base_uri = %c.api_base_uri, period = self.period(), "Loaded Pleiades new-places reporter")
            }
            ReporterConfig::PleiadesChanges(c) => {
                info!(name = %c.name, api_base_uri = %c.api_base_uri, period = self.period(), "Loaded Pleiades changes reporter")
            }
            ReporterConfig::PleiadesBlog(c) => {
                info!(name = %c.name, api_base_uri = %c.api_base_uri, period = self.period(), "Loaded Pleiades blog reporter")
            }
            ReporterConfig::Zotero(z) => {
                info!(name = %z.name, library = %z.library, period = self.period(), "Loaded Zotero reporter")
            }
        }
        debug!(?self, "Reporter config (full debug)");
    }
}

/// Describes a reporter backed by a Pleiades RSS feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedReporterConfig {
    pub name: String,
    pub api_base_uri: String,
    #[serde(default)]
    pub period: Option<u64>,
}

/// Describes a reporter watching a Zotero library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoteroReporterConfig {
    pub name: String,
    #[serde(default = "default_zotero_api")]
    pub api_base_uri: String,
    #[serde(default = "default_zotero_library")]
    pub library: String,
    #[serde(default = "default_zotero_items")]
    pub items_base_url: String,
    #[serde(default)]
    pub period: Option<u64>,
}

fn default_zotero_api() -> String {
    ZOTERO_API_BASE.to_string()
}

fn default_zotero_library() -> String {
    PLEIADES_LIBRARY.to_string()
}

fn default_zotero_items() -> String {
    PLEIADES_ITEMS_BASE_URL.to_string()
}

/// Selects the kind of channel to build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelConfig {
    #[serde(rename = "gotosocial")]
    GoToSocial(GoToSocialChannelConfig),
}

impl ChannelConfig {
    pub fn name(&self) -> &str {
        match self {
            ChannelConfig::GoToSocial(g) => &g.name,
        }
    }

    pub fn period(&self) -> u64 {
        match self {
            ChannelConfig::GoToSocial(g) => g.period.unwrap_or(CHANNEL_PERIOD_SECS),
        }
    }

    pub fn trace_loaded(&self) {
        match self {
            ChannelConfig::GoToSocial(g) => info!(
                name = %g.name,
                api_base_url = %g.api_base_url,
                token_env = %g.access_token_env,
                period = self.period(),
                "Loaded GoToSocial channel"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoToSocialChannelConfig {
    pub name: String,
    pub api_base_url: String,
    /// Name of the environment variable holding the access token.
    #[serde(default = "default_token_env")]
    pub access_token_env: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_visibility")]
    pub visibility: String,
    #[serde(default)]
    pub max_characters: Option<usize>,
    #[serde(default)]
    pub period: Option<u64>,
}

fn default_token_env() -> String {
    "BOTSINBOX_ACCESS_TOKEN".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_visibility() -> String {
    "public".to_string()
}
