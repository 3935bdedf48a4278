//! # contract: the trait seams between reporters, the web, and channels
//!
//! This module defines the interfaces the rest of the crate is written against:
//!
//! - [`WebClient`]: a polite HTTP GET client bound to one upstream host.
//! - [`Reporter`]: anything that can be checked for new [`Report`]s.
//! - [`Publisher`]: the remote API a channel posts statuses to.
//! - [`Channel`]: a queued dissemination target.
//!
//! Every trait is async and annotated for `mockall`, so tests can swap in
//! deterministic mocks for the network and for each other.
//! The plain request/response types and the error enums shared across the
//! seams live here too.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use thiserror::Error;

use crate::post::Post;
use crate::report::Report;
use crate::state::StateError;

/// A GET request for a [`WebClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct WebRequest {
    pub url: String,
    /// Extra headers on top of the client's defaults.
    pub headers: Vec<(String, String)>,
    /// Skip the response cache and go to the network.
    pub bypass_cache: bool,
}

impl WebRequest {
    pub fn new(url: impl Into<String>) -> Self {
        WebRequest {
            url: url.into(),
            headers: Vec::new(),
            bypass_cache: false,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bypass_cache(mut self, bypass: bool) -> Self {
        self.bypass_cache = bypass;
        self
    }
}

/// A response returned by a [`WebClient`], either live or from cache.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WebResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    #[serde(default)]
    pub from_cache: bool,
}

impl WebResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        WebResponse {
            status,
            headers: Vec::new(),
            body: body.into(),
            from_cache: false,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum WebError {
    #[error("Invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("Refusing request to '{got}': this client is bound to '{expected}'")]
    ForeignHost { expected: String, got: String },

    #[error("robots.txt disallows '{0}'")]
    RobotsDisallowed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Cache error: {0}")]
    Cache(String),
}

impl From<reqwest::Error> for WebError {
    fn from(e: reqwest::Error) -> Self {
        WebError::Transport(e.to_string())
    }
}

/// GET-only HTTP client used by every reporter.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait WebClient: Send + Sync {
    async fn get(&self, request: WebRequest) -> Result<WebResponse, WebError>;
}

#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("Invalid API Base Uri: '{0}'")]
    InvalidBaseUri(String),

    /// Request delay rules say we cannot make the request yet.
    #[error("Not allowed to make another request before {until}")]
    Wait { until: DateTime<Utc> },

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Unexpected response from {url}: {reason}")]
    Protocol { url: String, reason: String },

    #[error(transparent)]
    Web(#[from] WebError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Something that polls an upstream source and turns whatever is new into reports.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Reporter: Send {
    fn name(&self) -> String;

    /// Check upstream and return reports for anything new since the last check.
    async fn check(&mut self) -> Result<Vec<Report>, ReporterError>;
}

/// A status ready to send to a [`Publisher`].
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRequest {
    pub content: String,
    pub idempotency_key: String,
}

/// What the remote service tells us about a status it accepted.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct PublishedStatus {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid channel configuration: {0}")]
    Config(String),

    #[error(transparent)]
    State(#[from] StateError),
}

impl From<reqwest::Error> for ChannelError {
    fn from(e: reqwest::Error) -> Self {
        ChannelError::Transport(e.to_string())
    }
}

/// The remote API behind a channel.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, status: StatusRequest) -> Result<PublishedStatus, ChannelError>;
}

/// A queued dissemination channel.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Channel: Send {
    fn name(&self) -> String;

    /// Add posts to the queue; with `first` they go ahead of everything already queued.
    fn enqueue(&mut self, posts: Vec<Post>, first: bool) -> Result<(), ChannelError>;

    /// Remove all content from the queue.
    fn clear(&mut self) -> Result<(), ChannelError>;

    fn queued(&self) -> usize;

    /// The exact text that would be published for `post`.
    fn preview(&self, post: &Post) -> String;

    /// Publish the next `count` posts in the queue.
    async fn post_next(&mut self, count: usize) -> Result<Vec<PublishedStatus>, ChannelError>;

    /// Publish `post` immediately, bypassing the queue.
    async fn post_now(&mut self, post: Post) -> Result<PublishedStatus, ChannelError>;
}
