//! # web: a polite HTTP client bound to a single upstream host
//!
//! [`PoliteClient`] is the only thing in the crate that talks HTTP to the
//! services being watched. It:
//!
//! - refuses requests to any host other than the one it was built for,
//! - always identifies itself with `User-Agent` and `From` headers,
//! - optionally honours `robots.txt` (including `Crawl-delay`),
//! - keeps an on-disk cache of successful responses, keyed by the SHA-256 of
//!   the URL, with a fixed lifetime or one taken from `Cache-Control`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, FROM};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use crate::contract::{WebClient, WebError, WebRequest, WebResponse};
use crate::dates::{end_of_time, later_by};
use crate::state;

/// Settings shared by every polite client.
#[derive(Debug, Clone)]
pub struct WebOptions {
    pub user_agent: String,
    pub from: String,
    pub respect_robots_txt: bool,
    /// Lifetime of a cached response when `Cache-Control` does not decide it.
    pub expire_after: Duration,
    /// Let the response's `Cache-Control` header decide whether and how long to cache.
    pub cache_control: bool,
    /// Where cached responses live; `None` disables the cache.
    pub cache_dir: Option<PathBuf>,
    pub timeout: Duration,
}

impl Default for WebOptions {
    fn default() -> Self {
        WebOptions {
            user_agent: crate::DEFAULT_USER_AGENT.to_string(),
            from: crate::DEFAULT_FROM.to_string(),
            respect_robots_txt: true,
            expire_after: Duration::from_secs(3600),
            cache_control: true,
            cache_dir: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// `host[:port]` of a URL, the unit a polite client is bound to.
pub fn netloc(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    url: String,
    response: WebResponse,
    fetched_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

pub struct PoliteClient {
    scheme: String,
    netloc: String,
    options: WebOptions,
    http: reqwest::Client,
    robots: OnceCell<RobotsRules>,
    last_request: Mutex<Option<Instant>>,
}

impl PoliteClient {
    /// Build a client for the network location of `base_url`.
    pub fn new(base_url: &str, options: WebOptions) -> Result<Self, WebError> {
        let url = Url::parse(base_url).map_err(|_| WebError::InvalidUrl(base_url.to_string()))?;
        let netloc = netloc(&url).ok_or_else(|| WebError::InvalidUrl(base_url.to_string()))?;

        let mut headers = HeaderMap::new();
        let from = HeaderValue::from_str(&options.from)
            .map_err(|e| WebError::Transport(format!("invalid From header: {e}")))?;
        headers.insert(FROM, from);
        let http = reqwest::Client::builder()
            .user_agent(options.user_agent.clone())
            .default_headers(headers)
            .timeout(options.timeout)
            .build()?;

        info!(
            netloc = %netloc,
            user_agent = %options.user_agent,
            robots = options.respect_robots_txt,
            cache = options.cache_dir.is_some(),
            "Initialised polite web client"
        );
        Ok(PoliteClient {
            scheme: url.scheme().to_string(),
            netloc,
            options,
            http,
            robots: OnceCell::new(),
            last_request: Mutex::new(None),
        })
    }

    pub fn netloc(&self) -> &str {
        &self.netloc
    }

    fn cache_path(&self, url: &str) -> Option<PathBuf> {
        let dir = self.options.cache_dir.as_ref()?;
        let digest = Sha256::digest(url.as_bytes());
        Some(dir.join(format!("{digest:x}.json")))
    }

    fn cached(&self, url: &str) -> Option<WebResponse> {
        let path = self.cache_path(url)?;
        match state::load_json::<CacheEntry>(&path) {
            Ok(Some(entry)) if entry.expires_at > Utc::now() && entry.url == url => {
                debug!(url, fetched_at = %entry.fetched_at, "Serving response from cache");
                let mut response = entry.response;
                response.from_cache = true;
                Some(response)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, url, "Ignoring unreadable cache entry");
                None
            }
        }
    }

    fn store(&self, url: &str, response: &WebResponse) {
        let Some(path) = self.cache_path(url) else {
            return;
        };
        let lifetime = if self.options.cache_control {
            match cache_lifetime(response.header("cache-control")) {
                CacheDirective::DoNotStore => return,
                CacheDirective::MaxAge(age) => age,
                CacheDirective::Default => self.options.expire_after,
            }
        } else {
            self.options.expire_after
        };
        let now = Utc::now();
        let expires_at = match chrono::Duration::from_std(lifetime) {
            Ok(lifetime) => later_by(now, lifetime),
            Err(_) => end_of_time(),
        };
        let entry = CacheEntry {
            url: url.to_string(),
            response: response.clone(),
            fetched_at: now,
            expires_at,
        };
        if let Err(e) = state::save_json(&path, &entry) {
            warn!(error = %e, url, "Failed to write cache entry");
        }
    }

    async fn robots_rules(&self) -> &RobotsRules {
        self.robots
            .get_or_init(|| async {
                let robots_url = format!("{}://{}/robots.txt", self.scheme, self.netloc);
                let agent = agent_token(&self.options.user_agent);
                match self.http.get(&robots_url).send().await {
                    Ok(resp) if resp.status().is_success() => match resp.text().await {
                        Ok(body) => {
                            info!(url = %robots_url, "Loaded robots.txt");
                            RobotsRules::parse(&body, &agent)
                        }
                        Err(e) => {
                            warn!(error = ?e, url = %robots_url, "Unreadable robots.txt, allowing all");
                            RobotsRules::allow_all()
                        }
                    },
                    Ok(resp) => {
                        debug!(status = %resp.status(), url = %robots_url, "No robots.txt, allowing all");
                        RobotsRules::allow_all()
                    }
                    Err(e) => {
                        warn!(error = ?e, url = %robots_url, "Failed to fetch robots.txt, allowing all");
                        RobotsRules::allow_all()
                    }
                }
            })
            .await
    }

    async fn pace(&self, crawl_delay: Option<Duration>) {
        let mut last = self.last_request.lock().await;
        if let (Some(delay), Some(previous)) = (crawl_delay, *last) {
            let elapsed = previous.elapsed();
            if elapsed < delay {
                let pause = delay - elapsed;
                debug!(pause_ms = pause.as_millis() as u64, "Honouring crawl delay");
                tokio::time::sleep(pause).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[async_trait]
impl WebClient for PoliteClient {
    async fn get(&self, request: WebRequest) -> Result<WebResponse, WebError> {
        let url = Url::parse(&request.url).map_err(|_| WebError::InvalidUrl(request.url.clone()))?;
        let target = netloc(&url).ok_or_else(|| WebError::InvalidUrl(request.url.clone()))?;
        if target != self.netloc {
            return Err(WebError::ForeignHost {
                expected: self.netloc.clone(),
                got: target,
            });
        }

        if !request.bypass_cache {
            if let Some(response) = self.cached(&request.url) {
                return Ok(response);
            }
        }

        let mut crawl_delay = None;
        if self.options.respect_robots_txt {
            let rules = self.robots_rules().await;
            let path = match url.query() {
                Some(q) => format!("{}?{}", url.path(), q),
                None => url.path().to_string(),
            };
            if !rules.is_allowed(&path) {
                warn!(url = %request.url, "robots.txt disallows request");
                return Err(WebError::RobotsDisallowed(request.url.clone()));
            }
            crawl_delay = rules.crawl_delay;
        }
        self.pace(crawl_delay).await;

        let mut builder = self.http.get(url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        debug!(url = %request.url, "Sending web request");
        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = resp.text().await?;
        let response = WebResponse {
            status,
            headers,
            body,
            from_cache: false,
        };
        info!(url = %request.url, status, bytes = response.body.len(), "Received web response");

        if response.is_success() {
            self.store(&request.url, &response);
        }
        Ok(response)
    }
}

#[derive(Debug, PartialEq)]
pub enum CacheDirective {
    DoNotStore,
    MaxAge(Duration),
    Default,
}

/// Interpret a `Cache-Control` response header.
pub fn cache_lifetime(header: Option<&str>) -> CacheDirective {
    let Some(header) = header else {
        return CacheDirective::Default;
    };
    let mut max_age = None;
    for directive in header.split(',').map(|d| d.trim().to_ascii_lowercase()) {
        if directive == "no-store" || directive == "no-cache" {
            return CacheDirective::DoNotStore;
        }
        if let Some(secs) = directive.strip_prefix("max-age=") {
            max_age = secs.trim().parse::<u64>().ok();
        }
    }
    match max_age {
        Some(0) => CacheDirective::DoNotStore,
        Some(secs) => CacheDirective::MaxAge(Duration::from_secs(secs)),
        None => CacheDirective::Default,
    }
}

/// Product token of a user agent string, lower-cased: `PleiadesReporter/0.1 (...)` → `pleiadesreporter`.
pub fn agent_token(user_agent: &str) -> String {
    user_agent
        .split(|c: char| c == '/' || c.is_whitespace())
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

#[derive(Debug, Clone)]
struct RobotsRule {
    allow: bool,
    pattern: String,
    matcher: Regex,
}

#[derive(Debug, Clone, Default)]
struct RobotsGroup {
    agents: Vec<String>,
    rules: Vec<RobotsRule>,
    crawl_delay: Option<Duration>,
}

/// The robots.txt rules that apply to one user agent.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    rules: Vec<RobotsRule>,
    pub crawl_delay: Option<Duration>,
}

impl RobotsRules {
    pub fn allow_all() -> Self {
        RobotsRules::default()
    }

    /// Parse robots.txt and keep the group for `agent` (a lower-case product
    /// token), falling back to the `*` group.
    pub fn parse(body: &str, agent: &str) -> Self {
        let mut groups: Vec<RobotsGroup> = Vec::new();
        let mut collecting_agents = false;

        for raw in body.lines() {
            let line = raw.split('#').next().unwrap_or_default().trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();
            match key.as_str() {
                "user-agent" => {
                    if !collecting_agents {
                        groups.push(RobotsGroup::default());
                    }
                    collecting_agents = true;
                    if let Some(group) = groups.last_mut() {
                        group.agents.push(value.to_ascii_lowercase());
                    }
                }
                "allow" | "disallow" => {
                    collecting_agents = false;
                    if value.is_empty() {
                        continue;
                    }
                    if let (Some(group), Some(matcher)) = (groups.last_mut(), rule_matcher(value)) {
                        group.rules.push(RobotsRule {
                            allow: key == "allow",
                            pattern: value.to_string(),
                            matcher,
                        });
                    }
                }
                "crawl-delay" => {
                    collecting_agents = false;
                    if let (Some(group), Ok(secs)) = (groups.last_mut(), value.parse::<f64>()) {
                        if let Ok(delay) = Duration::try_from_secs_f64(secs) {
                            group.crawl_delay = Some(delay);
                        }
                    }
                }
                _ => collecting_agents = false,
            }
        }

        let chosen = groups
            .iter()
            .find(|g| g.agents.iter().any(|a| a == agent))
            .or_else(|| groups.iter().find(|g| g.agents.iter().any(|a| a == "*")));
        match chosen {
            Some(group) => RobotsRules {
                rules: group.rules.clone(),
                crawl_delay: group.crawl_delay,
            },
            None => RobotsRules::allow_all(),
        }
    }

    /// Longest matching pattern wins; on a tie `Allow` beats `Disallow`.
    pub fn is_allowed(&self, path: &str) -> bool {
        let mut best: Option<&RobotsRule> = None;
        for rule in self.rules.iter().filter(|r| r.matcher.is_match(path)) {
            best = match best {
                None => Some(rule),
                Some(current) if rule.pattern.len() > current.pattern.len() => Some(rule),
                Some(current) if rule.pattern.len() == current.pattern.len() && rule.allow => {
                    Some(rule)
                }
                Some(current) => Some(current),
            };
        }
        best.map(|r| r.allow).unwrap_or(true)
    }
}

fn rule_matcher(pattern: &str) -> Option<Regex> {
    let (body, anchored) = match pattern.strip_suffix('$') {
        Some(body) => (body, true),
        None => (pattern, false),
    };
    let escaped = body
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    let source = if anchored {
        format!("^{escaped}$")
    } else {
        format!("^{escaped}")
    };
    Regex::new(&source).ok()
}
