//! Basic reporter setup shared by every concrete reporter: base URI
//! validation, the web client, and the request gate that keeps us from
//! hammering upstream services.

use chrono::{DateTime, Duration, Utc};
use reqwest::Url;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::contract::{ReporterError, WebClient, WebRequest, WebResponse};
use crate::dates::{dawn_of_time, end_of_time, later_by, parse_datetime};
use crate::web::{PoliteClient, WebOptions};

pub struct ReporterBase {
    name: String,
    api_base_uri: String,
    web: Arc<dyn WebClient>,
    last_web_request: DateTime<Utc>,
    /// Do not make another request before this moment.
    wait_until: DateTime<Utc>,
    /// Seconds to wait after each request before the next one is allowed.
    wait_every_time: Duration,
}

impl ReporterBase {
    pub fn new(
        name: impl Into<String>,
        api_base_uri: &str,
        web: Arc<dyn WebClient>,
    ) -> Result<Self, ReporterError> {
        validate_base_uri(api_base_uri)?;
        let name = name.into();
        info!(reporter = %name, api_base_uri, "Initialised reporter");
        Ok(ReporterBase {
            name,
            api_base_uri: api_base_uri.to_string(),
            web,
            last_web_request: dawn_of_time(),
            wait_until: dawn_of_time(),
            wait_every_time: Duration::zero(),
        })
    }

    /// Build a reporter base with a [`PoliteClient`] bound to the URI's host.
    pub fn connect(
        name: impl Into<String>,
        api_base_uri: &str,
        options: WebOptions,
    ) -> Result<Self, ReporterError> {
        validate_base_uri(api_base_uri)?;
        let client = PoliteClient::new(api_base_uri, options)?;
        Self::new(name, api_base_uri, Arc::new(client))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn api_base_uri(&self) -> &str {
        &self.api_base_uri
    }

    pub fn last_web_request(&self) -> DateTime<Utc> {
        self.last_web_request
    }

    pub fn wait_until(&self) -> DateTime<Utc> {
        self.wait_until
    }

    pub fn set_wait_every_time(&mut self, wait: Duration) {
        self.wait_every_time = wait;
    }

    /// GET through the web client, unless request delay rules say not yet.
    ///
    /// Honours `Backoff` on any response and `Retry-After` on 429/503, both in
    /// seconds. A 429/503 is returned as [`ReporterError::Http`].
    pub async fn web_get(&mut self, request: WebRequest) -> Result<WebResponse, ReporterError> {
        let now = Utc::now();
        if now < self.wait_until {
            debug!(reporter = %self.name, until = %self.wait_until, "Request delayed by wait rules");
            return Err(ReporterError::Wait {
                until: self.wait_until,
            });
        }

        let url = request.url.clone();
        let response = self.web.get(request).await?;
        if response.from_cache {
            return Ok(response);
        }

        let now = Utc::now();
        self.last_web_request = now;
        self.wait_until = later_by(now, self.wait_every_time);

        if let Some(value) = response.header("backoff") {
            match parse_delay(value).and_then(|d| delayed(now, d)) {
                Some(until) => {
                    warn!(reporter = %self.name, until = %until, "Upstream asked us to back off");
                    self.wait_until = self.wait_until.max(until);
                }
                None => warn!(reporter = %self.name, value, "Ignoring unusable Backoff header"),
            }
        }
        if response.status == 429 || response.status == 503 {
            if let Some(value) = response.header("retry-after") {
                match parse_retry_after(now, value) {
                    Some(retry) => {
                        warn!(reporter = %self.name, status = response.status, retry_after = %retry, "Upstream asked us to retry later");
                        self.wait_until = self.wait_until.max(retry);
                    }
                    None => warn!(reporter = %self.name, value, "Ignoring unusable Retry-After header"),
                }
            }
            return Err(ReporterError::Http {
                status: response.status,
                url,
            });
        }
        Ok(response)
    }
}

fn validate_base_uri(api_base_uri: &str) -> Result<(), ReporterError> {
    match Url::parse(api_base_uri) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => Ok(()),
        _ => Err(ReporterError::InvalidBaseUri(api_base_uri.to_string())),
    }
}

/// Delay in seconds. `None` when unreadable or out of range.
fn parse_delay(value: &str) -> Option<Duration> {
    value.trim().parse::<i64>().ok().and_then(Duration::try_seconds)
}

/// `Retry-After` is either delay-seconds or an HTTP date.
fn parse_retry_after(now: DateTime<Utc>, value: &str) -> Option<DateTime<Utc>> {
    if value.trim().parse::<i64>().is_ok() {
        return parse_delay(value).and_then(|d| delayed(now, d));
    }
    parse_datetime(value).ok()
}

/// `now + delay`, or `None` when that lands past [`end_of_time`].
fn delayed(now: DateTime<Utc>, delay: Duration) -> Option<DateTime<Utc>> {
    now.checked_add_signed(delay)
        .filter(|until| *until < end_of_time())
}
