//! Post statuses to a GoToSocial instance through the Mastodon client API.

use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

use crate::channel::QueuedChannel;
use crate::contract::{ChannelError, PublishedStatus, Publisher, StatusRequest};

pub type GoToSocialChannel = QueuedChannel<GoToSocialClient>;

#[derive(Debug, Clone)]
pub struct GoToSocialSettings {
    pub api_base_url: String,
    pub access_token: String,
    pub language: String,
    /// `public`, `unlisted`, `private` or `direct`.
    pub visibility: String,
    pub user_agent: String,
}

#[derive(Serialize)]
struct StatusBody<'a> {
    status: &'a str,
    language: &'a str,
    visibility: &'a str,
}

pub struct GoToSocialClient {
    statuses_url: Url,
    settings: GoToSocialSettings,
    http: reqwest::Client,
}

impl GoToSocialClient {
    pub fn new(settings: GoToSocialSettings) -> Result<Self, ChannelError> {
        let base = Url::parse(&settings.api_base_url).map_err(|e| {
            ChannelError::Config(format!("invalid api_base_url '{}': {e}", settings.api_base_url))
        })?;
        let statuses_url = base
            .join("/api/v1/statuses")
            .map_err(|e| ChannelError::Config(format!("cannot build statuses URL: {e}")))?;
        if settings.access_token.trim().is_empty() {
            return Err(ChannelError::Config("access token is empty".to_string()));
        }
        let http = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(Duration::from_secs(30))
            .build()?;
        info!(api_base_url = %settings.api_base_url, "Initialised GoToSocial client");
        Ok(GoToSocialClient {
            statuses_url,
            settings,
            http,
        })
    }

    pub fn statuses_url(&self) -> &str {
        self.statuses_url.as_str()
    }
}

#[async_trait]
impl Publisher for GoToSocialClient {
    async fn publish(&self, status: StatusRequest) -> Result<PublishedStatus, ChannelError> {
        let body = StatusBody {
            status: &status.content,
            language: &self.settings.language,
            visibility: &self.settings.visibility,
        };
        let resp = self
            .http
            .post(self.statuses_url.clone())
            .bearer_auth(&self.settings.access_token)
            .header("Idempotency-Key", &status.idempotency_key)
            .json(&body)
            .send()
            .await?;
        let code = resp.status();
        if !code.is_success() {
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| String::from("<Failed to decode response body>"));
            error!(status = %code, url = %self.statuses_url, "Status post rejected");
            return Err(ChannelError::Api {
                status: code.as_u16(),
                body: text,
            });
        }
        let published: PublishedStatus = resp.json().await?;
        info!(status_id = %published.id, url = ?published.url, "Status posted");
        Ok(published)
    }
}

/// A GoToSocial channel with its queue persisted under `cache_dir`.
pub fn go_to_social_channel(
    name: impl Into<String>,
    settings: GoToSocialSettings,
    max_characters: Option<usize>,
    cache_dir: Option<&Path>,
) -> Result<GoToSocialChannel, ChannelError> {
    let client = GoToSocialClient::new(settings)?;
    Ok(QueuedChannel::new(name, client, cache_dir)?.with_max_characters(max_characters))
}
