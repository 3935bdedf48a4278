/// `load_config` module: Loads a static YAML config and injects channel secrets from the environment.
///
/// This module is the only place where user-supplied YAML is parsed and
/// mapped to the typed reporter and channel configurations of the core crate.
///
/// # Responsibilities
/// - Parse the YAML file into [`CliConfig`], filling in defaults
/// - Reject duplicate reporter or channel names (they key the schedule)
/// - Read each channel's access token from the environment variable it names
///
/// # Errors
/// All errors use `anyhow::Error` with context and are surfaced at the CLI boundary.
use anyhow::{bail, Context, Result};
use pleiades_reporter_core::config::{ChannelConfig, ReporterConfig};
use pleiades_reporter_core::schedule::LOOP_PERIOD_SECS;
use pleiades_reporter_core::{DEFAULT_FROM, DEFAULT_USER_AGENT};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default = "default_user_agent")]
    user_agent: String,
    #[serde(default = "default_from")]
    from: String,
    #[serde(default)]
    cache_dir: Option<PathBuf>,
    #[serde(default = "default_true")]
    respect_robots_txt: bool,
    #[serde(default = "default_expire_after")]
    cache_expire_after: u64,
    #[serde(default = "default_loop_period")]
    loop_period: u64,
    #[serde(default)]
    reporters: Vec<ReporterConfig>,
    #[serde(default)]
    channels: Vec<ChannelConfig>,
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_from() -> String {
    DEFAULT_FROM.to_string()
}

fn default_true() -> bool {
    true
}

fn default_expire_after() -> u64 {
    3600
}

fn default_loop_period() -> u64 {
    LOOP_PERIOD_SECS
}

/// A channel config together with the secret read from the environment.
#[derive(Debug, Clone)]
pub struct ResolvedChannel {
    pub config: ChannelConfig,
    pub access_token: String,
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub user_agent: String,
    pub from: String,
    pub cache_dir: PathBuf,
    pub respect_robots_txt: bool,
    pub cache_expire_after: u64,
    pub loop_period: u64,
    pub reporters: Vec<ReporterConfig>,
    pub channels: Vec<ResolvedChannel>,
}

impl CliConfig {
    pub fn trace_loaded(&self) {
        info!(
            user_agent = %self.user_agent,
            cache_dir = %self.cache_dir.display(),
            reporters = self.reporters.len(),
            channels = self.channels.len(),
            loop_period = self.loop_period,
            "Loaded Config"
        );
        for reporter in &self.reporters {
            reporter.trace_loaded();
        }
        for channel in &self.channels {
            channel.config.trace_loaded();
        }
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("pleiades_reporter")
}

/// Loads a static YAML config file (no secrets) and injects channel access tokens from env vars.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let raw: RawConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let mut names = HashSet::new();
    for name in raw
        .reporters
        .iter()
        .map(ReporterConfig::name)
        .chain(raw.channels.iter().map(ChannelConfig::name))
    {
        if !names.insert(name.to_string()) {
            error!(name, "Duplicate reporter/channel name in config");
            bail!("Duplicate reporter/channel name in config: '{name}'");
        }
    }

    let mut channels = Vec::with_capacity(raw.channels.len());
    for channel in raw.channels {
        let token_env = match &channel {
            ChannelConfig::GoToSocial(g) => g.access_token_env.clone(),
        };
        let access_token = std::env::var(&token_env)
            .with_context(|| format!("{token_env} environment variable not set (needed by channel '{}')", channel.name()))?;
        if access_token.trim().is_empty() {
            bail!("{token_env} environment variable is empty (needed by channel '{}')", channel.name());
        }
        info!(channel = %channel.name(), token_env = %token_env, "Access token found in env");
        channels.push(ResolvedChannel {
            config: channel,
            access_token,
        });
    }

    let config = CliConfig {
        user_agent: raw.user_agent,
        from: raw.from,
        cache_dir: raw.cache_dir.unwrap_or_else(default_cache_dir),
        respect_robots_txt: raw.respect_robots_txt,
        cache_expire_after: raw.cache_expire_after,
        loop_period: raw.loop_period,
        reporters: raw.reporters,
        channels,
    };
    config.trace_loaded();
    Ok(config)
}
