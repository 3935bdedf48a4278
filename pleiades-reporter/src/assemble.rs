//! Wire reporters, channels and the schedule together from a loaded config.

use anyhow::{Context, Result};
use pleiades_reporter_core::config::{ChannelConfig, ReporterConfig};
use pleiades_reporter_core::contract::Reporter;
use pleiades_reporter_core::go_to_social::{go_to_social_channel, GoToSocialSettings};
use pleiades_reporter_core::looper::Looper;
use pleiades_reporter_core::pleiades::{
    PleiadesChangesReporter, PleiadesFeedKind, PleiadesFeedReporter,
};
use pleiades_reporter_core::reporter::ReporterBase;
use pleiades_reporter_core::schedule::Schedule;
use pleiades_reporter_core::state::slug;
use pleiades_reporter_core::web::WebOptions;
use pleiades_reporter_core::zotero::{ZoteroReporter, ZoteroSettings};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::load_config::CliConfig;

fn state_dir(config: &CliConfig) -> PathBuf {
    config.cache_dir.join("state")
}

fn web_options(config: &CliConfig, reporter_name: &str) -> WebOptions {
    WebOptions {
        user_agent: config.user_agent.clone(),
        from: config.from.clone(),
        respect_robots_txt: config.respect_robots_txt,
        expire_after: Duration::from_secs(config.cache_expire_after),
        cache_control: true,
        cache_dir: Some(config.cache_dir.join("web").join(slug(reporter_name))),
        ..WebOptions::default()
    }
}

pub fn build_reporter(config: &CliConfig, reporter: &ReporterConfig) -> Result<Box<dyn Reporter>> {
    let state_dir = state_dir(config);
    let options = web_options(config, reporter.name());
    let built: Box<dyn Reporter> = match reporter {
        ReporterConfig::PleiadesNewPlaces(c) => {
            let base = ReporterBase::connect(&c.name, &c.api_base_uri, options)?;
            Box::new(PleiadesFeedReporter::new(
                base,
                PleiadesFeedKind::NewPlaces,
                Some(&state_dir),
            )?)
        }
        ReporterConfig::PleiadesBlog(c) => {
            let base = ReporterBase::connect(&c.name, &c.api_base_uri, options)?;
            Box::new(PleiadesFeedReporter::new(
                base,
                PleiadesFeedKind::Blog,
                Some(&state_dir),
            )?)
        }
        ReporterConfig::PleiadesChanges(c) => {
            let base = ReporterBase::connect(&c.name, &c.api_base_uri, options)?;
            Box::new(PleiadesChangesReporter::new(base, Some(&state_dir))?)
        }
        ReporterConfig::Zotero(z) => {
            let base = ReporterBase::connect(&z.name, &z.api_base_uri, options)?;
            let settings = ZoteroSettings {
                library: z.library.clone(),
                items_base_url: z.items_base_url.clone(),
                ..ZoteroSettings::default()
            };
            Box::new(ZoteroReporter::new(base, settings, Some(&state_dir))?)
        }
    };
    Ok(built)
}

/// Build the looper. With `with_channels` false no channel is created, which
/// is what one-off checks want.
pub fn build_looper(config: &CliConfig, with_channels: bool) -> Result<Looper> {
    let mut schedule = Schedule::new();
    let mut looper_reporters = Vec::new();
    for reporter in &config.reporters {
        schedule.set_period(reporter.name(), reporter.period());
        looper_reporters.push(
            build_reporter(config, reporter)
                .with_context(|| format!("Failed to build reporter '{}'", reporter.name()))?,
        );
    }

    let mut channels = Vec::new();
    if with_channels {
        for resolved in &config.channels {
            let ChannelConfig::GoToSocial(g) = &resolved.config;
            schedule.set_period(&g.name, resolved.config.period());
            let settings = GoToSocialSettings {
                api_base_url: g.api_base_url.clone(),
                access_token: resolved.access_token.clone(),
                language: g.language.clone(),
                visibility: g.visibility.clone(),
                user_agent: config.user_agent.clone(),
            };
            let channel =
                go_to_social_channel(&g.name, settings, g.max_characters, Some(&state_dir(config)))
                    .with_context(|| format!("Failed to build channel '{}'", g.name))?;
            channels.push(channel);
        }
    }

    let mut looper = Looper::new(schedule);
    for reporter in looper_reporters {
        looper.add_reporter(reporter);
    }
    for channel in channels {
        looper.add_channel(Box::new(channel));
    }
    info!(
        reporters = config.reporters.len(),
        channels = looper.channels().len(),
        "Assembled reporters and channels"
    );
    Ok(looper)
}
