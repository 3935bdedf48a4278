//! High-level loop: checks reporters and releases channel queues on schedule.
//!
//! This is the orchestration that the binary's interactive loop drives once
//! per round:
//!   - [`Looper::check_reporters`] runs every reporter whose period has
//!     elapsed and returns this round's reports, newest first
//!   - [`Looper::publish`] turns reports the operator picked into posts and
//!     queues them on every channel
//!   - [`Looper::post_from_channels`] lets each due channel publish one post
//!
//! # Error Handling
//! One failing reporter or channel never stops the others: failures are
//! logged and the round carries on. The schedule is marked either way so a
//! broken upstream is not retried on every loop.

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::contract::{Channel, ChannelError, Reporter};
use crate::post::Post;
use crate::report::{sort_newest_first, Report};
use crate::schedule::Schedule;

pub struct Looper {
    reporters: Vec<Box<dyn Reporter>>,
    channels: Vec<Box<dyn Channel>>,
    schedule: Schedule,
}

impl Looper {
    pub fn new(schedule: Schedule) -> Self {
        Looper {
            reporters: Vec::new(),
            channels: Vec::new(),
            schedule,
        }
    }

    pub fn add_reporter(&mut self, reporter: Box<dyn Reporter>) {
        self.reporters.push(reporter);
    }

    pub fn add_channel(&mut self, channel: Box<dyn Channel>) {
        self.channels.push(channel);
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn reporter_names(&self) -> Vec<String> {
        self.reporters.iter().map(|r| r.name()).collect()
    }

    pub fn channels(&self) -> &[Box<dyn Channel>] {
        &self.channels
    }

    /// Run due reporters (all of them with `force`) and return the reports
    /// they produced this round, newest first.
    pub async fn check_reporters(&mut self, now: DateTime<Utc>, force: bool) -> Vec<Report> {
        let mut fresh = Vec::new();
        for reporter in self.reporters.iter_mut() {
            let name = reporter.name();
            if !force && !self.schedule.is_due(&name, now) {
                continue;
            }
            info!(reporter = %name, "Checking reporter");
            match reporter.check().await {
                Ok(reports) => {
                    info!(reporter = %name, count = reports.len(), "Reporter check succeeded");
                    fresh.extend(reports);
                }
                Err(e) => {
                    error!(reporter = %name, error = %e, "Reporter check failed");
                }
            }
            self.schedule.mark(&name, now);
        }
        sort_newest_first(&mut fresh);
        fresh
    }

    /// Queue the given reports as posts on every channel; returns the number
    /// of posts per channel.
    pub fn publish(&mut self, reports: &[Report]) -> Result<usize, ChannelError> {
        let posts: Vec<Post> = reports.iter().map(Report::to_post).collect();
        for channel in self.channels.iter_mut() {
            channel.enqueue(posts.clone(), false)?;
            info!(channel = %channel.name(), count = posts.len(), queued = channel.queued(), "Queued posts");
        }
        Ok(posts.len())
    }

    /// Let every due channel publish the next post in its queue. Returns how
    /// many posts went out.
    pub async fn post_from_channels(&mut self, now: DateTime<Utc>) -> usize {
        let mut published = 0;
        for channel in self.channels.iter_mut() {
            let name = channel.name();
            if !self.schedule.is_due(&name, now) {
                continue;
            }
            info!(channel = %name, "Posting from queue in channel");
            match channel.post_next(1).await {
                Ok(statuses) => published += statuses.len(),
                Err(e) => error!(channel = %name, error = %e, "Posting from queue failed"),
            }
            self.schedule.mark(&name, now);
        }
        published
    }
}
