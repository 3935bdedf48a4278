//! Queued dissemination channels.
//!
//! [`QueuedChannel`] keeps a FIFO queue of [`Post`]s in front of any
//! [`Publisher`]. Posts are released a few at a time by [`Channel::post_next`]
//! so a batch of reports reaches followers gradually. When a cache directory
//! is configured the queue survives restarts.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::contract::{Channel, ChannelError, PublishedStatus, Publisher, StatusRequest};
use crate::post::Post;
use crate::state;
use crate::text::truncate_chars;

/// Render a post as status text: body, then a blank line and the hashtags.
/// With `max_characters`, the body is shortened so the tags always fit.
pub fn serialize_post(post: &Post, max_characters: Option<usize>) -> String {
    let tags = post
        .tags
        .iter()
        .map(|t| format!("#{t}"))
        .collect::<Vec<_>>()
        .join(" ");
    let suffix = if tags.is_empty() {
        String::new()
    } else {
        format!("\n\n{tags}")
    };
    let body = match max_characters {
        Some(max) => {
            let room = max.saturating_sub(suffix.chars().count());
            truncate_chars(&post.body, room)
        }
        None => post.body.clone(),
    };
    format!("{body}{suffix}")
}

pub struct QueuedChannel<P: Publisher> {
    name: String,
    publisher: P,
    queue: VecDeque<Post>,
    max_characters: Option<usize>,
    state_path: Option<PathBuf>,
}

impl<P: Publisher> QueuedChannel<P> {
    /// Create a channel, reloading any queue persisted under `cache_dir`.
    pub fn new(
        name: impl Into<String>,
        publisher: P,
        cache_dir: Option<&Path>,
    ) -> Result<Self, ChannelError> {
        let name = name.into();
        let state_path =
            cache_dir.map(|dir| dir.join(format!("channel-{}.json", state::slug(&name))));
        let queue: VecDeque<Post> = match &state_path {
            Some(path) => state::load_json::<Vec<Post>>(path)?
                .unwrap_or_default()
                .into(),
            None => VecDeque::new(),
        };
        info!(channel = %name, queued = queue.len(), "Initialised channel");
        Ok(QueuedChannel {
            name,
            publisher,
            queue,
            max_characters: None,
            state_path,
        })
    }

    pub fn with_max_characters(mut self, max: Option<usize>) -> Self {
        self.max_characters = max;
        self
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Posts in the order they will be published.
    pub fn queue(&self) -> impl Iterator<Item = &Post> {
        self.queue.iter()
    }

    fn save(&self) -> Result<(), ChannelError> {
        if let Some(path) = &self.state_path {
            let posts: Vec<&Post> = self.queue.iter().collect();
            state::save_json(path, &posts)?;
        }
        Ok(())
    }

    async fn send(&self, post: &Post) -> Result<PublishedStatus, ChannelError> {
        let status = StatusRequest {
            content: serialize_post(post, self.max_characters),
            idempotency_key: post.id.to_string(),
        };
        self.publisher.publish(status).await
    }
}

#[async_trait]
impl<P: Publisher> Channel for QueuedChannel<P> {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn enqueue(&mut self, posts: Vec<Post>, first: bool) -> Result<(), ChannelError> {
        let count = posts.len();
        if first {
            for post in posts.into_iter().rev() {
                self.queue.push_front(post);
            }
        } else {
            self.queue.extend(posts);
        }
        debug!(channel = %self.name, count, first, queued = self.queue.len(), "Enqueued posts");
        self.save()
    }

    fn clear(&mut self) -> Result<(), ChannelError> {
        self.queue.clear();
        info!(channel = %self.name, "Cleared queue");
        self.save()
    }

    fn queued(&self) -> usize {
        self.queue.len()
    }

    fn preview(&self, post: &Post) -> String {
        serialize_post(post, self.max_characters)
    }

    async fn post_next(&mut self, count: usize) -> Result<Vec<PublishedStatus>, ChannelError> {
        let mut published = Vec::new();
        for _ in 0..count {
            let Some(post) = self.queue.pop_front() else {
                debug!(channel = %self.name, "Queue is empty");
                break;
            };
            match self.send(&post).await {
                Ok(status) => {
                    info!(channel = %self.name, status_id = %status.id, remaining = self.queue.len(), "Published queued post");
                    published.push(status);
                    self.save()?;
                }
                Err(e) => {
                    error!(channel = %self.name, error = %e, "Publishing failed; post returned to the front of the queue");
                    self.queue.push_front(post);
                    self.save()?;
                    return Err(e);
                }
            }
        }
        Ok(published)
    }

    async fn post_now(&mut self, post: Post) -> Result<PublishedStatus, ChannelError> {
        let status = self.send(&post).await?;
        info!(channel = %self.name, status_id = %status.id, "Published post immediately");
        Ok(status)
    }
}
