use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unit of content queued on a channel: body text plus hashtags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Stable identity, also used as the idempotency key when publishing.
    pub id: Uuid,
    pub body: String,
    /// Tags without the leading `#`.
    pub tags: Vec<String>,
}

impl Post {
    pub fn new(body: impl Into<String>, tags: Vec<String>) -> Self {
        Post {
            id: Uuid::new_v4(),
            body: body.into(),
            tags: tags.iter().filter_map(|t| clean_tag(t)).collect(),
        }
    }
}

fn clean_tag(tag: &str) -> Option<String> {
    let cleaned: String = tag
        .trim_start_matches('#')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}
