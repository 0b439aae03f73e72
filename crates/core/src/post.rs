//! Post item model and the deduplicating collected set.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How many leading characters of the text participate in the fallback
/// identity key when a post has no permalink.
const KEY_TEXT_PREFIX: usize = 20;

/// A single extracted post. Every field is always present in output;
/// extraction substitutes placeholders where the page gave nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub text: String,
    pub author_handle: String,
    pub author_name: String,
    pub likes: u64,
    pub reposts: u64,
    pub replies: u64,
    pub views: u64,
    /// ISO-8601 timestamp as rendered by the page, empty if absent.
    pub posted_at: String,
    /// Canonical permalink, empty if the page exposed none.
    pub url: String,
    pub is_repost: bool,
    pub is_thread: bool,
    pub thread_length: usize,
    /// Capture-time hint that the post may root a thread (it had replies).
    #[serde(default)]
    pub likely_thread: bool,
}

impl Post {
    /// Deduplication key: the permalink when present, otherwise the author
    /// handle plus a short text prefix. Never empty, because extraction only
    /// admits elements with at least one of handle, url, or text.
    pub fn identity_key(&self) -> String {
        if !self.url.is_empty() {
            return self.url.clone();
        }
        let prefix: String = self.text.chars().take(KEY_TEXT_PREFIX).collect();
        format!("{}:{}", self.author_handle, prefix)
    }
}

/// Insertion-ordered set of posts keyed by identity key.
///
/// First occurrence wins on merge: a partial re-render of an already-seen
/// post never overwrites the earlier, complete capture. Size only grows.
#[derive(Debug, Default)]
pub struct CollectedSet {
    index: HashMap<String, usize>,
    posts: Vec<Post>,
}

impl CollectedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Insert a post unless its key is already present. Returns true when
    /// the post was newly added.
    pub fn insert(&mut self, post: Post) -> bool {
        let key = post.identity_key();
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key, self.posts.len());
        self.posts.push(post);
        true
    }

    /// Merge one extraction pass. Returns how many posts were new.
    pub fn merge(&mut self, posts: Vec<Post>) -> usize {
        let mut added = 0;
        for post in posts {
            if self.insert(post) {
                added += 1;
            }
        }
        added
    }

    /// Merge, but never grow past `cap`. The final set size is bounded by
    /// the requested target even when a single pass renders more new posts
    /// than the remaining budget.
    pub fn merge_capped(&mut self, posts: Vec<Post>, cap: usize) -> usize {
        let mut added = 0;
        for post in posts {
            if self.posts.len() >= cap {
                break;
            }
            if self.insert(post) {
                added += 1;
            }
        }
        added
    }

    /// Consume the set, yielding posts in first-seen order.
    pub fn into_posts(self) -> Vec<Post> {
        self.posts
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }
}
