//! Supplementary-content expansion.
//!
//! Posts that look like thread roots, or whose text was cut off in the feed,
//! get a second look at their own permalink. Each post in a group opens a
//! dedicated tab; group size bounds how many tabs exist at once. A post that
//! fails its concurrent attempt gets exactly one serial retry on the primary
//! session after every group has settled. A post failing both attempts keeps
//! its feed-time state.

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use feedsift_browser::CdpConnection;
use feedsift_core::{Post, Result};

use crate::queries;

pub const THREAD_SEPARATOR: &str = "\n\n---\n\n";
/// Feed-side marker X renders at the end of cut-off post text.
pub const TRUNCATION_MARKER: &str = "[...]";
/// A permalink refetch may come back slightly shorter than the feed capture
/// (whitespace, stripped trailing link) and still be the same post. Anything
/// shorter than this is a falsely-truncated re-render and is rejected.
pub const TRUNCATION_SLACK: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandKind {
    /// Reassemble a multi-part composition by its author.
    Thread,
    /// Recover the full text of a visually truncated post.
    Truncated,
}

/// Fetches the author-scoped texts rendered on a post's permalink page.
/// The production implementation drives dedicated CDP targets; tests
/// substitute counting fakes.
#[async_trait]
pub trait PermalinkFetcher: Send + Sync {
    /// Fetch by opening a dedicated target for the post.
    async fn fetch_in_target(&self, url: &str, author_handle: &str) -> Result<Vec<String>>;
    /// Fetch by navigating the shared primary session. Used only by the
    /// serial retry pass.
    async fn fetch_on_primary(&self, url: &str, author_handle: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ExpansionStats {
    pub attempted: usize,
    pub expanded: usize,
    pub retried: usize,
    pub failed: usize,
}

/// True when the post should be offered to the thread pass.
pub fn wants_thread_expansion(post: &Post) -> bool {
    !post.is_repost && !post.url.is_empty() && post.likely_thread
}

/// True when the post should be offered to the truncation pass.
pub fn wants_truncation_expansion(post: &Post) -> bool {
    !post.is_repost
        && !post.url.is_empty()
        && !post.is_thread
        && post.text.ends_with(TRUNCATION_MARKER)
}

/// Apply the acceptance rule for `kind`. Returns true when the post was
/// actually modified; a fetch that came back but fails acceptance leaves the
/// post untouched.
pub fn apply_expansion(post: &mut Post, kind: ExpandKind, texts: Vec<String>) -> bool {
    match kind {
        ExpandKind::Thread => {
            // One part is just the post itself rendered on its permalink.
            if texts.len() <= 1 {
                return false;
            }
            post.thread_length = texts.len();
            post.text = texts.join(THREAD_SEPARATOR);
            post.is_thread = true;
            true
        }
        ExpandKind::Truncated => {
            let Some(full_text) = texts.into_iter().next() else {
                return false;
            };
            if full_text.is_empty() {
                return false;
            }
            let old_len = post.text.chars().count();
            let new_len = full_text.chars().count();
            if new_len + TRUNCATION_SLACK < old_len {
                debug!(
                    old_len = old_len,
                    new_len = new_len,
                    "Refetched text shorter than the feed capture, keeping original"
                );
                return false;
            }
            post.text = full_text;
            true
        }
    }
}

/// Expand every post in place. Posts are processed in fixed-size groups of
/// `concurrency`; a group fully settles, successes and failures alike,
/// before the next one starts. Failures collect for one serial retry on the
/// primary session; a second failure is logged and final.
pub async fn expand_many<F>(
    fetcher: &F,
    mut posts: Vec<&mut Post>,
    kind: ExpandKind,
    concurrency: usize,
) -> ExpansionStats
where
    F: PermalinkFetcher + ?Sized,
{
    let mut stats = ExpansionStats {
        attempted: posts.len(),
        ..Default::default()
    };
    if posts.is_empty() {
        return stats;
    }

    let group_size = concurrency.max(1);
    info!(
        posts = posts.len(),
        concurrency = group_size,
        kind = ?kind,
        "Expanding posts"
    );

    let mut failed: Vec<usize> = Vec::new();

    for (group_idx, group) in posts.chunks_mut(group_size).enumerate() {
        let outcomes = join_all(group.iter_mut().map(|post| {
            let post: &mut Post = post;
            async move {
                let texts = fetcher
                    .fetch_in_target(&post.url, &post.author_handle)
                    .await?;
                Ok::<bool, feedsift_core::Error>(apply_expansion(post, kind, texts))
            }
        }))
        .await;

        for (i, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(true) => stats.expanded += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(error = %e, "Expansion attempt failed, queued for retry");
                    failed.push(group_idx * group_size + i);
                }
            }
        }
        debug!(group = group_idx + 1, "Expansion group settled");
    }

    // Serial retry on the shared primary session; no new targets.
    if !failed.is_empty() {
        info!(count = failed.len(), "Retrying failed expansions serially");
    }
    for idx in failed {
        let post = &mut *posts[idx];
        match fetcher.fetch_on_primary(&post.url, &post.author_handle).await {
            Ok(texts) => {
                if apply_expansion(post, kind, texts) {
                    stats.expanded += 1;
                    stats.retried += 1;
                    info!(author = %post.author_handle, "Retry expanded post");
                }
            }
            Err(e) => {
                // Permanent, local: the post keeps its feed-time state.
                stats.failed += 1;
                warn!(author = %post.author_handle, error = %e, "Expansion failed twice, keeping original");
            }
        }
    }

    stats
}

/// Production fetcher bound to the run's connection.
pub struct CdpPermalinkFetcher<'a> {
    conn: &'a CdpConnection,
    primary_session: String,
    settle: Duration,
}

impl<'a> CdpPermalinkFetcher<'a> {
    pub fn new(conn: &'a CdpConnection, primary_session: String, settle: Duration) -> Self {
        Self {
            conn,
            primary_session,
            settle,
        }
    }

    async fn query_author_texts(&self, session_id: &str, author_handle: &str) -> Result<Vec<String>> {
        let value = self
            .conn
            .evaluate(session_id, &queries::author_texts_js(author_handle))
            .await?;
        Ok(value
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl PermalinkFetcher for CdpPermalinkFetcher<'_> {
    async fn fetch_in_target(&self, url: &str, author_handle: &str) -> Result<Vec<String>> {
        let target_id = self.conn.create_target(url).await?;

        let result = async {
            let session_id = self.conn.attach_to_target(&target_id).await?;
            tokio::time::sleep(self.settle).await;
            self.query_author_texts(&session_id, author_handle).await
        }
        .await;

        // The tab closes on success and failure alike; a close failure is
        // swallowed so it cannot mask the fetch outcome.
        if let Err(e) = self.conn.close_target(&target_id).await {
            debug!(error = %e, "closeTarget failed");
        }

        result
    }

    async fn fetch_on_primary(&self, url: &str, author_handle: &str) -> Result<Vec<String>> {
        self.conn.navigate(&self.primary_session, url).await?;
        tokio::time::sleep(self.settle).await;
        self.query_author_texts(&self.primary_session, author_handle)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedsift_core::Error;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn post(url: &str, text: &str) -> Post {
        Post {
            text: text.to_string(),
            author_handle: "alice".to_string(),
            author_name: "Alice".to_string(),
            likes: 0,
            reposts: 0,
            replies: 2,
            views: 0,
            posted_at: String::new(),
            url: url.to_string(),
            is_repost: false,
            is_thread: false,
            thread_length: 1,
            likely_thread: true,
        }
    }

    /// Counts concurrently open "targets" and records the high-water mark.
    struct CountingFetcher {
        open: AtomicUsize,
        max_open: AtomicUsize,
        primary_calls: AtomicUsize,
        fail_in_target: Mutex<HashSet<String>>,
        fail_on_primary: Mutex<HashSet<String>>,
        texts: Vec<String>,
    }

    impl CountingFetcher {
        fn returning(texts: Vec<&str>) -> Self {
            Self {
                open: AtomicUsize::new(0),
                max_open: AtomicUsize::new(0),
                primary_calls: AtomicUsize::new(0),
                fail_in_target: Mutex::new(HashSet::new()),
                fail_on_primary: Mutex::new(HashSet::new()),
                texts: texts.into_iter().map(str::to_string).collect(),
            }
        }

        fn fail_in_target_for(self, url: &str) -> Self {
            self.fail_in_target.lock().unwrap().insert(url.to_string());
            self
        }

        fn fail_on_primary_for(self, url: &str) -> Self {
            self.fail_on_primary.lock().unwrap().insert(url.to_string());
            self
        }
    }

    #[async_trait]
    impl PermalinkFetcher for CountingFetcher {
        async fn fetch_in_target(&self, url: &str, _author: &str) -> Result<Vec<String>> {
            let open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_open.fetch_max(open, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            let failing = self.fail_in_target.lock().unwrap().contains(url);
            self.open.fetch_sub(1, Ordering::SeqCst);
            if failing {
                return Err(Error::Protocol("target crashed".to_string()));
            }
            Ok(self.texts.clone())
        }

        async fn fetch_on_primary(&self, url: &str, _author: &str) -> Result<Vec<String>> {
            self.primary_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on_primary.lock().unwrap().contains(url) {
                return Err(Error::Timeout("primary fetch timed out".to_string()));
            }
            Ok(self.texts.clone())
        }
    }

    #[tokio::test]
    async fn test_concurrency_ceiling_holds() {
        let fetcher = CountingFetcher::returning(vec!["one", "two"]);
        let mut posts: Vec<Post> = (0..7)
            .map(|i| post(&format!("https://x.com/a/{}", i), "t"))
            .collect();

        let stats = expand_many(
            &fetcher,
            posts.iter_mut().collect(),
            ExpandKind::Thread,
            3,
        )
        .await;

        assert_eq!(stats.attempted, 7);
        assert_eq!(stats.expanded, 7);
        assert!(fetcher.max_open.load(Ordering::SeqCst) <= 3);
        assert_eq!(fetcher.primary_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_thread_merges_parts_in_order() {
        let fetcher = CountingFetcher::returning(vec!["part 1", "part 2", "part 3", "part 4"]);
        let mut p = post("https://x.com/a/1", "part 1");

        expand_many(&fetcher, vec![&mut p], ExpandKind::Thread, 3).await;

        assert!(p.is_thread);
        assert_eq!(p.thread_length, 4);
        assert_eq!(
            p.text,
            "part 1\n\n---\n\npart 2\n\n---\n\npart 3\n\n---\n\npart 4"
        );
    }

    #[tokio::test]
    async fn test_single_part_is_not_a_thread() {
        let fetcher = CountingFetcher::returning(vec!["just the one"]);
        let mut p = post("https://x.com/a/1", "just the one");

        let stats = expand_many(&fetcher, vec![&mut p], ExpandKind::Thread, 3).await;

        assert_eq!(stats.expanded, 0);
        assert!(!p.is_thread);
        assert_eq!(p.thread_length, 1);
    }

    #[tokio::test]
    async fn test_truncated_accepts_longer_refetch() {
        let fetcher =
            CountingFetcher::returning(vec!["the whole text, no longer cut off anywhere"]);
        let mut p = post("https://x.com/a/1", "the whole text, n[...]");

        let stats = expand_many(&fetcher, vec![&mut p], ExpandKind::Truncated, 3).await;

        assert_eq!(stats.expanded, 1);
        assert_eq!(p.text, "the whole text, no longer cut off anywhere");
    }

    #[tokio::test]
    async fn test_truncated_rejects_shorter_refetch() {
        // Three characters shorter than the capture: a falsely-truncated
        // re-render, so the original is retained.
        let original = "twenty characters!!!";
        let refetched = "twenty characters";
        let fetcher = CountingFetcher::returning(vec![refetched]);
        let mut p = post("https://x.com/a/1", original);

        let stats = expand_many(&fetcher, vec![&mut p], ExpandKind::Truncated, 3).await;

        assert_eq!(stats.expanded, 0);
        assert_eq!(p.text, original);
    }

    #[tokio::test]
    async fn test_failed_concurrent_attempt_retries_serially() {
        let fetcher = CountingFetcher::returning(vec!["part 1", "part 2"])
            .fail_in_target_for("https://x.com/a/1");
        let mut bad = post("https://x.com/a/1", "part 1");
        let mut good = post("https://x.com/a/2", "part 1");

        let stats = expand_many(
            &fetcher,
            vec![&mut bad, &mut good],
            ExpandKind::Thread,
            3,
        )
        .await;

        // The sibling was unaffected and the failure recovered on retry.
        assert_eq!(stats.expanded, 2);
        assert_eq!(stats.retried, 1);
        assert_eq!(stats.failed, 0);
        assert!(bad.is_thread);
        assert!(good.is_thread);
        assert_eq!(fetcher.primary_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_double_failure_keeps_original_state() {
        let fetcher = CountingFetcher::returning(vec!["part 1", "part 2"])
            .fail_in_target_for("https://x.com/a/1")
            .fail_on_primary_for("https://x.com/a/1");
        let mut p = post("https://x.com/a/1", "original text");

        let stats = expand_many(&fetcher, vec![&mut p], ExpandKind::Thread, 3).await;

        assert_eq!(stats.expanded, 0);
        assert_eq!(stats.failed, 1);
        assert_eq!(p.text, "original text");
        assert!(!p.is_thread);
        // Exactly one retry, never more.
        assert_eq!(fetcher.primary_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_selection_predicates() {
        let mut p = post("https://x.com/a/1", "cut off [...]");
        assert!(wants_thread_expansion(&p));
        assert!(wants_truncation_expansion(&p));

        p.is_thread = true;
        assert!(!wants_truncation_expansion(&p));
        p.is_thread = false;

        p.url.clear();
        assert!(!wants_thread_expansion(&p));
        assert!(!wants_truncation_expansion(&p));
        p.url = "https://x.com/a/1".to_string();

        p.is_repost = true;
        assert!(!wants_thread_expansion(&p));
        assert!(!wants_truncation_expansion(&p));
    }
}
