//! The scroll-collection loop.
//!
//! The feed is virtualized and has no authoritative end, so the loop keys on
//! stability: once repeated scrolls stop surfacing new identity keys, the
//! feed is as collected as it is going to get.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use feedsift_browser::CdpConnection;
use feedsift_core::config::CollectionConfig;
use feedsift_core::{CollectedSet, Error, Post, Result};

use crate::ingest;
use crate::queries;

/// Why the collection loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The requested number of unique posts was reached.
    TargetReached,
    /// No new unique posts across the configured number of scrolls.
    Stalled,
    /// Repeated extraction passes produced nothing at all.
    Exhausted,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProbeResult {
    pub found: bool,
    pub has_content: bool,
    pub count: u64,
}

/// The rendered feed as the loop sees it. The production implementation
/// evaluates JavaScript over the debug connection; tests substitute fakes.
#[async_trait]
pub trait FeedPage: Send + Sync {
    async fn probe(&self) -> Result<ProbeResult>;
    async fn extract(&self) -> Result<Vec<Post>>;
    async fn scroll(&self) -> Result<()>;
}

/// Wait for the first rendered post. The bounded wait runs twice: a timeout
/// on the first pass is taken to mean an interactive login is in progress in
/// the headed browser, so the user gets one more full window before the run
/// fails.
pub async fn await_first_content(page: &dyn FeedPage, config: &CollectionConfig) -> Result<()> {
    if wait_for_content(page, config).await? {
        return Ok(());
    }
    info!("No posts appeared; assuming a login is needed. Waiting once more.");
    if wait_for_content(page, config).await? {
        return Ok(());
    }
    Err(Error::AuthenticationRequired(
        "timed out waiting for feed content; log in to the site in the browser window and retry"
            .to_string(),
    ))
}

async fn wait_for_content(page: &dyn FeedPage, config: &CollectionConfig) -> Result<bool> {
    let deadline = Instant::now() + Duration::from_millis(config.content_wait_ms);
    let interval = Duration::from_millis(config.poll_interval_ms);

    while Instant::now() < deadline {
        match page.probe().await {
            Ok(probe) => {
                if probe.found && probe.has_content {
                    info!(count = probe.count, "Feed content rendered");
                    return Ok(true);
                }
                if probe.found {
                    debug!(count = probe.count, "Post shells rendered, text still pending");
                }
            }
            // A timed-out probe is just a slow page; poll again.
            Err(Error::Timeout(e)) => debug!("Probe timed out: {}", e),
            Err(e) => return Err(e),
        }
        tokio::time::sleep(interval).await;
    }
    Ok(false)
}

/// Run extraction passes until the target is reached or the feed stops
/// yielding. Merges are first-occurrence-wins and capped at the target, so
/// the returned set never exceeds it.
pub async fn collect(
    page: &dyn FeedPage,
    config: &CollectionConfig,
) -> Result<(CollectedSet, StopReason)> {
    let mut set = CollectedSet::new();
    let mut stable_count: u32 = 0;
    let mut empty_count: u32 = 0;
    let scroll_delay = Duration::from_millis(config.scroll_delay_ms);

    loop {
        let extracted = match page.extract().await {
            Ok(posts) => posts,
            Err(Error::Timeout(e)) => {
                // Surfaced to us, handled by re-polling on the next pass.
                debug!("Extraction pass timed out: {}", e);
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        if extracted.is_empty() {
            empty_count += 1;
            if empty_count >= config.empty_view_retries {
                info!(
                    retries = empty_count,
                    "Nothing extractable after repeated passes, stopping"
                );
                return Ok((set, StopReason::Exhausted));
            }
            debug!(retry = empty_count, "Empty view, waiting before next pass");
            tokio::time::sleep(scroll_delay).await;
            continue;
        }
        empty_count = 0;

        let added = set.merge_capped(extracted, config.max_posts);
        info!(collected = set.len(), target = config.max_posts, added = added, "Merged pass");

        if set.len() >= config.max_posts {
            return Ok((set, StopReason::TargetReached));
        }

        if added == 0 {
            stable_count += 1;
            if stable_count >= config.stable_iterations {
                info!(
                    scrolls = stable_count,
                    "No new posts across consecutive scrolls, stopping"
                );
                return Ok((set, StopReason::Stalled));
            }
        } else {
            stable_count = 0;
        }

        page.scroll().await?;
        tokio::time::sleep(scroll_delay).await;
    }
}

/// Production [`FeedPage`] bound to an attached session.
pub struct CdpFeedPage<'a> {
    conn: &'a CdpConnection,
    session_id: String,
}

impl<'a> CdpFeedPage<'a> {
    pub fn new(conn: &'a CdpConnection, session_id: String) -> Self {
        Self { conn, session_id }
    }
}

#[async_trait]
impl FeedPage for CdpFeedPage<'_> {
    async fn probe(&self) -> Result<ProbeResult> {
        let value = self.conn.evaluate(&self.session_id, queries::PROBE_JS).await?;
        Ok(ProbeResult {
            found: value.get("found").and_then(Value::as_bool).unwrap_or(false),
            has_content: value
                .get("hasContent")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            count: value.get("count").and_then(Value::as_u64).unwrap_or(0),
        })
    }

    async fn extract(&self) -> Result<Vec<Post>> {
        let value = self
            .conn
            .evaluate(&self.session_id, queries::EXTRACT_JS)
            .await?;
        Ok(ingest::posts_from_value(&value))
    }

    async fn scroll(&self) -> Result<()> {
        self.conn
            .evaluate(&self.session_id, queries::SCROLL_JS)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn fast_config(max_posts: usize) -> CollectionConfig {
        CollectionConfig {
            max_posts,
            content_wait_ms: 40,
            poll_interval_ms: 1,
            stable_iterations: 5,
            empty_view_retries: 10,
            scroll_delay_ms: 0,
        }
    }

    fn post(url: &str) -> Post {
        Post {
            text: "text".to_string(),
            author_handle: "a".to_string(),
            author_name: "A".to_string(),
            likes: 0,
            reposts: 0,
            replies: 0,
            views: 0,
            posted_at: String::new(),
            url: url.to_string(),
            is_repost: false,
            is_thread: false,
            thread_length: 1,
            likely_thread: false,
        }
    }

    /// Renders a fixed script of extraction passes, repeating the last one.
    struct ScriptedPage {
        passes: Mutex<Vec<Vec<Post>>>,
        last: Vec<Post>,
        extract_calls: AtomicU32,
        scroll_calls: AtomicU32,
        content_after_probe: u32,
        probe_calls: AtomicU32,
    }

    impl ScriptedPage {
        fn repeating(pass: Vec<Post>) -> Self {
            Self {
                passes: Mutex::new(Vec::new()),
                last: pass,
                extract_calls: AtomicU32::new(0),
                scroll_calls: AtomicU32::new(0),
                content_after_probe: 0,
                probe_calls: AtomicU32::new(0),
            }
        }

        fn scripted(mut passes: Vec<Vec<Post>>) -> Self {
            let last = passes.last().cloned().unwrap_or_default();
            passes.reverse();
            Self {
                passes: Mutex::new(passes),
                last,
                extract_calls: AtomicU32::new(0),
                scroll_calls: AtomicU32::new(0),
                content_after_probe: 0,
                probe_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl FeedPage for ScriptedPage {
        async fn probe(&self) -> Result<ProbeResult> {
            let calls = self.probe_calls.fetch_add(1, Ordering::SeqCst) + 1;
            let ready = self.content_after_probe > 0 && calls >= self.content_after_probe;
            Ok(ProbeResult {
                found: ready,
                has_content: ready,
                count: if ready { 1 } else { 0 },
            })
        }

        async fn extract(&self) -> Result<Vec<Post>> {
            self.extract_calls.fetch_add(1, Ordering::SeqCst);
            let mut passes = self.passes.lock().unwrap();
            Ok(passes.pop().unwrap_or_else(|| self.last.clone()))
        }

        async fn scroll(&self) -> Result<()> {
            self.scroll_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_static_feed_stalls_after_exactly_n_iterations() {
        // A feed that always renders the same 2 posts, with a target of 50,
        // yields those 2 posts after exactly 5 stable iterations.
        let page = ScriptedPage::repeating(vec![post("https://x.com/a/1"), post("https://x.com/a/2")]);
        let config = fast_config(50);

        let (set, reason) = collect(&page, &config).await.unwrap();
        assert_eq!(reason, StopReason::Stalled);
        assert_eq!(set.len(), 2);
        // First pass adds both; five further stable passes trigger the stop.
        assert_eq!(page.extract_calls.load(Ordering::SeqCst), 6);
        assert_eq!(page.scroll_calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_new_posts_reset_stability() {
        let a = vec![post("https://x.com/a/1")];
        let ab = vec![post("https://x.com/a/1"), post("https://x.com/a/2")];
        // Four stable passes, then a new post, then stable until stall.
        let passes = vec![
            a.clone(),
            a.clone(),
            a.clone(),
            a.clone(),
            a.clone(),
            ab.clone(),
            ab.clone(),
        ];
        let page = ScriptedPage::scripted(passes);
        let config = fast_config(50);

        let (set, reason) = collect(&page, &config).await.unwrap();
        assert_eq!(reason, StopReason::Stalled);
        assert_eq!(set.len(), 2);
        // 1 first pass + 4 stable + 1 reset pass + 5 stable = 11 extracts.
        assert_eq!(page.extract_calls.load(Ordering::SeqCst), 11);
    }

    #[tokio::test]
    async fn test_target_reached_never_exceeds_target() {
        let pass: Vec<Post> = (0..8)
            .map(|i| post(&format!("https://x.com/a/{}", i)))
            .collect();
        let page = ScriptedPage::repeating(pass);
        let config = fast_config(5);

        let (set, reason) = collect(&page, &config).await.unwrap();
        assert_eq!(reason, StopReason::TargetReached);
        assert_eq!(set.len(), 5);
        // Reached within the first pass, no scroll needed.
        assert_eq!(page.scroll_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_feed_exhausts() {
        let page = ScriptedPage::repeating(Vec::new());
        let config = fast_config(50);

        let (set, reason) = collect(&page, &config).await.unwrap();
        assert_eq!(reason, StopReason::Exhausted);
        assert!(set.is_empty());
        assert_eq!(page.extract_calls.load(Ordering::SeqCst), 10);
        // Empty passes wait in place; they never scroll.
        assert_eq!(page.scroll_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_await_first_content_times_out_into_auth_error() {
        let page = ScriptedPage::repeating(Vec::new());
        let config = fast_config(50);

        let err = await_first_content(&page, &config).await.unwrap_err();
        assert!(matches!(err, Error::AuthenticationRequired(_)));
        // Both bounded phases ran.
        assert!(page.probe_calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_await_first_content_succeeds_once_content_renders() {
        let mut page = ScriptedPage::repeating(Vec::new());
        // Content appears after a few empty probes.
        page.content_after_probe = 5;
        let config = fast_config(50);

        assert!(await_first_content(&page, &config).await.is_ok());
    }
}
