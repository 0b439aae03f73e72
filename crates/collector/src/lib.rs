//! Drives a full scrape: launch Chrome, connect to its debug endpoint,
//! attach to the feed page, run the collection loop, expand threads and
//! truncated posts, and tear everything down on every exit path.

pub mod collect;
pub mod expand;
pub mod ingest;
pub mod queries;

pub use collect::{await_first_content, CdpFeedPage, FeedPage, ProbeResult, StopReason};
pub use expand::{
    expand_many, CdpPermalinkFetcher, ExpandKind, ExpansionStats, PermalinkFetcher,
};

use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use feedsift_browser::{chrome, CdpConnection, ChromeHandle};
use feedsift_core::config::{BrowserConfig, Config};
use feedsift_core::{FeedSource, Post, Result};

/// Settle before the second navigation step on home/bookmarks sources.
const NAV_PRE_SETTLE: Duration = Duration::from_secs(2);
/// Settle after issuing the navigation, before touching the session again.
const NAV_POST_SETTLE: Duration = Duration::from_secs(3);
/// Settle before the first content probe.
const FEED_SETTLE: Duration = Duration::from_secs(3);

#[derive(Debug)]
pub struct ScrapeResult {
    /// Unique posts in first-seen order, expansion already applied.
    pub posts: Vec<Post>,
    pub stop: StopReason,
    pub threads: ExpansionStats,
    pub truncated: ExpansionStats,
}

/// Run one full extraction against a launched browser. The browser process
/// and the connection are cleaned up whether the run succeeds or fails.
pub async fn scrape(
    source: &FeedSource,
    config: &Config,
    chrome_path: &str,
    profile_dir: &Path,
) -> Result<ScrapeResult> {
    let port = chrome::find_free_port().await?;
    info!(source = %source.display_name, url = %source.url, "Starting scrape");

    let chrome_handle =
        ChromeHandle::launch(chrome_path, profile_dir, port, source.initial_url()).await?;

    let conn = match connect(port, &config.browser).await {
        Ok(conn) => conn,
        Err(e) => {
            chrome_handle.shutdown(None).await;
            return Err(e);
        }
    };

    let result = run(&conn, source, config).await;
    chrome_handle.shutdown(Some(&conn)).await;
    result
}

async fn connect(port: u16, browser: &BrowserConfig) -> Result<CdpConnection> {
    let ws_url =
        chrome::wait_for_debug_port(port, Duration::from_millis(browser.launch_timeout_ms)).await?;
    CdpConnection::connect(
        &ws_url,
        Duration::from_millis(browser.connect_timeout_ms),
        Duration::from_millis(browser.command_timeout_ms),
    )
    .await
}

async fn run(conn: &CdpConnection, source: &FeedSource, config: &Config) -> Result<ScrapeResult> {
    let session_id = open_feed_session(conn, source).await?;

    if source.needs_navigation() {
        info!(url = %source.url, "Navigating to feed");
        tokio::time::sleep(NAV_PRE_SETTLE).await;
        conn.navigate(&session_id, &source.url).await?;
        tokio::time::sleep(NAV_POST_SETTLE).await;
    }
    tokio::time::sleep(FEED_SETTLE).await;

    let page = CdpFeedPage::new(conn, session_id.clone());
    await_first_content(&page, &config.collection).await?;

    let (set, stop) = collect::collect(&page, &config.collection).await?;
    let mut posts = set.into_posts();
    info!(collected = posts.len(), stop = ?stop, "Collection finished");

    let fetcher = CdpPermalinkFetcher::new(
        conn,
        session_id,
        Duration::from_millis(config.expansion.settle_ms),
    );

    let thread_candidates: Vec<&mut Post> = posts
        .iter_mut()
        .filter(|p| expand::wants_thread_expansion(p))
        .collect();
    let threads = expand_many(
        &fetcher,
        thread_candidates,
        ExpandKind::Thread,
        config.expansion.concurrency,
    )
    .await;

    let truncated_candidates: Vec<&mut Post> = posts
        .iter_mut()
        .filter(|p| expand::wants_truncation_expansion(p))
        .collect();
    let truncated = expand_many(
        &fetcher,
        truncated_candidates,
        ExpandKind::Truncated,
        config.expansion.concurrency,
    )
    .await;

    Ok(ScrapeResult {
        posts,
        stop,
        threads,
        truncated,
    })
}

/// Attach to the feed page: reuse an existing page target already on the
/// feed host, otherwise open one. Page and Runtime notifications are enabled
/// on the returned session.
async fn open_feed_session(conn: &CdpConnection, source: &FeedSource) -> Result<String> {
    let targets = conn.get_targets().await?;
    let existing = targets.iter().find_map(|t| {
        let is_page = t.get("type").and_then(Value::as_str) == Some("page");
        let on_host = t
            .get("url")
            .and_then(Value::as_str)
            .is_some_and(|u| u.contains("x.com"));
        if is_page && on_host {
            t.get("targetId")
                .and_then(Value::as_str)
                .map(str::to_string)
        } else {
            None
        }
    });

    let target_id = match existing {
        Some(id) => {
            debug!(target = %id, "Reusing existing page target");
            id
        }
        None => conn.create_target(&source.url).await?,
    };

    let session_id = conn.attach_to_target(&target_id).await?;
    conn.enable_domain(&session_id, "Page").await?;
    conn.enable_domain(&session_id, "Runtime").await?;
    Ok(session_id)
}
