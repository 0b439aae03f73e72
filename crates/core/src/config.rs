use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::paths::Paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionConfig {
    /// Stop collecting once this many unique posts are held.
    #[serde(default = "default_max_posts")]
    pub max_posts: usize,
    /// Overall deadline for the first rendered post to appear. The wait is
    /// repeated once more on timeout to allow an interactive login.
    #[serde(default = "default_content_wait_ms")]
    pub content_wait_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Consecutive scrolls with zero new unique posts before giving up.
    #[serde(default = "default_stable_iterations")]
    pub stable_iterations: u32,
    /// Consecutive empty extraction passes before treating the feed as gone.
    #[serde(default = "default_empty_view_retries")]
    pub empty_view_retries: u32,
    #[serde(default = "default_scroll_delay_ms")]
    pub scroll_delay_ms: u64,
}

fn default_max_posts() -> usize {
    200
}

fn default_content_wait_ms() -> u64 {
    120_000
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_stable_iterations() -> u32 {
    5
}

fn default_empty_view_retries() -> u32 {
    10
}

fn default_scroll_delay_ms() -> u64 {
    2_000
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            max_posts: default_max_posts(),
            content_wait_ms: default_content_wait_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            stable_iterations: default_stable_iterations(),
            empty_view_retries: default_empty_view_retries(),
            scroll_delay_ms: default_scroll_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpansionConfig {
    /// Simultaneous dedicated targets. Each one is a full browser tab.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Settle delay after opening a permalink before querying it.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

fn default_concurrency() -> usize {
    3
}

fn default_settle_ms() -> u64 {
    2_500
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            settle_ms: default_settle_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    /// Explicit Chrome executable. Discovered on PATH and in the usual
    /// install locations when unset.
    #[serde(default)]
    pub chrome_path: Option<String>,
    #[serde(default)]
    pub profile_dir: Option<String>,
    #[serde(default = "default_launch_timeout_ms")]
    pub launch_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Default per-command deadline on the debug connection.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

fn default_launch_timeout_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    30_000
}

fn default_command_timeout_ms() -> u64 {
    15_000
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            profile_dir: None,
            launch_timeout_ms: default_launch_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringConfig {
    /// "data" ranks by engagement; "ai" asks Gemini for content scores.
    #[serde(default = "default_score_mode")]
    pub score_mode: String,
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

fn default_score_mode() -> String {
    "data".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_batch_size() -> usize {
    5
}

fn default_max_concurrent_batches() -> usize {
    2
}

fn default_top_n() -> usize {
    10
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            score_mode: default_score_mode(),
            gemini_api_key: None,
            gemini_model: default_gemini_model(),
            batch_size: default_batch_size(),
            max_concurrent_batches: default_max_concurrent_batches(),
            top_n: default_top_n(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub collection: CollectionConfig,
    #[serde(default)]
    pub expansion: ExpansionConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
}

impl Config {
    /// Load from the config file when it exists, otherwise defaults.
    /// GEMINI_API_KEY in the environment overrides the file.
    pub fn load(paths: &Paths) -> Result<Self> {
        let mut config = Self::load_from(&paths.config_file())?;
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            if !key.is_empty() {
                config.scoring.gemini_api_key = Some(key);
            }
        }
        Ok(config)
    }

    fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }
}
