//! Post scoring: engagement-data ranking and the Gemini content scorer.
//!
//! Scoring runs strictly after extraction completes; nothing here touches
//! the browser.

pub mod data;
pub mod gemini;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use feedsift_core::{Post, Result};

pub use data::{filter_and_rank, matches_filters, ScoreMode, ScoreOptions, ScoredPost};
pub use gemini::GeminiScorer;

pub const CATEGORIES: &[&str] = &[
    "ai-tools",
    "industry-news",
    "tech-breakthroughs",
    "tutorials",
    "controversial",
    "other",
];

/// Structured content scores for one post, 1–5 per dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiScore {
    pub innovation: u8,
    pub innovation_comment: String,
    pub practicality: u8,
    pub practicality_comment: String,
    pub influence: u8,
    pub influence_comment: String,
    pub category: String,
    pub tags: Vec<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub translation: Option<String>,
}

impl Default for AiScore {
    fn default() -> Self {
        Self {
            innovation: 1,
            innovation_comment: String::new(),
            practicality: 1,
            practicality_comment: String::new(),
            influence: 1,
            influence_comment: String::new(),
            category: "other".to_string(),
            tags: Vec::new(),
            title: None,
            summary: None,
            translation: None,
        }
    }
}

impl AiScore {
    pub fn total(&self) -> f64 {
        (self.innovation + self.practicality + self.influence) as f64
    }
}

/// A scoring collaborator. Returns one score per post, aligned by index;
/// individual batch failures yield default scores rather than errors.
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, posts: &[Post]) -> Result<Vec<AiScore>>;
}
