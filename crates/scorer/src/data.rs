//! Engagement-data scoring and ranking.

use std::cmp::Ordering;

use feedsift_core::Post;

use crate::AiScore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreMode {
    /// Rank purely on engagement counters.
    Data,
    /// Rank on AI content scores.
    Ai,
}

impl ScoreMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "data" | "data-only" => Some(Self::Data),
            "ai" | "ai-only" => Some(Self::Ai),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScoreOptions {
    pub mode: ScoreMode,
    /// "all" or one of [`crate::CATEGORIES`].
    pub category: String,
    pub keywords: Vec<String>,
    pub exclude: Vec<String>,
    pub top_n: usize,
}

impl Default for ScoreOptions {
    fn default() -> Self {
        Self {
            mode: ScoreMode::Data,
            category: "all".to_string(),
            keywords: Vec::new(),
            exclude: Vec::new(),
            top_n: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScoredPost {
    pub post: Post,
    /// Engagement relative to the strongest post of the batch, 0..=1.
    pub data_score: f64,
    pub total_score: f64,
    pub ai: Option<AiScore>,
}

/// Raw engagement: reposts weigh triple, replies double, views a hundredth.
fn raw_engagement(post: &Post) -> f64 {
    post.likes as f64 + post.reposts as f64 * 3.0 + post.replies as f64 * 2.0
        + post.views as f64 * 0.01
}

fn total_score(data_score: f64, ai: Option<&AiScore>, mode: ScoreMode) -> f64 {
    match mode {
        // Mapped onto the same 3..15 range the AI dimensions span.
        ScoreMode::Data => 3.0 + data_score * 12.0,
        ScoreMode::Ai => ai.map(AiScore::total).unwrap_or(3.0),
    }
}

/// True when the post passes the keyword include/exclude filters.
pub fn matches_filters(post: &Post, options: &ScoreOptions) -> bool {
    let text = post.text.to_lowercase();
    let included = options.keywords.is_empty()
        || options
            .keywords
            .iter()
            .any(|kw| text.contains(&kw.to_lowercase()));
    let excluded = options
        .exclude
        .iter()
        .any(|ex| text.contains(&ex.to_lowercase()));
    included && !excluded
}

/// Filter, score, and rank. `ai_scores`, when present, is aligned
/// index-for-index with `posts`.
pub fn filter_and_rank(
    posts: Vec<Post>,
    ai_scores: Option<Vec<AiScore>>,
    options: &ScoreOptions,
) -> Vec<ScoredPost> {
    let mut paired: Vec<(Post, Option<AiScore>)> = match ai_scores {
        Some(scores) => posts.into_iter().zip(scores.into_iter().map(Some)).collect(),
        None => posts.into_iter().map(|p| (p, None)).collect(),
    };

    paired.retain(|(post, _)| matches_filters(post, options));

    let max_raw = paired
        .iter()
        .map(|(post, _)| raw_engagement(post))
        .fold(0.0_f64, f64::max);

    let mut scored: Vec<ScoredPost> = paired
        .into_iter()
        .map(|(post, ai)| {
            let data_score = if max_raw == 0.0 {
                0.0
            } else {
                raw_engagement(&post) / max_raw
            };
            let total = total_score(data_score, ai.as_ref(), options.mode);
            ScoredPost {
                post,
                data_score,
                total_score: total,
                ai,
            }
        })
        .collect();

    if options.category != "all" {
        scored.retain(|s| {
            s.ai
                .as_ref()
                .map(|ai| ai.category == options.category)
                .unwrap_or(false)
        });
    }

    scored.sort_by(|a, b| {
        b.total_score
            .partial_cmp(&a.total_score)
            .unwrap_or(Ordering::Equal)
    });
    scored.truncate(options.top_n);
    scored
}
