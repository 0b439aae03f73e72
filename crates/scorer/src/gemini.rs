//! Content scoring through the Gemini generateContent API.
//!
//! Posts go out in small batches with a bounded number of batches in flight.
//! A failed batch degrades to default scores; scoring never fails a run.

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use feedsift_core::{Error, Post, Result};

use crate::{AiScore, Scorer, CATEGORIES};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiScorer {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
    batch_size: usize,
    max_concurrent_batches: usize,
}

impl GeminiScorer {
    pub fn new(
        api_key: &str,
        model: &str,
        batch_size: usize,
        max_concurrent_batches: usize,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            api_base: GEMINI_API_BASE.to_string(),
            model: model.to_string(),
            batch_size: batch_size.max(1),
            max_concurrent_batches: max_concurrent_batches.max(1),
        }
    }

    fn build_prompt(batch: &[(usize, &Post)]) -> String {
        let posts_list = batch
            .iter()
            .map(|(index, post)| format!("Index {}: @{}\n{}", index, post.author_handle, post.text))
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");

        format!(
            r#"You are curating posts from a social feed for a general-audience AI newsletter.

Score each post below on three dimensions, each an integer from 1 (lowest) to 5 (highest), with a one-line comment per dimension:
- innovation: freshness of the news, idea, or application. 5 means a first-hand report of a major release or a genuinely novel idea; 1 means stale or recycled content.
- practicality: how directly a non-technical reader can act on it. 5 means immediately usable with no background; 1 means theory only.
- influence: industry weight of the topic and its source. 5 means an official announcement from a major lab or an industry-shaping event; 1 means no wider relevance.

Pick exactly one category from: {}.

For every post also provide: a few short topic tags, a catchy headline-style title, a one-or-two sentence summary, and a full English translation when the post is not in English (leave translation empty otherwise).

Posts:

{}

Respond with raw JSON only, no markdown code fences, in this exact shape:
{{"results":[{{"index":0,"innovation":5,"innovationComment":"...","practicality":4,"practicalityComment":"...","influence":3,"influenceComment":"...","category":"ai-tools","tags":["tag"],"title":"...","summary":"...","translation":""}}]}}"#,
            CATEGORIES.join(", "),
            posts_list
        )
    }

    async fn call_gemini(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_base, self.model, self.api_key
        );

        let request = json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {
                "temperature": 0.3,
                "topP": 0.8,
                "topK": 40,
            }
        });

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Scoring(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        let raw_body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(Error::Scoring(format!(
                "Gemini API error {}: {}",
                status,
                &raw_body[..raw_body.len().min(500)]
            )));
        }

        debug!(body_len = raw_body.len(), "Gemini raw response");

        let resp: GeminiResponse = serde_json::from_str(&raw_body).map_err(|e| {
            Error::Scoring(format!("Failed to parse Gemini response: {}", e))
        })?;

        resp.candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .ok_or_else(|| Error::Scoring("No text in Gemini response".to_string()))
    }

    async fn score_batch(&self, batch: &[(usize, &Post)]) -> HashMap<usize, AiScore> {
        match self.try_score_batch(batch).await {
            Ok(scores) => scores,
            Err(e) => {
                warn!(error = %e, posts = batch.len(), "Batch scoring failed, using defaults");
                batch
                    .iter()
                    .map(|(index, _)| (*index, AiScore::default()))
                    .collect()
            }
        }
    }

    async fn try_score_batch(&self, batch: &[(usize, &Post)]) -> Result<HashMap<usize, AiScore>> {
        let prompt = Self::build_prompt(batch);
        let text = self.call_gemini(&prompt).await?;
        let parsed = parse_batch(&text)?;

        Ok(parsed
            .results
            .into_iter()
            .map(|item| {
                let score = AiScore {
                    innovation: clamp_dimension(item.innovation),
                    innovation_comment: item.innovation_comment,
                    practicality: clamp_dimension(item.practicality),
                    practicality_comment: item.practicality_comment,
                    influence: clamp_dimension(item.influence),
                    influence_comment: item.influence_comment,
                    category: if item.category.is_empty() {
                        "other".to_string()
                    } else {
                        item.category
                    },
                    tags: item.tags,
                    title: item.title,
                    summary: item.summary,
                    translation: item.translation,
                };
                (item.index, score)
            })
            .collect())
    }
}

#[async_trait]
impl Scorer for GeminiScorer {
    async fn score(&self, posts: &[Post]) -> Result<Vec<AiScore>> {
        let indexed: Vec<(usize, &Post)> = posts.iter().enumerate().collect();
        let batches: Vec<&[(usize, &Post)]> = indexed.chunks(self.batch_size).collect();

        info!(
            posts = posts.len(),
            batches = batches.len(),
            concurrent = self.max_concurrent_batches,
            "Scoring posts with Gemini"
        );

        let mut all_scores: HashMap<usize, AiScore> = HashMap::new();
        for group in batches.chunks(self.max_concurrent_batches) {
            let results = join_all(group.iter().map(|batch| self.score_batch(batch))).await;
            for scores in results {
                all_scores.extend(scores);
            }
        }

        // Anything the model skipped falls back to the default score.
        Ok((0..posts.len())
            .map(|i| all_scores.remove(&i).unwrap_or_default())
            .collect())
    }
}

/// Strip a leading/trailing markdown code fence the model sometimes adds
/// despite instructions.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    rest.strip_suffix("```").map(str::trim_end).unwrap_or(rest)
}

fn parse_batch(text: &str) -> Result<BatchAnalysis> {
    let json_text = strip_code_fences(text);
    serde_json::from_str(json_text)
        .map_err(|e| Error::Scoring(format!("Failed to parse batch scores: {}", e)))
}

fn clamp_dimension(value: i64) -> u8 {
    value.clamp(1, 5) as u8
}

#[derive(Debug, Deserialize)]
struct BatchAnalysis {
    results: Vec<BatchItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchItem {
    index: usize,
    #[serde(default)]
    innovation: i64,
    #[serde(default)]
    innovation_comment: String,
    #[serde(default)]
    practicality: i64,
    #[serde(default)]
    practicality_comment: String,
    #[serde(default)]
    influence: i64,
    #[serde(default)]
    influence_comment: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    translation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(text: &str) -> Post {
        Post {
            text: text.to_string(),
            author_handle: "alice".to_string(),
            author_name: "Alice".to_string(),
            likes: 0,
            reposts: 0,
            replies: 0,
            views: 0,
            posted_at: String::new(),
            url: String::new(),
            is_repost: false,
            is_thread: false,
            thread_length: 1,
            likely_thread: false,
        }
    }

    #[test]
    fn test_prompt_carries_indices_and_text() {
        let a = post("first post body");
        let b = post("second post body");
        let batch = vec![(0, &a), (3, &b)];

        let prompt = GeminiScorer::build_prompt(&batch);
        assert!(prompt.contains("Index 0: @alice\nfirst post body"));
        assert!(prompt.contains("Index 3: @alice\nsecond post body"));
        assert!(prompt.contains("ai-tools"));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn test_parse_batch() {
        let text = r#"```json
{"results":[{"index":2,"innovation":9,"innovationComment":"fresh","practicality":0,"practicalityComment":"","influence":3,"influenceComment":"big lab","category":"industry-news","tags":["release"],"title":"Big release","summary":"A release.","translation":""}]}
```"#;
        let parsed = parse_batch(text).unwrap();
        assert_eq!(parsed.results.len(), 1);
        let item = &parsed.results[0];
        assert_eq!(item.index, 2);
        // Out-of-range dimensions clamp into 1..=5.
        assert_eq!(clamp_dimension(item.innovation), 5);
        assert_eq!(clamp_dimension(item.practicality), 1);
        assert_eq!(clamp_dimension(item.influence), 3);
        assert_eq!(item.category, "industry-news");
    }

    #[test]
    fn test_parse_batch_with_missing_fields() {
        let text = r#"{"results":[{"index":0,"innovation":4}]}"#;
        let parsed = parse_batch(text).unwrap();
        assert_eq!(parsed.results[0].practicality, 0);
        assert!(parsed.results[0].title.is_none());
        assert!(parsed.results[0].tags.is_empty());
    }

    #[test]
    fn test_parse_batch_rejects_garbage() {
        assert!(parse_batch("not json at all").is_err());
    }
}
