//! Markdown report rendering for ranked posts.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

use feedsift_scorer::ScoredPost;

/// Run counters handed over by the binary.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub source_name: String,
    pub score_mode: String,
    /// Unique posts collected from the feed.
    pub total_collected: usize,
    /// Posts left after keyword/category filtering.
    pub considered: usize,
    /// ISO-8601 generation timestamp.
    pub generated_at: String,
}

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "for", "are", "was", "were", "been", "being", "have", "has", "had",
        "does", "did", "will", "would", "could", "should", "may", "might", "must", "can",
        "not", "but", "with", "from", "into", "over", "out", "this", "that", "these",
        "those", "its", "they", "their", "them", "our", "you", "your", "his", "her",
        "what", "which", "who", "when", "where", "why", "how", "all", "each", "any",
        "some", "one", "two", "more", "most", "other", "such", "much", "many", "new",
        "get", "got", "like", "make", "made", "use", "using", "now", "even", "still",
        "already", "about", "here", "there", "then", "just", "also", "very", "too",
        "than", "only", "own", "same", "see", "say", "said", "way", "time", "thing",
        "https", "http", "www", "com", "amp", "via",
    ]
    .into_iter()
    .collect()
});

/// Render the full markdown report: header, ranked picks, keyword table.
pub fn generate_report(picks: &[ScoredPost], summary: &RunSummary) -> String {
    let mut out = String::new();

    out.push_str("# Feed Curation Report\n\n");
    out.push_str(&format!("- **Source**: {}\n", summary.source_name));
    out.push_str(&format!("- **Generated**: {}\n", summary.generated_at));
    out.push_str(&format!("- **Score mode**: {}\n", summary.score_mode));
    out.push_str(&format!(
        "- **Posts**: {} collected, {} after filters, top {} selected\n\n",
        summary.total_collected,
        summary.considered,
        picks.len()
    ));

    out.push_str("## Top Picks\n\n");
    for (rank, pick) in picks.iter().enumerate() {
        render_pick(&mut out, rank + 1, pick);
    }

    out.push_str(&keyword_section(picks));
    out
}

fn render_pick(out: &mut String, rank: usize, pick: &ScoredPost) {
    let post = &pick.post;
    let title = pick
        .ai
        .as_ref()
        .and_then(|ai| ai.title.clone())
        .unwrap_or_else(|| text_head(&post.text, 100));

    out.push_str(&format!(
        "### {}. {} — @{} (score {:.2})\n\n",
        rank, title, post.author_handle, pick.total_score
    ));

    if let Some(ai) = &pick.ai {
        out.push_str(&format!(
            "- **Scores**: innovation {}, practicality {}, influence {} ({})\n",
            ai.innovation, ai.practicality, ai.influence, ai.category
        ));
        if let Some(summary) = &ai.summary {
            out.push_str(&format!("- **Summary**: {}\n", summary));
        }
    } else {
        out.push_str(&format!("- **Data score**: {:.2}\n", pick.data_score));
    }

    out.push_str(&format!(
        "- **Engagement**: {} likes · {} reposts · {} replies · {} views\n",
        post.likes, post.reposts, post.replies, post.views
    ));
    if post.is_thread {
        out.push_str(&format!("- **Thread**: {} parts\n", post.thread_length));
    }
    if !post.url.is_empty() {
        out.push_str(&format!("- **Link**: {}\n", post.url));
    }

    out.push('\n');
    for line in text_head(&post.text, 600).lines() {
        out.push_str(&format!("> {}\n", line));
    }
    out.push('\n');
}

fn keyword_section(picks: &[ScoredPost]) -> String {
    let counts = keyword_counts(picks);
    let mut top: Vec<(&String, &usize)> = counts.iter().collect();
    top.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    top.truncate(10);

    if top.is_empty() {
        return String::new();
    }

    let mut out = String::from("## Keywords\n\n| Keyword | Count |\n|---------|-------|\n");
    for (word, count) in top {
        out.push_str(&format!("| {} | {} |\n", word, count));
    }
    out.push('\n');
    out
}

fn keyword_counts(picks: &[ScoredPost]) -> HashMap<String, usize> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for pick in picks {
        for raw in pick.post.text.split(|c: char| !c.is_alphanumeric()) {
            let word = raw.to_lowercase();
            if word.len() < 3
                || word.chars().all(|c| c.is_ascii_digit())
                || STOP_WORDS.contains(word.as_str())
            {
                continue;
            }
            *counts.entry(word).or_insert(0) += 1;
        }
        // Model-provided tags weigh double.
        if let Some(ai) = &pick.ai {
            for tag in &ai.tags {
                let tag = tag.to_lowercase().trim().to_string();
                if tag.len() >= 2 {
                    *counts.entry(tag).or_insert(0) += 2;
                }
            }
        }
    }
    counts
}

fn text_head(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{}…", head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedsift_core::Post;
    use feedsift_scorer::AiScore;

    fn pick(text: &str, handle: &str, score: f64) -> ScoredPost {
        ScoredPost {
            post: Post {
                text: text.to_string(),
                author_handle: handle.to_string(),
                author_name: handle.to_uppercase(),
                likes: 7,
                reposts: 1,
                replies: 2,
                views: 900,
                posted_at: "2026-08-01T12:00:00.000Z".to_string(),
                url: format!("https://x.com/{}/status/1", handle),
                is_repost: false,
                is_thread: false,
                thread_length: 1,
                likely_thread: false,
            },
            data_score: 0.5,
            total_score: score,
            ai: None,
        }
    }

    fn summary() -> RunSummary {
        RunSummary {
            source_name: "List 42".to_string(),
            score_mode: "data".to_string(),
            total_collected: 20,
            considered: 12,
            generated_at: "2026-08-07T10:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_report_carries_ranked_entries() {
        let picks = vec![pick("agents shipping agents", "alice", 14.0), pick("benchmark drama", "bob", 9.0)];
        let report = generate_report(&picks, &summary());

        assert!(report.contains("# Feed Curation Report"));
        assert!(report.contains("20 collected, 12 after filters, top 2 selected"));
        let alice = report.find("@alice").unwrap();
        let bob = report.find("@bob").unwrap();
        assert!(alice < bob);
        assert!(report.contains("https://x.com/alice/status/1"));
        assert!(report.contains("7 likes · 1 reposts · 2 replies · 900 views"));
    }

    #[test]
    fn test_report_uses_ai_title_and_scores() {
        let mut p = pick("raw body text", "alice", 12.0);
        p.ai = Some(AiScore {
            innovation: 5,
            practicality: 4,
            influence: 3,
            category: "ai-tools".to_string(),
            title: Some("The headline".to_string()),
            summary: Some("One-liner.".to_string()),
            ..Default::default()
        });
        let report = generate_report(&[p], &summary());

        assert!(report.contains("The headline"));
        assert!(report.contains("innovation 5, practicality 4, influence 3 (ai-tools)"));
        assert!(report.contains("One-liner."));
    }

    #[test]
    fn test_thread_note_rendered() {
        let mut p = pick("part one\n\n---\n\npart two", "alice", 10.0);
        p.post.is_thread = true;
        p.post.thread_length = 2;
        let report = generate_report(&[p], &summary());
        assert!(report.contains("**Thread**: 2 parts"));
    }

    #[test]
    fn test_keyword_table_filters_stop_words() {
        let picks = vec![
            pick("transformers and the transformers", "alice", 5.0),
            pick("transformers again", "bob", 4.0),
        ];
        let report = generate_report(&picks, &summary());

        assert!(report.contains("| transformers | 3 |"));
        assert!(!report.contains("| the |"));
        assert!(!report.contains("| and |"));
    }

    #[test]
    fn test_long_text_truncated_in_quote() {
        let long = "x".repeat(700);
        let report = generate_report(&[pick(&long, "alice", 5.0)], &summary());
        assert!(report.contains('…'));
    }
}
