use anyhow::anyhow;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use feedsift_browser::chrome;
use feedsift_core::{Config, FeedSource, Paths};
use feedsift_report::{generate_report, RunSummary};
use feedsift_scorer::{
    filter_and_rank, matches_filters, GeminiScorer, ScoreMode, ScoreOptions, Scorer,
};

#[derive(Parser)]
#[command(name = "feedsift")]
#[command(about = "Collect and curate posts from an X feed through a real, logged-in Chrome", long_about = None)]
#[command(version)]
struct Cli {
    /// Feed source: a list URL or numeric id, 'home', or 'bookmarks'
    source: String,

    /// Maximum number of unique posts to collect
    #[arg(long)]
    max_posts: Option<usize>,

    /// Scoring mode: 'data' (engagement) or 'ai' (Gemini, needs GEMINI_API_KEY)
    #[arg(long)]
    score_mode: Option<String>,

    /// Comma-separated keywords a post must contain
    #[arg(long)]
    keywords: Option<String>,

    /// Comma-separated keywords that drop a post
    #[arg(long)]
    exclude: Option<String>,

    /// How many top posts go into the report
    #[arg(long)]
    top_n: Option<usize>,

    /// Category filter, needs ai scoring: ai-tools, industry-news,
    /// tech-breakthroughs, tutorials, controversial, all
    #[arg(long, default_value = "all")]
    topic_category: String,

    /// Print the picks to stdout instead of writing a report file
    #[arg(long)]
    dry_run: bool,

    /// Chrome profile directory (defaults to ~/.feedsift/profile)
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Chrome executable path (discovered when omitted)
    #[arg(long)]
    chrome_path: Option<String>,

    /// Output path for the markdown report
    #[arg(long)]
    output: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn split_terms(raw: &Option<String>) -> Vec<String> {
    raw.as_deref()
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let paths = Paths::new();
    paths.ensure_dirs()?;
    let mut config = Config::load(&paths)?;

    if let Some(n) = cli.max_posts {
        config.collection.max_posts = n;
    }
    if let Some(mode) = &cli.score_mode {
        config.scoring.score_mode = mode.clone();
    }
    if let Some(n) = cli.top_n {
        config.scoring.top_n = n;
    }
    if let Some(path) = &cli.chrome_path {
        config.browser.chrome_path = Some(path.clone());
    }
    if let Some(profile) = &cli.profile {
        config.browser.profile_dir = Some(profile.display().to_string());
    }

    let source = FeedSource::parse(&cli.source)?;

    let mut mode = ScoreMode::parse(&config.scoring.score_mode)
        .ok_or_else(|| anyhow!("Unknown score mode '{}'", config.scoring.score_mode))?;
    if mode == ScoreMode::Ai && config.scoring.gemini_api_key.is_none() {
        warn!("GEMINI_API_KEY not set, falling back to data scoring");
        mode = ScoreMode::Data;
    }

    let chrome_path = config
        .browser
        .chrome_path
        .clone()
        .or_else(chrome::find_chrome_executable)
        .ok_or_else(|| anyhow!("Chrome not found; pass --chrome-path or install Chrome"))?;
    let profile_dir = config
        .browser
        .profile_dir
        .clone()
        .map(PathBuf::from)
        .unwrap_or_else(|| paths.profile_dir());

    let result = feedsift_collector::scrape(&source, &config, &chrome_path, &profile_dir).await?;
    info!(
        posts = result.posts.len(),
        stop = ?result.stop,
        threads_expanded = result.threads.expanded,
        truncated_expanded = result.truncated.expanded,
        "Extraction complete"
    );

    let options = ScoreOptions {
        mode,
        category: cli.topic_category.clone(),
        keywords: split_terms(&cli.keywords),
        exclude: split_terms(&cli.exclude),
        top_n: config.scoring.top_n,
    };

    let ai_scores = match (mode, config.scoring.gemini_api_key.as_deref()) {
        (ScoreMode::Ai, Some(api_key)) => {
            let scorer = GeminiScorer::new(
                api_key,
                &config.scoring.gemini_model,
                config.scoring.batch_size,
                config.scoring.max_concurrent_batches,
            );
            Some(scorer.score(&result.posts).await?)
        }
        _ => None,
    };

    let total_collected = result.posts.len();
    let considered = result
        .posts
        .iter()
        .filter(|p| matches_filters(p, &options))
        .count();
    let picks = filter_and_rank(result.posts, ai_scores, &options);

    if cli.dry_run {
        println!("\n=== TOP {} PICKS ===\n", picks.len());
        for (rank, pick) in picks.iter().enumerate() {
            let head: String = pick.post.text.chars().take(100).collect();
            println!(
                "{}. [{:.2}] @{} — \"{}\"",
                rank + 1,
                pick.total_score,
                pick.post.author_handle,
                head
            );
            println!(
                "   {} likes | {} reposts | {} replies | {} views",
                pick.post.likes, pick.post.reposts, pick.post.replies, pick.post.views
            );
            println!("   {}\n", pick.post.url);
        }
        return Ok(());
    }

    let generated_at = chrono::Local::now().to_rfc3339();
    let report = generate_report(
        &picks,
        &RunSummary {
            source_name: source.display_name.clone(),
            score_mode: config.scoring.score_mode.clone(),
            total_collected,
            considered,
            generated_at,
        },
    );

    let output_path = cli.output.unwrap_or_else(|| {
        let stamp = chrono::Local::now().format("%Y-%m-%dT%H-%M-%S").to_string();
        paths.report_file(&stamp)
    });
    std::fs::write(&output_path, report)?;
    println!("Report saved to {}", output_path.display());

    Ok(())
}
