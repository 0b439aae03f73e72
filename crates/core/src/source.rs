//! Feed source parsing.
//!
//! A source is an X list (numeric id or full URL), the home timeline, or the
//! bookmarks page. Lists can be opened directly; home and bookmarks are
//! reached by landing on the neutral host first and navigating afterwards,
//! which avoids login-redirect races.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

pub const LANDING_URL: &str = "https://x.com";

static LIST_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"lists/(\d+)").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    List,
    Home,
    Bookmarks,
}

#[derive(Debug, Clone)]
pub struct FeedSource {
    pub kind: SourceKind,
    pub url: String,
    pub display_name: String,
}

impl FeedSource {
    /// Parse a user-supplied source: a bare numeric list id, a list URL,
    /// "home" / a /home URL, or "bookmarks" / a /i/bookmarks URL.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();

        if trimmed.chars().all(|c| c.is_ascii_digit()) && !trimmed.is_empty() {
            return Ok(Self::list(trimmed));
        }

        if let Some(caps) = LIST_ID_RE.captures(trimmed) {
            return Ok(Self::list(&caps[1]));
        }

        if trimmed == "home" || trimmed.contains("/home") {
            return Ok(Self {
                kind: SourceKind::Home,
                url: format!("{}/home", LANDING_URL),
                display_name: "For You".to_string(),
            });
        }

        if trimmed == "bookmarks" || trimmed.contains("/bookmarks") {
            return Ok(Self {
                kind: SourceKind::Bookmarks,
                url: format!("{}/i/bookmarks", LANDING_URL),
                display_name: "Bookmarks".to_string(),
            });
        }

        Err(Error::Config(format!(
            "Unsupported source '{}'. Use a list URL or numeric id, 'home', or 'bookmarks'.",
            trimmed
        )))
    }

    fn list(id: &str) -> Self {
        Self {
            kind: SourceKind::List,
            url: format!("{}/i/lists/{}", LANDING_URL, id),
            display_name: format!("List {}", id),
        }
    }

    /// Home and bookmarks require the two-step navigation; lists do not.
    pub fn needs_navigation(&self) -> bool {
        self.kind != SourceKind::List
    }

    /// The URL Chrome is started on. For two-step sources this is the
    /// neutral landing host.
    pub fn initial_url(&self) -> &str {
        if self.needs_navigation() {
            LANDING_URL
        } else {
            &self.url
        }
    }
}
