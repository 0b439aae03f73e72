use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".feedsift"))
            .unwrap_or_else(|| PathBuf::from(".feedsift"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    /// Dedicated Chrome profile. Keeping it out of the user's main profile
    /// means the login session persists between runs without touching their
    /// daily browser.
    pub fn profile_dir(&self) -> PathBuf {
        self.base.join("profile")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.base.join("reports")
    }

    /// Timestamped default report path, e.g. reports/feed-report-2026-08-07T10-30-00.md
    pub fn report_file(&self, timestamp: &str) -> PathBuf {
        let safe = timestamp.replace([':', '.'], "-");
        self.reports_dir().join(format!("feed-report-{}.md", safe))
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base)?;
        std::fs::create_dir_all(self.profile_dir())?;
        std::fs::create_dir_all(self.reports_dir())?;
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
