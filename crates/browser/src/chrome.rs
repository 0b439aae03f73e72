//! Chrome process lifecycle.
//!
//! Launches a headed Chrome with a dedicated profile and remote-debugging
//! port, polls the debug HTTP endpoint until its WebSocket URL is available,
//! and tears the process down again at the end of a run.

use serde_json::{json, Value};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use feedsift_core::{Error, Result};

use crate::cdp::{CdpConnection, SendOpts};

/// Deadline for the protocol-level Browser.close during teardown.
const GRACEFUL_CLOSE_TIMEOUT_MS: u64 = 5_000;
/// Grace window between the graceful close and the forced kill.
const KILL_GRACE: Duration = Duration::from_secs(2);

const DEBUG_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// A launched Chrome process bound to a debug port.
pub struct ChromeHandle {
    child: Child,
    pub debug_port: u16,
}

impl ChromeHandle {
    /// Start Chrome against a dedicated profile directory, headed, with the
    /// first-run UI and the automation fingerprint disabled. The profile
    /// directory is created first so a fresh install works.
    pub async fn launch(
        executable: &str,
        profile_dir: &Path,
        port: u16,
        initial_url: &str,
    ) -> Result<Self> {
        std::fs::create_dir_all(profile_dir)?;

        let args = [
            format!("--remote-debugging-port={}", port),
            format!("--user-data-dir={}", profile_dir.display()),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--disable-blink-features=AutomationControlled".to_string(),
            "--start-maximized".to_string(),
            initial_url.to_string(),
        ];

        info!(port = port, profile = %profile_dir.display(), "Launching Chrome");

        let child = Command::new(executable)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Other(format!("Failed to launch {}: {}", executable, e)))?;

        Ok(Self {
            child,
            debug_port: port,
        })
    }

    /// Tear the browser down. The graceful CDP close is deadline-bounded and
    /// its failure swallowed; the kill afterwards is unconditional, so a
    /// hung graceful path can never keep the process alive. Cleanup must not
    /// mask the run's primary outcome, so nothing here returns an error.
    pub async fn shutdown(mut self, conn: Option<&CdpConnection>) {
        if let Some(conn) = conn {
            if let Err(e) = conn
                .send(
                    "Browser.close",
                    json!({}),
                    SendOpts::default().with_timeout(GRACEFUL_CLOSE_TIMEOUT_MS),
                )
                .await
            {
                debug!("Browser.close failed (may already be gone): {}", e);
            }
            conn.close().await;
        }

        match tokio::time::timeout(KILL_GRACE, self.child.wait()).await {
            Ok(status) => debug!(?status, "Chrome exited within grace window"),
            Err(_) => {
                debug!("Chrome still running after grace window, killing");
                let _ = self.child.kill().await;
            }
        }
    }
}

impl Drop for ChromeHandle {
    fn drop(&mut self) {
        // Best-effort kill when the handle goes away without shutdown.
        let _ = self.child.start_kill();
    }
}

/// Poll the local debug HTTP endpoint until it hands out a WebSocket URL.
/// Fails with [`Error::LaunchTimeout`] carrying the last observed poll error.
pub async fn wait_for_debug_port(port: u16, timeout: Duration) -> Result<String> {
    let url = format!("http://127.0.0.1:{}/json/version", port);
    let start = std::time::Instant::now();
    let mut last_error: Option<String> = None;

    loop {
        if start.elapsed() > timeout {
            let detail = match last_error {
                Some(e) => format!("port {} not ready after {:?} (last error: {})", port, timeout, e),
                None => format!("port {} not ready after {:?}", port, timeout),
            };
            return Err(Error::LaunchTimeout(detail));
        }

        match reqwest::get(&url).await {
            Ok(resp) => match resp.json::<Value>().await {
                Ok(body) => {
                    if let Some(ws_url) = body.get("webSocketDebuggerUrl").and_then(|v| v.as_str())
                    {
                        return Ok(ws_url.to_string());
                    }
                    last_error = Some("no webSocketDebuggerUrl in /json/version".to_string());
                }
                Err(e) => last_error = Some(e.to_string()),
            },
            Err(e) => last_error = Some(e.to_string()),
        }

        tokio::time::sleep(DEBUG_POLL_INTERVAL).await;
    }
}

/// Find a Chrome/Chromium binary: known install locations first, PATH next.
pub fn find_chrome_executable() -> Option<String> {
    let candidates: Vec<&str> = if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else if cfg!(target_os = "linux") {
        vec![
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
        ]
    } else {
        vec![
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    };

    for candidate in candidates {
        if Path::new(candidate).exists() {
            return Some(candidate.to_string());
        }
        if !candidate.contains('/') && !candidate.contains('\\') && which::which(candidate).is_ok()
        {
            return Some(candidate.to_string());
        }
    }
    None
}

/// Find a free TCP port for the debug endpoint.
pub async fn find_free_port() -> Result<u16> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| Error::Other(format!("Failed to find a free port: {}", e)))?;
    let port = listener
        .local_addr()
        .map_err(|e| Error::Other(format!("Failed to read local addr: {}", e)))?
        .port();
    drop(listener);
    Ok(port)
}
