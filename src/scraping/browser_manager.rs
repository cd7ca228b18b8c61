//! Launching the browser that renders the listing.
//!
//! Discovery picks a Chromium-family binary, [`build_browser_config`] turns the
//! `browser` config section into launch flags, and [`BrowserSession`] owns the
//! process together with the task draining its CDP events.

use crate::core::config::BrowserSection;
use crate::harvest::{PollOutcome, Poller};
use anyhow::{anyhow, Result};
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Binary names looked up on `PATH`, most common first.
const PATH_NAMES: &[&str] = &["google-chrome", "chromium", "chromium-browser", "chrome"];

#[cfg(target_os = "linux")]
const INSTALL_PATHS: &[&str] = &["/usr/bin/google-chrome", "/usr/bin/chromium", "/snap/bin/chromium"];

#[cfg(target_os = "macos")]
const INSTALL_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

#[cfg(target_os = "windows")]
const INSTALL_PATHS: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
];

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const INSTALL_PATHS: &[&str] = &[];

fn first_existing<I>(candidates: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    candidates.into_iter().find(|p| p.is_file())
}

/// Pick the browser binary: the configured override, then `PATH`, then the
/// usual install location for this OS.
///
/// The override has already been resolved from the config file and
/// `CHROME_EXECUTABLE` by [`BrowserSection::chrome_executable_override`].
pub fn find_chrome_executable(explicit: Option<&str>) -> Option<String> {
    let on_path = std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths)
                .flat_map(|dir| PATH_NAMES.iter().map(move |name| dir.join(name)))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let found = first_existing(
        explicit
            .map(PathBuf::from)
            .into_iter()
            .chain(on_path)
            .chain(INSTALL_PATHS.iter().map(PathBuf::from)),
    )?;
    debug!("browser binary: {}", found.display());
    Some(found.to_string_lossy().into_owned())
}

/// Launch flags for a listing session.
///
/// The sandbox and `/dev/shm` flags keep headless runs alive inside
/// containers. The viewport matches the window so scroll offsets read back
/// the same height the window shows.
pub fn build_browser_config(exe: &Path, cfg: &BrowserSection) -> Result<BrowserConfig> {
    let (width, height) = cfg.resolve_window();
    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width,
            height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(width, height)
        .arg("--no-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-gpu")
        .arg("--no-first-run")
        .arg("--mute-audio");

    if let Some(ua) = cfg.resolve_user_agent() {
        builder = builder.arg(format!("--user-agent={}", ua));
    }
    if !cfg.resolve_headless() {
        builder = builder.with_head();
    }

    builder
        .build()
        .map_err(|e| anyhow!("invalid browser config: {}", e))
}

// ── Session ──────────────────────────────────────────────────────────────────

/// A launched browser plus the task pumping its CDP events.
///
/// Call [`BrowserSession::close`] when done; dropping only aborts the pump.
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    pub async fn launch(cfg: &BrowserSection) -> Result<Self> {
        let explicit = cfg.chrome_executable_override();
        let exe = find_chrome_executable(explicit.as_deref()).ok_or_else(|| {
            anyhow!("No browser found. Install Chrome or Chromium, or set CHROME_EXECUTABLE.")
        })?;
        info!(
            "🚀 launching browser ({}, {})",
            exe,
            if cfg.resolve_headless() { "headless" } else { "headed" }
        );
        let config = build_browser_config(Path::new(&exe), cfg)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| anyhow!("Failed to launch browser ({}): {}", exe, e))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("CDP handler error: {}", e);
                }
            }
        });

        Ok(Self { browser, handler })
    }

    pub async fn new_page(&self, url: &str) -> Result<Page> {
        self.browser
            .new_page(url)
            .await
            .map_err(|e| anyhow!("Failed to open page {}: {}", url, e))
    }

    /// Best-effort shutdown; a close error is logged, not returned.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Browser close error (non-fatal): {}", e);
        }
        self.handler.abort();
        info!("🛑 browser closed");
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

// ── Document readiness ───────────────────────────────────────────────────────

/// Poll `document.readyState` until it reads `"complete"` or `timeout` elapses.
///
/// Evaluation errors during navigation are expected (the execution context is
/// swapped out) and count as "not ready yet".
pub async fn wait_until_ready(page: &Page, poller: &Poller, timeout: Duration) -> Result<()> {
    let outcome = poller
        .until(timeout, move || async move {
            let ready = page
                .evaluate("document.readyState")
                .await
                .ok()
                .and_then(|v| v.into_value::<String>().ok())
                .is_some_and(|state| state == "complete");
            Ok::<_, anyhow::Error>(ready.then_some(()))
        })
        .await?;

    match outcome {
        PollOutcome::Ready(()) => Ok(()),
        PollOutcome::TimedOut => {
            info!("wait_until_ready: timeout after {}ms", timeout.as_millis());
            Ok(())
        }
        PollOutcome::Cancelled => Err(anyhow!("cancelled while waiting for the page to load")),
    }
}
