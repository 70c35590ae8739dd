use std::path::PathBuf;

use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use tempfile::TempDir;

use super::BrowserController;
use crate::error::{Error, Result};
use crate::fixture::DeviceProfile;

/// Owns the CDP browser connection for one logical test execution.
pub struct BrowserSession {
    browser: Browser,
    _handler_task: tokio::task::JoinHandle<()>,
    // Profile directory lives as long as the session; cleaned up on drop.
    _user_data: TempDir,
    headless: bool,
}

impl std::fmt::Debug for BrowserSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserSession")
            .field("headless", &self.headless)
            .finish_non_exhaustive()
    }
}

impl BrowserSession {
    /// Launch a browser sized to `profile` and establish the CDP
    /// connection.
    pub async fn launch(profile: &DeviceProfile, headless: bool) -> Result<Self> {
        let user_data = tempfile::tempdir()?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(find_chrome_binary()?)
            .user_data_dir(user_data.path())
            .window_size(profile.width, profile.height)
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-extensions")
            .arg("--disable-hang-monitor")
            .arg("--disable-popup-blocking")
            .arg("--disable-prompt-on-repost")
            .arg("--disable-sync")
            .arg("--disable-translate")
            .arg("--metrics-recording-only");

        if headless {
            builder = builder.arg("--headless=new");
        }

        let config = builder.build().map_err(Error::Configuration)?;

        let (browser, mut handler) = Browser::launch(config).await?;

        let handler_task = tokio::spawn(async move {
            while handler.next().await.is_some() {}
            tracing::debug!("CDP event loop finished");
        });

        tracing::info!(
            profile = profile.name.as_str(),
            headless,
            "browser session started"
        );

        Ok(Self {
            browser,
            _handler_task: handler_task,
            _user_data: user_data,
            headless,
        })
    }

    /// Open a page at `url` and wrap it in a controller.
    pub async fn new_controller(&self, url: &str) -> Result<BrowserController> {
        let page = self.browser.new_page(url).await?;
        BrowserController::attach(page).await
    }

    pub fn is_headless(&self) -> bool {
        self.headless
    }

    /// Terminate the remote browser. Safe to call after partial setup; a
    /// close failure is logged, not surfaced, since the process is going
    /// away regardless.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::warn!("browser close failed: {e}");
        }
    }
}

/// Find the Chrome/Chromium binary on the current platform.
pub fn find_chrome_binary() -> Result<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    #[cfg(target_os = "macos")]
    candidates.extend(
        [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
        .map(PathBuf::from),
    );

    #[cfg(target_os = "linux")]
    candidates.extend(
        [
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium-browser",
            "/usr/bin/chromium",
            "/snap/bin/chromium",
        ]
        .map(PathBuf::from),
    );

    #[cfg(target_os = "windows")]
    for var in ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"] {
        if let Ok(base) = std::env::var(var) {
            candidates.push(PathBuf::from(base).join("Google\\Chrome\\Application\\chrome.exe"));
        }
    }

    if let Some(path) = candidates.into_iter().find(|p| p.exists()) {
        tracing::debug!("found Chrome at {}", path.display());
        return Ok(path);
    }

    for name in [
        "google-chrome",
        "google-chrome-stable",
        "chromium-browser",
        "chromium",
    ] {
        if let Ok(path) = which::which(name) {
            tracing::debug!("found Chrome in PATH: {}", path.display());
            return Ok(path);
        }
    }

    Err(Error::Configuration(
        "could not find Chrome or Chromium on this system".to_string(),
    ))
}
