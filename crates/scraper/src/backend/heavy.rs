// ABOUTME: Heavy fetch backend: renders the page in headless Chromium over CDP with stealth patches.
// ABOUTME: Fails fast with BackendUnavailable when disabled, compiled out, or no browser is installed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
#[cfg(feature = "browser")]
use tracing::{debug, info, warn};

#[cfg(feature = "browser")]
use anyhow::Context;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig, Page};
#[cfg(feature = "browser")]
use futures::StreamExt;

use crate::backend::net::{ensure_public, parse_target};
use crate::backend::stealth::{CHROME_COMMANDS, CHROME_PATHS};
#[cfg(feature = "browser")]
use crate::backend::stealth::{LAUNCH_ARGS, STEALTH_SCRIPTS};
use crate::backend::{Availability, Document, FetchBackend};
use crate::error::ScrapeError;
use crate::options::HeavyOptions;

const OP: &str = "HeavyFetch";

/// Headless browser backend.
///
/// Every fetch launches its own browser process. The process belongs to the
/// fetch future and is killed when that future completes or is dropped.
pub struct HeavyBackend {
    opts: HeavyOptions,
}

impl HeavyBackend {
    pub fn new(opts: HeavyOptions) -> Self {
        Self { opts }
    }

    /// The browser binary this backend would launch, or why it cannot launch one.
    pub fn executable(&self) -> Result<PathBuf, String> {
        if !self.opts.enabled {
            return Err("heavy backend disabled".to_string());
        }
        if !cfg!(feature = "browser") {
            return Err("built without browser support".to_string());
        }
        find_browser(self.opts.chrome_executable.as_deref())
    }

    fn settle_delay(&self) -> Duration {
        settle_delay(self.opts.settle_min, self.opts.settle_max)
    }
}

/// Locates a Chrome or Chromium binary.
pub fn find_browser(configured: Option<&Path>) -> Result<PathBuf, String> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(format!("configured browser not found: {}", path.display()));
    }

    if let Some(path) = CHROME_PATHS.iter().map(Path::new).find(|p| p.exists()) {
        return Ok(path.to_path_buf());
    }

    CHROME_COMMANDS
        .iter()
        .find_map(|cmd| which::which(cmd).ok())
        .ok_or_else(|| "no Chrome or Chromium installation found".to_string())
}

/// Uniform draw from `[min, max]`; `min` when the range is empty.
fn settle_delay(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let ms = rand::rng().random_range(min.as_millis() as u64..=max.as_millis() as u64);
    Duration::from_millis(ms)
}

#[async_trait]
impl FetchBackend for HeavyBackend {
    fn name(&self) -> &'static str {
        "heavy"
    }

    async fn availability(&self) -> Availability {
        match self.executable() {
            Ok(path) => Availability::up_with(path.display().to_string()),
            Err(reason) => Availability::down(reason),
        }
    }

    async fn fetch(&self, url: &str) -> Result<Document, ScrapeError> {
        let target = parse_target(url, OP)?;
        let executable = self.executable().map_err(|reason| {
            ScrapeError::backend_unavailable(url, OP, Some(anyhow::anyhow!(reason)))
        })?;
        if self.opts.allow_private_networks {
            return self.render(url, target.as_str(), executable).await;
        }

        ensure_public(&target, url, OP).await?;
        let doc = self.render(url, target.as_str(), executable).await?;
        let landed = parse_target(&doc.final_url, OP)?;
        ensure_public(&landed, url, OP).await?;
        Ok(doc)
    }
}

#[cfg(not(feature = "browser"))]
impl HeavyBackend {
    async fn render(
        &self,
        url: &str,
        _target: &str,
        _executable: PathBuf,
    ) -> Result<Document, ScrapeError> {
        Err(ScrapeError::backend_unavailable(
            url,
            OP,
            Some(anyhow::anyhow!("built without browser support")),
        ))
    }
}

/// Owns a launched browser and its CDP event loop.
///
/// Dropping it aborts the event loop and drops the `Browser`, which kills the
/// child process.
#[cfg(feature = "browser")]
struct BrowserSession {
    browser: Browser,
    handler: tokio::task::JoinHandle<()>,
}

#[cfg(feature = "browser")]
impl BrowserSession {
    async fn launch(opts: &HeavyOptions, executable: PathBuf) -> anyhow::Result<Self> {
        info!(executable = %executable.display(), headless = opts.headless, "launching browser");

        let mut builder = BrowserConfig::builder()
            .chrome_executable(executable)
            .request_timeout(opts.navigation_timeout);
        if !opts.headless {
            builder = builder.with_head();
        }
        for arg in LAUNCH_ARGS {
            builder = builder.arg(*arg);
        }
        for arg in &opts.extra_args {
            builder = builder.arg(arg.as_str());
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {}", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch browser")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self { browser, handler })
    }

    async fn close(&mut self) {
        if let Err(e) = self.browser.close().await {
            debug!(error = %e, "browser close failed");
        }
    }
}

#[cfg(feature = "browser")]
impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[cfg(feature = "browser")]
impl HeavyBackend {
    async fn render(
        &self,
        url: &str,
        target: &str,
        executable: PathBuf,
    ) -> Result<Document, ScrapeError> {
        let mut session = BrowserSession::launch(&self.opts, executable)
            .await
            .map_err(|e| ScrapeError::fetch(url, OP, Some(e)))?;

        let rendered = self.render_page(&session.browser, target).await;
        session.close().await;

        let (final_url, html) = rendered.map_err(|e| ScrapeError::fetch(url, OP, Some(e)))?;
        Ok(Document {
            url: url.to_string(),
            final_url,
            // CDP does not report the navigation status here
            status: 200,
            html,
        })
    }

    async fn render_page(&self, browser: &Browser, target: &str) -> anyhow::Result<(String, String)> {
        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to open page")?;

        page.execute(SetUserAgentOverrideParams::new(self.opts.user_agent.clone()))
            .await
            .context("failed to override user agent")?;
        for script in STEALTH_SCRIPTS {
            page.execute(AddScriptToEvaluateOnNewDocumentParams::new(script.to_string()))
                .await
                .context("failed to register stealth script")?;
        }

        self.navigate(&page, target).await?;

        let settle = self.settle_delay();
        debug!(url = target, settle_ms = settle.as_millis() as u64, "waiting for page to settle");
        tokio::time::sleep(settle).await;

        let html = page.content().await.context("failed to read page content")?;
        let final_url = page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| target.to_string());

        let _ = page.close().await;
        Ok((final_url, html))
    }

    /// Navigates, retrying only when the navigation itself times out.
    async fn navigate(&self, page: &Page, target: &str) -> anyhow::Result<()> {
        let attempts = self.opts.max_navigation_attempts.max(1);
        for attempt in 1..=attempts {
            match tokio::time::timeout(self.opts.navigation_timeout, page.goto(target)).await {
                Ok(Ok(_)) => return Ok(()),
                Ok(Err(chromiumoxide::error::CdpError::Timeout)) | Err(_) => {
                    warn!(url = target, attempt, attempts, "navigation timed out");
                }
                Ok(Err(e)) => return Err(anyhow::Error::new(e).context("navigation failed")),
            }
        }
        Err(anyhow::anyhow!(
            "navigation timed out after {} attempts",
            attempts
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disabled() -> HeavyBackend {
        HeavyBackend::new(HeavyOptions {
            enabled: false,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn disabled_backend_reports_unavailable() {
        let availability = disabled().availability().await;
        assert!(!availability.available);
        assert_eq!(availability.detail.as_deref(), Some("heavy backend disabled"));
    }

    #[tokio::test]
    async fn disabled_backend_fails_fast() {
        let err = disabled().fetch("https://shop.test/p/1").await.unwrap_err();
        assert!(err.is_backend_unavailable());
        assert!(err.detail().contains("disabled"));
    }

    #[tokio::test]
    async fn missing_configured_browser_is_unavailable() {
        let backend = HeavyBackend::new(HeavyOptions {
            chrome_executable: Some(PathBuf::from("/nonexistent/wist/chrome")),
            ..Default::default()
        });

        let availability = backend.availability().await;
        assert!(!availability.available);

        let err = backend.fetch("https://shop.test/p/1").await.unwrap_err();
        assert!(err.is_backend_unavailable());
    }

    #[tokio::test]
    async fn invalid_url_rejected_before_launch() {
        let err = disabled().fetch("ftp://shop.test/").await.unwrap_err();
        assert!(err.is_invalid_request());
    }

    #[cfg(feature = "browser")]
    #[tokio::test]
    async fn private_target_refused_before_launch() {
        let exe = std::env::current_exe().unwrap();
        let backend = HeavyBackend::new(HeavyOptions {
            chrome_executable: Some(exe),
            ..Default::default()
        });

        let err = backend
            .fetch("http://169.254.169.254/latest/meta-data/")
            .await
            .unwrap_err();
        assert!(err.is_ssrf(), "expected SSRF error, got: {:?}", err);
    }

    #[test]
    fn find_browser_prefers_configured_path() {
        let exe = std::env::current_exe().unwrap();
        assert_eq!(find_browser(Some(exe.as_path())), Ok(exe.clone()));
    }

    #[test]
    fn settle_delay_stays_in_range() {
        let min = Duration::from_millis(2000);
        let max = Duration::from_millis(3000);
        for _ in 0..50 {
            let d = settle_delay(min, max);
            assert!(d >= min && d <= max);
        }
        assert_eq!(settle_delay(max, min), max);
    }
}
