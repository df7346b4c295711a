//! Headless-Chromium rendering adapter.
//!
//! One browser process is launched per render and always torn down again,
//! success or failure. Font and image readiness are awaited under
//! independent budgets that degrade to proceed-anyway; a card with a dead
//! avatar URL still ships, slightly less pretty.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::detection::{DetectionOptions, default_executable};
use chromiumoxide::handler::viewport::Viewport as BrowserViewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::types::{ImageFormat, RenderOptions, RenderedImage};

/// Flags required to run Chromium inside minimal containers.
const CHROMIUM_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--hide-scrollbars",
    "--disable-web-security",
    "--disable-features=VizDisplayCompositor",
];

/// Install locations probed when detection finds nothing.
const KNOWN_EXECUTABLES: &[&str] = &[
    "./chrome/chrome-linux64/chrome",
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium-browser",
    "/usr/bin/chromium",
];

const FONT_READY_JS: &str = r#"
(async () => {
  if (document.fonts && document.fonts.ready) {
    await document.fonts.ready;
  }
})()
"#;

const IMAGE_READY_JS: &str = r#"
(async () => {
  const images = Array.from(document.images || []);
  await Promise.all(images.map(async (img) => {
    if (!(img.complete && img.naturalWidth > 0)) {
      await new Promise((resolve) => {
        img.addEventListener('load', resolve, { once: true });
        img.addEventListener('error', resolve, { once: true });
      });
    }
    if (img.decode) {
      try { await img.decode(); } catch (_) {}
    }
  }));
})()
"#;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("browser session failed: {0}")]
    Session(String),
    #[error("screenshot capture failed: {0}")]
    Capture(String),
}

/// Renders a finalized HTML document to an image buffer. Never retries; a
/// failure is reported once to the caller.
pub struct ChromeRenderer {
    executable: Option<PathBuf>,
    wait_timeout: Duration,
}

impl ChromeRenderer {
    pub fn new(executable: Option<PathBuf>, wait_timeout: Duration) -> Self {
        Self {
            executable,
            wait_timeout,
        }
    }

    pub async fn render(
        &self,
        html: &str,
        options: &RenderOptions,
    ) -> Result<RenderedImage, RenderError> {
        let config = self.browser_config(options)?;
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| RenderError::Launch(err.to_string()))?;

        let driver = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let result = self.capture(&browser, html, options).await;

        // Teardown runs on success and failure alike; a leaked Chromium
        // process would starve every later task.
        if let Err(err) = browser.close().await {
            warn!(target: "cartolina::render", error = %err, "browser close failed");
        }
        if let Err(err) = browser.wait().await {
            warn!(target: "cartolina::render", error = %err, "browser wait failed");
        }
        driver.abort();

        result
    }

    async fn capture(
        &self,
        browser: &Browser,
        html: &str,
        options: &RenderOptions,
    ) -> Result<RenderedImage, RenderError> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|err| RenderError::Session(err.to_string()))?;
        page.set_content(html)
            .await
            .map_err(|err| RenderError::Session(err.to_string()))?;

        self.await_ready(&page, "font").await;
        self.await_ready(&page, "image").await;

        let bytes = page
            .screenshot(screenshot_params(options))
            .await
            .map_err(|err| RenderError::Capture(err.to_string()))?;

        Ok(RenderedImage {
            bytes: Bytes::from(bytes),
            format: options.format,
        })
    }

    /// Run a readiness script, proceeding on script failure or an elapsed
    /// budget rather than failing the render.
    async fn await_ready(&self, page: &Page, what: &'static str) {
        let script = match what {
            "font" => FONT_READY_JS,
            _ => IMAGE_READY_JS,
        };
        let params = match EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .build()
        {
            Ok(params) => params,
            Err(err) => {
                warn!(target: "cartolina::render", what, error = %err, "readiness script rejected, proceeding");
                return;
            }
        };

        match tokio::time::timeout(self.wait_timeout, page.evaluate(params)).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                warn!(target: "cartolina::render", what, error = %err, "readiness wait failed, proceeding");
            }
            Err(_) => {
                warn!(
                    target: "cartolina::render",
                    what,
                    timeout_ms = self.wait_timeout.as_millis() as u64,
                    "readiness wait timed out, proceeding"
                );
            }
        }
    }

    fn browser_config(&self, options: &RenderOptions) -> Result<BrowserConfig, RenderError> {
        let mut builder = BrowserConfig::builder().args(CHROMIUM_ARGS.iter().copied());

        if let Some(path) = self.resolve_executable() {
            debug!(target: "cartolina::render", path = %path.display(), "using browser executable");
            builder = builder.chrome_executable(path);
        }

        if let Some(viewport) = &options.viewport {
            builder = builder.viewport(BrowserViewport {
                width: viewport.width,
                height: viewport.height,
                device_scale_factor: Some(viewport.device_scale_factor),
                ..BrowserViewport::default()
            });
        }

        builder.build().map_err(RenderError::Launch)
    }

    /// Resolution ladder: configured override, detected install, then the
    /// fixed list of known locations. `None` lets the launcher try its own
    /// default as a last resort.
    fn resolve_executable(&self) -> Option<PathBuf> {
        if let Some(path) = &self.executable {
            if path.exists() {
                return Some(path.clone());
            }
            warn!(
                target: "cartolina::render",
                path = %path.display(),
                "configured browser executable does not exist"
            );
        }

        match default_executable(DetectionOptions::default()) {
            Ok(path) => return Some(path),
            Err(err) => {
                debug!(target: "cartolina::render", error = %err, "no auto-detected browser executable");
            }
        }

        KNOWN_EXECUTABLES
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(Path::to_path_buf)
    }
}

fn screenshot_params(options: &RenderOptions) -> ScreenshotParams {
    let format = match options.format {
        ImageFormat::Png => CaptureScreenshotFormat::Png,
        ImageFormat::Jpeg => CaptureScreenshotFormat::Jpeg,
    };

    let mut builder = ScreenshotParams::builder()
        .format(format)
        .full_page(options.viewport.is_none());
    if options.format == ImageFormat::Jpeg {
        if let Some(quality) = options.quality {
            builder = builder.quality(i64::from(quality));
        }
    }
    builder.build()
}
