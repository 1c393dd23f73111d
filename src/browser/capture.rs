//! Element screenshots
//!
//! Each recorded step can carry a picture of the element it targets. The
//! recorder asks a [`ScreenshotSource`] for the element's bounding rectangle
//! and stores the PNG as a data URL on the step.

use crate::error::{RecorderError, Result};
use crate::step::Rect;
use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, Viewport};
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;

#[async_trait]
pub trait ScreenshotSource: Send + Sync {
    /// PNG of the given viewport region, or `None` when capture is unavailable
    async fn capture_region(&self, rect: &Rect) -> anyhow::Result<Option<Vec<u8>>>;
}

/// Used when no browser is attached
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCapture;

#[async_trait]
impl ScreenshotSource for NoCapture {
    async fn capture_region(&self, _rect: &Rect) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

pub fn to_data_url(png: &[u8]) -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    )
}

/// Captures the visible tab of a Chrome instance started with
/// `--remote-debugging-port`
pub struct ChromeCapture {
    browser: Browser,
}

impl ChromeCapture {
    pub async fn connect(port: u16) -> Result<Self> {
        let url = format!("http://localhost:{}", port);
        let (browser, mut handler) = Browser::connect(&url).await.map_err(|e| {
            RecorderError::ConnectionFailed(format!(
                "Failed to connect to Chrome on port {}. \
                     Make sure Chrome is running with --remote-debugging-port={}: {}",
                port, port, e
            ))
        })?;

        tokio::spawn(async move {
            while (handler.next().await).is_some() {}
            log::debug!("Chrome event handler finished");
        });

        log::info!("Attached screenshot source to Chrome on port {}", port);
        Ok(Self { browser })
    }

    /// First page that is not an internal `chrome://` page
    async fn active_page(&self) -> Result<Page> {
        let pages = self.browser.pages().await?;
        for page in pages.iter() {
            if let Ok(Some(url)) = page.url().await {
                if !url.starts_with("chrome://") {
                    return Ok(page.clone());
                }
            }
        }
        pages
            .last()
            .cloned()
            .ok_or_else(|| RecorderError::ScreenshotFailed("no open page".to_string()))
    }
}

#[async_trait]
impl ScreenshotSource for ChromeCapture {
    async fn capture_region(&self, rect: &Rect) -> anyhow::Result<Option<Vec<u8>>> {
        let page = self.active_page().await?;
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .clip(Viewport { x: rect.x, y: rect.y, width: rect.width, height: rect.height, scale: 1.0 })
            .build();
        let png = page
            .screenshot(params)
            .await
            .map_err(|e| RecorderError::ScreenshotFailed(e.to_string()))?;
        Ok(Some(png))
    }
}
