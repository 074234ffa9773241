//! Per-URL headless browser handle
//!
//! One Chromium instance per candidate URL, launched through the Tor SOCKS
//! proxy with images, extensions, and notifications disabled. The owning
//! worker must call [`HiddenBrowser::close`] on every exit path; the handle
//! is deliberately not `Clone` and never shared between workers.

use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use magpie_tor::{random_user_agent, TorConfig};

/// Errors from browser driving
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("CDP error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),

    #[error("Page load timed out after {0}s")]
    Timeout(u64),

    #[error("Script evaluation failed: {0}")]
    Script(String),
}

impl BrowserError {
    /// Connection-class failures trigger circuit rotation upstream
    pub fn is_connection_error(&self) -> bool {
        match self {
            BrowserError::Timeout(_) => true,
            BrowserError::Cdp(e) => {
                let msg = e.to_string();
                msg.contains("net::ERR")
                    || msg.contains("timeout")
                    || msg.contains("connection")
            }
            _ => false,
        }
    }
}

/// A headless, SOCKS-proxied browser bound to one URL's lifetime
pub struct HiddenBrowser {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    page_timeout: Duration,
}

impl HiddenBrowser {
    /// Launch a fresh instance configured for hidden-service crawling
    pub async fn launch(tor: &TorConfig) -> Result<Self, BrowserError> {
        let config = BrowserConfig::builder()
            .arg(tor.browser_proxy_arg())
            .arg("--blink-settings=imagesEnabled=false")
            .arg("--disable-extensions")
            .arg("--disable-notifications")
            .arg("--disable-gpu")
            .arg("--mute-audio")
            .arg(format!("--user-agent={}", random_user_agent()))
            .no_sandbox()
            .request_timeout(Duration::from_secs(tor.page_timeout_secs))
            .build()
            .map_err(BrowserError::Launch)?;

        let (browser, mut handler) = Browser::launch(config).await?;

        // The handler stream must be pumped for the lifetime of the browser
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await?;

        Ok(Self {
            browser,
            page,
            handler: handler_task,
            page_timeout: Duration::from_secs(tor.page_timeout_secs),
        })
    }

    /// Navigate and wait for the load to finish, bounded by the page timeout
    pub async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        let timeout_secs = self.page_timeout.as_secs();
        let nav = async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<(), BrowserError>(())
        };

        tokio::time::timeout(self.page_timeout, nav)
            .await
            .map_err(|_| BrowserError::Timeout(timeout_secs))??;

        debug!("loaded {}", url);
        Ok(())
    }

    /// Current DOM snapshot as HTML
    pub async fn html(&self) -> Result<String, BrowserError> {
        Ok(self.page.content().await?)
    }

    /// Current page URL as the browser sees it
    pub async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    /// Document title, empty when absent
    pub async fn title(&self) -> Result<String, BrowserError> {
        self.eval_string("document.title").await
    }

    /// Evaluate JS and return the raw JSON value
    pub async fn eval(&self, js: &str) -> Result<serde_json::Value, BrowserError> {
        let result = self.page.evaluate(js).await?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    /// Evaluate JS expected to produce a string
    pub async fn eval_string(&self, js: &str) -> Result<String, BrowserError> {
        Ok(self
            .eval(js)
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    /// Evaluate JS expected to produce a boolean
    pub async fn eval_bool(&self, js: &str) -> Result<bool, BrowserError> {
        Ok(self.eval(js).await?.as_bool().unwrap_or(false))
    }

    /// Click the first element matching a CSS selector
    pub async fn click(&self, selector: &str) -> Result<bool, BrowserError> {
        let js = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.click();
                return true;
            }})()"#,
            sel = serde_json::to_string(selector).map_err(|e| BrowserError::Script(e.to_string()))?,
        );
        self.eval_bool(&js).await
    }

    /// Screenshot of the first element matching a CSS selector
    pub async fn element_screenshot(&self, selector: &str) -> Result<Vec<u8>, BrowserError> {
        let element = self.page.find_element(selector).await?;
        Ok(element.screenshot(CaptureScreenshotFormat::Png).await?)
    }

    /// Capture the page as PNG
    pub async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, BrowserError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(full_page)
            .build();
        Ok(self.page.screenshot(params).await?)
    }

    /// Brief pause for the page to settle after an interaction
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(1500)).await;
    }

    /// Tear down the browser process. Must run on every exit path.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("browser close failed: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            debug!("browser wait failed: {}", e);
        }
        self.handler.abort();
    }
}
