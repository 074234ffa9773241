//! CAPTCHA solver collaborator interface
//!
//! The engine hands the solver an image and gets back a decoded string or
//! nothing. Implementations may run local OCR or a remote vision API; the
//! engine does not care which.

use async_trait::async_trait;
use chrono::Utc;
use std::path::Path;
use tracing::warn;

/// Narrow solver interface (external collaborator)
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    /// Decode the challenge; `None` means unsolved
    async fn solve(&self, image_png: &[u8]) -> Option<String>;

    /// Human-readable implementation name for logs
    fn name(&self) -> &str;
}

/// Solver that never solves anything; used when no backend is configured
#[derive(Debug, Default)]
pub struct NullSolver;

#[async_trait]
impl CaptchaSolver for NullSolver {
    async fn solve(&self, _image_png: &[u8]) -> Option<String> {
        None
    }

    fn name(&self) -> &str {
        "null"
    }
}

/// Persist an unsolved challenge image for later review
pub async fn save_unsolved(dir: &Path, url: &str, image_png: &[u8]) {
    let host = url
        .split("//")
        .nth(1)
        .unwrap_or(url)
        .split('/')
        .next()
        .unwrap_or("unknown")
        .replace(['.', ':'], "_");
    let filename = format!("{}_{}.png", host, Utc::now().format("%Y%m%d_%H%M%S"));

    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        warn!("captcha dir create failed: {}", e);
        return;
    }
    if let Err(e) = tokio::fs::write(dir.join(filename), image_png).await {
        warn!("unsolved captcha save failed: {}", e);
    }
}
