//! The single output record type of the engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chain::Chain;

/// Screenshot path recorded when capture itself failed
pub const SCREENSHOT_FAILED: &str = "<screenshot-failed>";

/// A validated address with its capture context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub url: String,
    pub title: String,
    pub chain: Chain,
    pub address: String,
    pub captured_at: DateTime<Utc>,
    pub screenshot_path: String,
    /// 1-3 taxonomy labels
    pub categories: Vec<String>,
}

impl Finding {
    pub fn new(url: &str, title: &str, chain: Chain, address: &str) -> Self {
        Self {
            url: url.to_string(),
            title: title.to_string(),
            chain,
            address: address.to_string(),
            captured_at: Utc::now(),
            screenshot_path: SCREENSHOT_FAILED.to_string(),
            categories: Vec::new(),
        }
    }

    pub fn with_screenshot(mut self, path: &str) -> Self {
        self.screenshot_path = path.to_string();
        self
    }

    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    pub fn has_screenshot(&self) -> bool {
        self.screenshot_path != SCREENSHOT_FAILED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_without_screenshot() {
        let f = Finding::new("http://x.onion", "X", Chain::Btc, "1abc");
        assert!(!f.has_screenshot());
        assert_eq!(f.screenshot_path, SCREENSHOT_FAILED);
    }

    #[test]
    fn test_builder() {
        let f = Finding::new("http://x.onion", "X", Chain::Eth, "0xabc")
            .with_screenshot("shots/x.png")
            .with_categories(vec!["marketplace".into()]);
        assert!(f.has_screenshot());
        assert_eq!(f.categories, vec!["marketplace"]);
    }
}
