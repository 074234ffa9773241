//! Tor SOCKS5h proxy configuration
//!
//! The browser workers speak SOCKS directly via launch flags; this module
//! owns the shared configuration plus a reqwest-based reachability probe
//! used at startup.

use reqwest::{Client, Proxy};
use std::time::Duration;
use thiserror::Error;

/// Tor proxy and control-port configuration
#[derive(Debug, Clone)]
pub struct TorConfig {
    /// SOCKS5 proxy address for page traffic (default: 127.0.0.1:9050)
    pub socks_addr: String,
    /// Control port address (default: 127.0.0.1:9051)
    pub control_addr: String,
    /// Control port shared secret; empty means no authentication configured
    pub control_password: String,
    /// Per-page load timeout in seconds
    pub page_timeout_secs: u64,
    /// URLs processed before a scheduled identity rotation
    pub rotate_after_urls: u64,
    /// Seconds to wait after a rotation for the new circuit to settle
    pub settle_secs: u64,
}

impl Default for TorConfig {
    fn default() -> Self {
        Self {
            socks_addr: "socks5h://127.0.0.1:9050".to_string(),
            control_addr: "127.0.0.1:9051".to_string(),
            control_password: String::new(),
            page_timeout_secs: 45,
            rotate_after_urls: 30,
            settle_secs: 5,
        }
    }
}

impl TorConfig {
    /// SOCKS address in the form Chromium's `--proxy-server` flag expects
    pub fn browser_proxy_arg(&self) -> String {
        let addr = self
            .socks_addr
            .trim_start_matches("socks5h://")
            .trim_start_matches("socks5://");
        format!("--proxy-server=socks5://{}", addr)
    }
}

/// Errors from Tor networking
#[derive(Debug, Error)]
pub enum TorError {
    #[error("Failed to build Tor client: {0}")]
    ClientBuild(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Control port I/O failed: {0}")]
    Control(#[from] std::io::Error),

    #[error("Rotation failed: {0}")]
    RotationFailed(String),
}

/// User agents for rotation across browser launches
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:137.0) Gecko/20100101 Firefox/137.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.7; rv:137.0) Gecko/20100101 Firefox/137.0",
];

/// Get a random user agent
pub fn random_user_agent() -> &'static str {
    use rand::Rng;
    let idx = rand::thread_rng().gen_range(0..USER_AGENTS.len());
    USER_AGENTS[idx]
}

/// Create a Tor-enabled HTTP client (startup probe only)
pub fn create_tor_client(config: &TorConfig) -> Result<Client, TorError> {
    let proxy = Proxy::all(&config.socks_addr).map_err(|e| TorError::ClientBuild(e.to_string()))?;

    Client::builder()
        .proxy(proxy)
        .timeout(Duration::from_secs(config.page_timeout_secs))
        .user_agent(random_user_agent())
        .danger_accept_invalid_certs(true) // Many .onion sites have self-signed certs
        .build()
        .map_err(|e| TorError::ClientBuild(e.to_string()))
}

/// Check if the Tor proxy is reachable
pub async fn check_tor_connection(config: &TorConfig) -> Result<bool, TorError> {
    let client = create_tor_client(config)?;

    // Try to reach a known .onion address (Tor Project's)
    let result = client
        .get("http://2gzyxa5ihm7nsggfxnu52rck2vv4rvmdlkiu3ber7fzs2xqxczfebsid.onion/")
        .send()
        .await;

    match result {
        Ok(resp) => Ok(resp.status().is_success() || resp.status().is_redirection()),
        Err(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TorConfig::default();
        assert!(config.socks_addr.contains("9050"));
        assert!(config.control_addr.contains("9051"));
        assert_eq!(config.page_timeout_secs, 45);
    }

    #[test]
    fn test_browser_proxy_arg() {
        let config = TorConfig::default();
        assert_eq!(
            config.browser_proxy_arg(),
            "--proxy-server=socks5://127.0.0.1:9050"
        );
    }

    #[test]
    fn test_random_user_agent() {
        let ua = random_user_agent();
        assert!(ua.contains("Mozilla"));
    }
}
