//! Structural page fingerprints
//!
//! A content signature groups pages with similar shape across domains so the
//! pattern learner can transfer what it learned on one site to another that
//! looks the same, even when the onion address differs.

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Words that mark a marketplace-shaped page
const MARKETPLACE_MARKERS: &[&str] = &[
    "add to cart", "buy now", "vendor", "escrow", "listing", "product",
];

/// Structural fingerprint of a rendered page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSignature {
    pub has_login_form: bool,
    pub has_captcha: bool,
    pub has_marketplace_indicator: bool,
    pub has_crypto_form: bool,
    pub script_count_bucket: u8,
    pub form_count: u8,
    pub input_count_bucket: u8,
    pub length_bucket: u8,
}

impl ContentSignature {
    /// Compute the signature from page HTML
    pub fn from_html(html: &str) -> Self {
        let doc = Html::parse_document(html);
        let lower = html.to_lowercase();

        let sel = |s: &str| Selector::parse(s).unwrap();

        let script_count = doc.select(&sel("script")).count();
        let form_count = doc.select(&sel("form")).count();
        let input_count = doc.select(&sel("input")).count();

        let has_login_form = doc
            .select(&sel("input[type=password]"))
            .next()
            .is_some()
            || lower.contains("log in")
            || lower.contains("login");

        let has_captcha = lower.contains("captcha");

        let has_marketplace_indicator =
            MARKETPLACE_MARKERS.iter().any(|m| lower.contains(m));

        let has_crypto_form = doc
            .select(&sel("input[type=radio], input[type=checkbox]"))
            .any(|el| {
                let attrs = format!(
                    "{} {}",
                    el.value().attr("name").unwrap_or(""),
                    el.value().attr("value").unwrap_or("")
                )
                .to_lowercase();
                ["btc", "eth", "xmr", "crypto", "coin", "bitcoin", "monero"]
                    .iter()
                    .any(|k| attrs.contains(k))
            });

        Self {
            has_login_form,
            has_captcha,
            has_marketplace_indicator,
            has_crypto_form,
            script_count_bucket: bucket(script_count),
            form_count: form_count.min(u8::MAX as usize) as u8,
            input_count_bucket: bucket(input_count),
            length_bucket: length_bucket(html.len()),
        }
    }

    /// Short stable key over the canonical feature tuple
    pub fn key(&self) -> String {
        let canonical = format!(
            "{}|{}|{}|{}|{}|{}|{}|{}",
            self.has_login_form,
            self.has_captcha,
            self.has_marketplace_indicator,
            self.has_crypto_form,
            self.script_count_bucket,
            self.form_count,
            self.input_count_bucket,
            self.length_bucket,
        );
        let digest = Sha256::digest(canonical.as_bytes());
        hex_prefix(&digest, 6)
    }
}

fn bucket(count: usize) -> u8 {
    match count {
        0 => 0,
        1..=2 => 1,
        3..=5 => 2,
        6..=10 => 3,
        11..=25 => 4,
        _ => 5,
    }
}

fn length_bucket(len: usize) -> u8 {
    match len {
        0..=1_000 => 0,
        1_001..=10_000 => 1,
        10_001..=50_000 => 2,
        50_001..=200_000 => 3,
        _ => 4,
    }
}

fn hex_prefix(bytes: &[u8], n: usize) -> String {
    bytes
        .iter()
        .take(n)
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_PAGE: &str = r#"
        <html><body>
        <form action="/login" method="post">
          <input type="text" name="user">
          <input type="password" name="pass">
        </form>
        </body></html>
    "#;

    #[test]
    fn test_login_detected() {
        let sig = ContentSignature::from_html(LOGIN_PAGE);
        assert!(sig.has_login_form);
        assert!(!sig.has_captcha);
        assert_eq!(sig.form_count, 1);
    }

    #[test]
    fn test_key_deterministic() {
        let a = ContentSignature::from_html(LOGIN_PAGE);
        let b = ContentSignature::from_html(LOGIN_PAGE);
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().len(), 12);
    }

    #[test]
    fn test_different_shapes_differ() {
        let market = r#"<html><body><h1>Dark Market</h1><button>Add to cart</button>
            <script></script><script></script><script></script><script></script>
            <script></script><script></script><script></script></body></html>"#;
        let a = ContentSignature::from_html(LOGIN_PAGE);
        let b = ContentSignature::from_html(market);
        assert_ne!(a.key(), b.key());
        assert!(b.has_marketplace_indicator);
    }

    #[test]
    fn test_crypto_form_detected() {
        let html = r#"<html><body><form>
            <input type="radio" name="payCrypto" value="btc">
            <input type="radio" name="payCrypto" value="xmr">
        </form></body></html>"#;
        let sig = ContentSignature::from_html(html);
        assert!(sig.has_crypto_form);
    }
}
