//! Address extraction from page source
//!
//! Stateless: compiled regexes per chain run over the full page source plus
//! string literals pulled out of embedded JavaScript. Candidates pass the
//! false-positive filters and the injected [`ChainValidator`] before emission.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::chain::{Chain, ChainValidator};

static BTC_LEGACY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[13][a-km-zA-HJ-NP-Z1-9]{25,34}\b").unwrap()
});

static BTC_BECH32_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bbc1[023456789acdefghjklmnpqrstuvwxyz]{11,71}\b").unwrap()
});

static ETH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b0x[a-fA-F0-9]{40}\b").unwrap()
});

static XMR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[48][0-9AB][1-9A-HJ-NP-Za-km-z]{93}\b").unwrap()
});

static TRON_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bT[1-9A-HJ-NP-Za-km-z]{33}\b").unwrap()
});

// Wide base58 net; everything it catches must survive the validator.
static SOL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[1-9A-HJ-NP-Za-km-z]{32,44}\b").unwrap()
});

// address: "...", wallet = '...', "btc_address": "..."
static JS_LITERAL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)["']?(?:address|wallet|payment|btc|eth|xmr|trx|sol)[a-z_]*["']?\s*[:=]\s*["']([^"']{20,100})["']"#,
    )
    .unwrap()
});

/// Placeholder substrings that disqualify a candidate outright
const PLACEHOLDER_MARKERS: &[&str] = &[
    "example", "test", "demo", "sample", "placeholder", "your_", "youraddress", "xxxx",
];

/// Reject strings that cannot plausibly be an address
fn looks_like_placeholder(candidate: &str) -> bool {
    let lower = candidate.to_lowercase();
    if PLACEHOLDER_MARKERS.iter().any(|m| lower.contains(m)) {
        return true;
    }

    let distinct: HashSet<char> = candidate.chars().collect();
    if distinct.len() <= 3 {
        return true;
    }

    // Dominated by a single character (> 80%)
    let len = candidate.chars().count();
    for ch in &distinct {
        let count = candidate.chars().filter(|c| c == ch).count();
        if count * 5 > len * 4 {
            return true;
        }
    }

    false
}

/// Try each chain's pattern against a single candidate string
fn classify_candidate(candidate: &str, validator: &dyn ChainValidator) -> Option<Chain> {
    // Most specific first; SOL last because its net is the widest.
    let checks: [(Chain, bool); 5] = [
        (Chain::Xmr, XMR_REGEX.is_match(candidate)),
        (Chain::Eth, ETH_REGEX.is_match(candidate)),
        (Chain::Tron, TRON_REGEX.is_match(candidate)),
        (
            Chain::Btc,
            BTC_LEGACY_REGEX.is_match(candidate) || BTC_BECH32_REGEX.is_match(candidate),
        ),
        (Chain::Sol, SOL_REGEX.is_match(candidate)),
    ];

    for (chain, matched) in checks {
        if matched && validator.validate(chain, candidate) {
            return Some(chain);
        }
    }
    None
}

/// Extract `(chain, address)` pairs from page source
///
/// Duplicates within the page are collapsed; first-occurrence order is kept.
/// Returns an empty list when nothing survives the filters.
pub fn extract_addresses(source: &str, validator: &dyn ChainValidator) -> Vec<(Chain, String)> {
    let mut out: Vec<(Chain, String)> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let mut push = |chain: Chain, value: &str, out: &mut Vec<(Chain, String)>, seen: &mut HashSet<String>| {
        if looks_like_placeholder(value) {
            return;
        }
        if seen.insert(value.to_string()) {
            out.push((chain, value.to_string()));
        }
    };

    // Scan the raw source chain by chain. Specific chains run before the
    // wide SOL net so a BTC match is never re-reported as SOL.
    for m in XMR_REGEX.find_iter(source) {
        if validator.validate(Chain::Xmr, m.as_str()) {
            push(Chain::Xmr, m.as_str(), &mut out, &mut seen);
        }
    }
    for m in ETH_REGEX.find_iter(source) {
        if validator.validate(Chain::Eth, m.as_str()) {
            push(Chain::Eth, m.as_str(), &mut out, &mut seen);
        }
    }
    for m in TRON_REGEX.find_iter(source) {
        if validator.validate(Chain::Tron, m.as_str()) {
            push(Chain::Tron, m.as_str(), &mut out, &mut seen);
        }
    }
    for m in BTC_LEGACY_REGEX
        .find_iter(source)
        .chain(BTC_BECH32_REGEX.find_iter(source))
    {
        if validator.validate(Chain::Btc, m.as_str()) {
            push(Chain::Btc, m.as_str(), &mut out, &mut seen);
        }
    }
    for m in SOL_REGEX.find_iter(source) {
        if seen.contains(m.as_str()) {
            continue;
        }
        // SOL candidates must not be claimable by any narrower chain
        if classify_candidate(m.as_str(), validator) == Some(Chain::Sol) {
            push(Chain::Sol, m.as_str(), &mut out, &mut seen);
        }
    }

    // JS string literals: address: "...", wallet = "..."
    for cap in JS_LITERAL_REGEX.captures_iter(source) {
        let literal = cap[1].trim();
        if seen.contains(literal) {
            continue;
        }
        if let Some(chain) = classify_candidate(literal, validator) {
            push(chain, literal, &mut out, &mut seen);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::SyntacticValidator;

    #[test]
    fn test_extract_btc_plain_text() {
        let v = SyntacticValidator;
        let found = extract_addresses(
            "Send payment to 1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa within 30 minutes",
            &v,
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, Chain::Btc);
        assert_eq!(found[0].1, "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa");
    }

    #[test]
    fn test_extract_eth() {
        let v = SyntacticValidator;
        let found = extract_addresses("ETH: 0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb0", &v);
        assert_eq!(found, vec![(
            Chain::Eth,
            "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb0".to_string()
        )]);
    }

    #[test]
    fn test_js_literal() {
        let v = SyntacticValidator;
        let source = r#"<script>var payment = { btc_address: "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa" };</script>"#;
        let found = extract_addresses(source, &v);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, Chain::Btc);
    }

    #[test]
    fn test_placeholder_rejected() {
        let v = SyntacticValidator;
        // 40 identical characters, hex-shaped
        let source = format!("0x{}", "a".repeat(40));
        assert!(extract_addresses(&source, &v).is_empty());
    }

    #[test]
    fn test_placeholder_word_rejected() {
        let v = SyntacticValidator;
        let found = extract_addresses("wallet: \"1ExampleExampleExampleExampleXXXX\"", &v);
        assert!(found.is_empty());
    }

    #[test]
    fn test_duplicates_collapsed_order_preserved() {
        let v = SyntacticValidator;
        let source = "pay 1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa or \
                      0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb0 or again \
                      1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";
        let found = extract_addresses(source, &v);
        assert_eq!(found.len(), 2);
        // Chain scan order puts ETH before BTC, both unique
        assert!(found.iter().any(|(c, _)| *c == Chain::Btc));
        assert!(found.iter().any(|(c, _)| *c == Chain::Eth));
    }

    #[test]
    fn test_btc_not_double_counted_as_sol() {
        let v = SyntacticValidator;
        let found = extract_addresses("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa", &v);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, Chain::Btc);
    }

    #[test]
    fn test_pathological_many_candidates() {
        let v = SyntacticValidator;
        // 150 occurrences of the same address collapse to one finding
        let source = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa ".repeat(150);
        let found = extract_addresses(&source, &v);
        assert_eq!(found.len(), 1);
    }
}
