//! Supported cryptocurrency chains and syntactic address validation
//!
//! Validation here is deliberately shallow: charset, prefix, and length only.
//! Checksum-level validation belongs to whoever consumes the findings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Chains whose payment addresses the extractor recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Chain {
    Btc,
    Eth,
    Xmr,
    Tron,
    Sol,
}

impl Chain {
    pub const ALL: [Chain; 5] = [Chain::Btc, Chain::Eth, Chain::Xmr, Chain::Tron, Chain::Sol];

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Btc => "BTC",
            Chain::Eth => "ETH",
            Chain::Xmr => "XMR",
            Chain::Tron => "TRON",
            Chain::Sol => "SOL",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Narrow validation interface (external collaborator)
///
/// The engine never hard-codes acceptance rules beyond the scan regexes;
/// a candidate is emitted only if the injected validator accepts it.
pub trait ChainValidator: Send + Sync {
    fn validate(&self, chain: Chain, address: &str) -> bool;
}

/// Default validator: syntactic checks per chain
#[derive(Debug, Default, Clone)]
pub struct SyntacticValidator;

impl ChainValidator for SyntacticValidator {
    fn validate(&self, chain: Chain, address: &str) -> bool {
        match chain {
            Chain::Btc => is_valid_btc(address),
            Chain::Eth => is_valid_eth(address),
            Chain::Xmr => is_valid_xmr(address),
            Chain::Tron => is_valid_tron(address),
            Chain::Sol => is_valid_sol(address),
        }
    }
}

/// Bitcoin base58 alphabet (no 0, O, I, l)
fn is_base58(s: &str) -> bool {
    s.bytes().all(|b| {
        b.is_ascii_alphanumeric() && !matches!(b, b'0' | b'O' | b'I' | b'l')
    })
}

fn is_valid_btc(addr: &str) -> bool {
    if let Some(rest) = addr.strip_prefix("bc1") {
        // Bech32 charset excludes 1, b, i, o
        return (14..=74).contains(&addr.len())
            && rest
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
            && !rest.bytes().any(|b| matches!(b, b'1' | b'b' | b'i' | b'o'));
    }
    (26..=35).contains(&addr.len())
        && (addr.starts_with('1') || addr.starts_with('3'))
        && is_base58(addr)
}

fn is_valid_eth(addr: &str) -> bool {
    addr.len() == 42
        && addr.starts_with("0x")
        && addr[2..].bytes().all(|b| b.is_ascii_hexdigit())
}

fn is_valid_xmr(addr: &str) -> bool {
    addr.len() == 95
        && (addr.starts_with('4') || addr.starts_with('8'))
        && is_base58(addr)
}

fn is_valid_tron(addr: &str) -> bool {
    addr.len() == 34 && addr.starts_with('T') && is_base58(addr)
}

fn is_valid_sol(addr: &str) -> bool {
    // The original tooling disagreed with itself on 32..=44 vs exactly 44.
    // The validator is the single source of truth: it accepts the full range,
    // and callers must not layer a second length rule on top.
    (32..=44).contains(&addr.len()) && is_base58(addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_btc_legacy() {
        let v = SyntacticValidator;
        assert!(v.validate(Chain::Btc, "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"));
        assert!(v.validate(Chain::Btc, "3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy"));
        assert!(!v.validate(Chain::Btc, "1A1zP1eP5QGefi2DMPTfTL5SLmv7Divf0a")); // '0' not base58
        assert!(!v.validate(Chain::Btc, "2NotAnAddress"));
    }

    #[test]
    fn test_btc_bech32() {
        let v = SyntacticValidator;
        assert!(v.validate(Chain::Btc, "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"));
        assert!(!v.validate(Chain::Btc, "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kV8f3t4")); // uppercase
    }

    #[test]
    fn test_eth() {
        let v = SyntacticValidator;
        assert!(v.validate(Chain::Eth, "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb0"));
        assert!(!v.validate(Chain::Eth, "0x742d35Cc6634C0532925a3b844Bc9e7595f0bE"));
        assert!(!v.validate(Chain::Eth, "742d35Cc6634C0532925a3b844Bc9e7595f0bEb012"));
    }

    #[test]
    fn test_xmr() {
        let v = SyntacticValidator;
        let addr = format!("4{}", "A".repeat(94));
        assert!(v.validate(Chain::Xmr, &addr));
        assert!(!v.validate(Chain::Xmr, &addr[..94]));
    }

    #[test]
    fn test_tron() {
        let v = SyntacticValidator;
        assert!(v.validate(Chain::Tron, "TJRabPrwbZy45sbavfcjinPJC18kjpRTv8"));
        assert!(!v.validate(Chain::Tron, "JRabPrwbZy45sbavfcjinPJC18kjpRTv8T"));
    }

    #[test]
    fn test_sol_range() {
        let v = SyntacticValidator;
        assert!(v.validate(Chain::Sol, &"A".repeat(32)));
        assert!(v.validate(Chain::Sol, &"A".repeat(44)));
        assert!(!v.validate(Chain::Sol, &"A".repeat(45)));
        assert!(!v.validate(Chain::Sol, &"A".repeat(31)));
    }
}
