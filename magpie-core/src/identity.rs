//! Synthetic identities for form filling
//!
//! Deterministic fallback generator; an LLM-backed generator can replace it
//! when configured. Bundles are fresh per URL and never reused.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Hint about what kind of site the bundle will be used on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteKind {
    Marketplace,
    Forum,
    Vendor,
    General,
}

/// A fresh identity bundle for one URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticIdentity {
    pub username: String,
    pub password: String,
    pub email: String,
    pub btc_address: String,
    pub pgp_key: String,
    pub telegram: String,
    pub age: u8,
    pub country: String,
}

const USERNAME_PREFIXES: &[&str] = &[
    "silent", "night", "ghost", "cold", "iron", "gray", "swift", "lone", "dark", "pale",
];

const USERNAME_SUFFIXES: &[&str] = &[
    "fox", "wolf", "raven", "hawk", "viper", "crow", "lynx", "bear", "owl", "stag",
];

const EMAIL_DOMAINS: &[&str] = &[
    "protonmail.com", "tutanota.com", "mail2tor.com", "dnmx.org", "cock.li",
];

const COUNTRIES: &[&str] = &[
    "Germany", "Netherlands", "Canada", "Sweden", "France", "Poland", "Austria",
];

// Well-known burn address: syntactically valid, provably unspendable.
const UNUSED_BTC_LITERAL: &str = "1BitcoinEaterAddressDontSendf59kuE";

/// Generate a bundle with the deterministic fallback
pub fn generate_identity(kind: SiteKind) -> SyntheticIdentity {
    let mut rng = rand::thread_rng();

    let prefix = USERNAME_PREFIXES.choose(&mut rng).unwrap_or(&"gray");
    let suffix = USERNAME_SUFFIXES.choose(&mut rng).unwrap_or(&"fox");
    let number: u16 = rng.gen_range(10..9999);
    let username = format!("{}{}{}", prefix, suffix, number);

    let password: String = (0..14)
        .map(|_| {
            const CHARSET: &[u8] =
                b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!#%";
            CHARSET[rng.gen_range(0..CHARSET.len())] as char
        })
        .collect();

    let domain = EMAIL_DOMAINS.choose(&mut rng).unwrap_or(&"protonmail.com");
    let email = format!("{}@{}", username, domain);

    let telegram = match kind {
        // Vendors and marketplace accounts plausibly advertise a handle
        SiteKind::Marketplace | SiteKind::Vendor => format!("@{}", username),
        _ => String::new(),
    };

    SyntheticIdentity {
        username,
        password,
        email,
        btc_address: UNUSED_BTC_LITERAL.to_string(),
        pgp_key: String::new(),
        telegram,
        age: rng.gen_range(21..45),
        country: COUNTRIES.choose(&mut rng).unwrap_or(&"Germany").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_bundles_differ() {
        let a = generate_identity(SiteKind::General);
        let b = generate_identity(SiteKind::General);
        // Random suffixes make collisions vanishingly unlikely
        assert_ne!(a.password, b.password);
    }

    #[test]
    fn test_email_matches_username() {
        let id = generate_identity(SiteKind::Forum);
        assert!(id.email.starts_with(&id.username));
        assert!(id.email.contains('@'));
    }

    #[test]
    fn test_btc_literal_is_syntactic() {
        use crate::chain::{Chain, ChainValidator, SyntacticValidator};
        let id = generate_identity(SiteKind::General);
        assert!(SyntacticValidator.validate(Chain::Btc, &id.btc_address));
    }

    #[test]
    fn test_marketplace_gets_telegram() {
        let id = generate_identity(SiteKind::Marketplace);
        assert!(id.telegram.starts_with('@'));
    }
}
