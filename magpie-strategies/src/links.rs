//! Same-origin link prioritization
//!
//! When a page itself yields nothing, a handful of its internal links are
//! worth one hop each. Payment-looking paths go first, chain-named paths
//! second, everything else last. Never more than five, never recursive.

use magpie_browser::PageLink;
use url::Url;

/// Upper bound on followed links per page
pub const MAX_FOLLOWED_LINKS: usize = 5;

const PAYMENT_PATHS: &[&str] = &[
    "/buy", "/checkout", "/wallet", "/pay", "/payment", "/order", "/deposit", "/crypto",
];

const CHAIN_PATHS: &[&str] = &[
    "/btc", "/bitcoin", "/eth", "/ethereum", "/xmr", "/monero", "/trx", "/tron", "/sol",
];

const PAYMENT_WORDS: &[&str] = &["pay", "buy", "order", "wallet", "deposit", "checkout"];

fn tier(link: &PageLink, path: &str) -> u8 {
    let text = link.text.to_lowercase();
    if PAYMENT_PATHS.iter().any(|p| path.starts_with(p))
        || PAYMENT_WORDS.iter().any(|w| text.contains(w))
    {
        0
    } else if CHAIN_PATHS.iter().any(|p| path.starts_with(p)) {
        1
    } else {
        2
    }
}

/// Rank harvested links and keep the best few
///
/// Same-origin absolute URLs only; fragments and the page itself are dropped.
pub fn prioritize_links(base_url: &str, links: &[PageLink]) -> Vec<String> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };

    let mut ranked: Vec<(u8, usize, String)> = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for (position, link) in links.iter().enumerate() {
        let Ok(mut resolved) = base.join(&link.href) else {
            continue;
        };
        resolved.set_fragment(None);

        if resolved.host_str() != base.host_str() || resolved.scheme() != base.scheme() {
            continue;
        }
        if resolved.as_str() == base.as_str() {
            continue;
        }
        if !seen.insert(resolved.to_string()) {
            continue;
        }

        let path = resolved.path().to_lowercase();
        ranked.push((tier(link, &path), position, resolved.into()));
    }

    // Stable within a tier: page order breaks ties
    ranked.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
    ranked
        .into_iter()
        .take(MAX_FOLLOWED_LINKS)
        .map(|(_, _, u)| u)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(href: &str, text: &str) -> PageLink {
        PageLink { href: href.into(), text: text.into() }
    }

    #[test]
    fn test_payment_paths_rank_first() {
        let links = vec![
            link("http://abc.onion/about", "About us"),
            link("http://abc.onion/btc", "BTC page"),
            link("http://abc.onion/checkout", "Go"),
        ];
        let ranked = prioritize_links("http://abc.onion/", &links);
        assert_eq!(ranked[0], "http://abc.onion/checkout");
        assert_eq!(ranked[1], "http://abc.onion/btc");
    }

    #[test]
    fn test_cross_origin_dropped() {
        let links = vec![
            link("http://other.onion/pay", "pay"),
            link("https://clearnet.example/pay", "pay"),
            link("/local", "local"),
        ];
        let ranked = prioritize_links("http://abc.onion/", &links);
        assert_eq!(ranked, vec!["http://abc.onion/local".to_string()]);
    }

    #[test]
    fn test_cap_and_dedupe() {
        let mut links = Vec::new();
        for i in 0..10 {
            links.push(link(&format!("/page{}", i), "x"));
        }
        links.push(link("/page0", "x"));
        let ranked = prioritize_links("http://abc.onion/", &links);
        assert_eq!(ranked.len(), MAX_FOLLOWED_LINKS);
    }

    #[test]
    fn test_anchor_text_promotes() {
        let links = vec![
            link("/a", "read our story"),
            link("/b", "Buy with Bitcoin"),
        ];
        let ranked = prioritize_links("http://abc.onion/", &links);
        assert_eq!(ranked[0], "http://abc.onion/b");
    }

    #[test]
    fn test_self_and_fragment_dropped() {
        let links = vec![link("http://abc.onion/", "home"), link("#top", "top")];
        let ranked = prioritize_links("http://abc.onion/", &links);
        assert!(ranked.is_empty());
    }
}
