//! Lightweight taxonomy classifier
//!
//! Keyword-weighted scoring over URL, title, and body text. Emits one to
//! three category labels; `unknown` when nothing scores. Categories cover
//! financial-crime site classes only; the table is data-driven so deployments
//! can extend it.

/// Weighted keyword table: (category, [(keyword, weight)])
const CATEGORY_KEYWORDS: &[(&str, &[(&str, u32)])] = &[
    (
        "marketplace",
        &[
            ("market", 3),
            ("marketplace", 4),
            ("escrow", 3),
            ("vendor", 2),
            ("listing", 2),
            ("add to cart", 2),
        ],
    ),
    (
        "vendor-shop",
        &[
            ("shop", 3),
            ("store", 2),
            ("buy now", 2),
            ("product", 1),
            ("price", 1),
        ],
    ),
    (
        "forum",
        &[
            ("forum", 4),
            ("thread", 2),
            ("board", 2),
            ("post", 1),
            ("member", 1),
        ],
    ),
    (
        "ransomware",
        &[
            ("ransom", 5),
            ("decrypt", 3),
            ("leaked", 2),
            ("victims", 2),
            ("encrypted files", 4),
        ],
    ),
    (
        "carding",
        &[
            ("cvv", 4),
            ("fullz", 4),
            ("dumps", 3),
            ("card", 2),
            ("bin", 1),
        ],
    ),
    (
        "scam",
        &[
            ("double your", 4),
            ("multiplier", 3),
            ("guaranteed profit", 4),
            ("investment", 2),
            ("giveaway", 3),
        ],
    ),
    (
        "mixer",
        &[
            ("mixer", 5),
            ("tumbler", 4),
            ("mixing", 3),
            ("anonymize", 2),
            ("clean coins", 4),
        ],
    ),
    (
        "hosting",
        &[
            ("hosting", 4),
            ("vps", 3),
            ("server", 2),
            ("domain", 1),
            ("uptime", 2),
        ],
    ),
];

/// Minimum score for a category to be reported
const SCORE_FLOOR: u32 = 3;

/// Maximum number of labels per page
const MAX_LABELS: usize = 3;

/// Classify a page into 1-3 category labels
pub fn classify(url: &str, title: &str, body: &str) -> Vec<String> {
    // URL and title hits count double; body text once.
    let url = url.to_lowercase();
    let title = title.to_lowercase();
    let body = body.to_lowercase();

    let mut scored: Vec<(&str, u32)> = Vec::new();

    for (category, keywords) in CATEGORY_KEYWORDS {
        let mut score = 0u32;
        for (keyword, weight) in *keywords {
            if url.contains(keyword) {
                score += weight * 2;
            }
            if title.contains(keyword) {
                score += weight * 2;
            }
            if body.contains(keyword) {
                score += weight;
            }
        }
        if score >= SCORE_FLOOR {
            scored.push((category, score));
        }
    }

    scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    if scored.is_empty() {
        return vec!["unknown".to_string()];
    }

    scored
        .into_iter()
        .take(MAX_LABELS)
        .map(|(c, _)| c.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marketplace_from_title() {
        let labels = classify(
            "http://abc.onion",
            "Dark Market - trusted escrow",
            "welcome to the market",
        );
        assert_eq!(labels[0], "marketplace");
    }

    #[test]
    fn test_unknown_when_nothing_scores() {
        let labels = classify("http://abc.onion", "hello", "just a page");
        assert_eq!(labels, vec!["unknown"]);
    }

    #[test]
    fn test_at_most_three_labels() {
        let body = "market escrow vendor shop store buy now forum thread board \
                    ransom decrypt cvv fullz dumps mixer tumbler hosting vps server";
        let labels = classify("http://abc.onion", "everything", body);
        assert!(labels.len() <= 3);
        assert!(!labels.is_empty());
    }

    #[test]
    fn test_mixer_from_url() {
        let labels = classify("http://coinmixer000.onion/mixing", "", "");
        assert!(labels.contains(&"mixer".to_string()));
    }
}
