//! Pattern learner
//!
//! Tracks per-(domain, strategy) outcomes, keeps a floored weight
//! distribution over strategies, and pins strategies to struggling domains
//! via adaptation rules. Strategies see only two operations, `choose` and
//! `record`; adaptation runs inside `record` under the same lock, so it
//! never reads a half-updated aggregate.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

use magpie_core::{
    AttemptRecord, ErrorKind, Outcome, Stage, Strategy, CONSECUTIVE_FAILURE_LIMIT,
    LOW_SUCCESS_THRESHOLD, RECENT_ATTEMPTS_CAP, ROLLING_WINDOW, WEIGHT_FLOOR,
};

use crate::store::{load_or_default, save_json, LearnError};

/// Seconds between scheduled adaptation passes
const ADAPT_INTERVAL_SECS: i64 = 300;

/// Lifetime of a domain rule created by adaptation
const RULE_TTL_SECS: i64 = 3600;

/// Global success rate below which a strategy's weight is cut
const POOR_STRATEGY_RATE: f64 = 0.05;

/// Observations needed before a strategy is judged chronically poor
const POOR_STRATEGY_MIN_TOTAL: u64 = 10;

/// Rolling per-(domain, strategy) aggregates
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyStats {
    pub success: u64,
    pub total: u64,
    pub per_stage: HashMap<Stage, u64>,
}

impl StrategyStats {
    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.success as f64 / self.total as f64
        }
    }
}

/// A learned pinning of a strategy to a domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationRule {
    pub domain: String,
    pub strategy: Strategy,
    pub created: DateTime<Utc>,
    pub expires: Option<DateTime<Utc>>,
}

impl AdaptationRule {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires.map(|e| now < e).unwrap_or(true)
    }
}

/// Retry policy raised by adaptation for frequent error kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPolicy {
    pub retries: u32,
    pub timeout_extension_secs: u64,
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self { retries: 1, timeout_extension_secs: 0 }
    }
}

/// Compressed attempt kept in the rolling window
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecentAttempt {
    domain: String,
    strategy: Strategy,
    success: bool,
    error_kind: Option<ErrorKind>,
}

/// Everything the learner persists between runs
#[derive(Debug, Serialize, Deserialize)]
struct LearnerState {
    strategy_weights: HashMap<Strategy, f64>,
    domain_stats: HashMap<String, HashMap<Strategy, StrategyStats>>,
    signature_stats: HashMap<String, HashMap<Strategy, StrategyStats>>,
    rules: Vec<AdaptationRule>,
    error_policies: HashMap<ErrorKind, ErrorPolicy>,
    consecutive_failures: HashMap<String, u32>,
    recent: VecDeque<RecentAttempt>,
    last_adapt: DateTime<Utc>,
}

impl Default for LearnerState {
    fn default() -> Self {
        let uniform = 1.0 / Strategy::ALL.len() as f64;
        Self {
            strategy_weights: Strategy::ALL.iter().map(|s| (*s, uniform)).collect(),
            domain_stats: HashMap::new(),
            signature_stats: HashMap::new(),
            rules: Vec::new(),
            error_policies: HashMap::new(),
            consecutive_failures: HashMap::new(),
            recent: VecDeque::new(),
            last_adapt: Utc::now(),
        }
    }
}

/// Extract the registrable host from a URL string
pub fn domain_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| url.to_string())
}

/// The learner. Interior mutability behind a single mutex; the lock is never
/// held across I/O or await points by callers.
pub struct PatternLearner {
    state: Mutex<LearnerState>,
    path: Option<PathBuf>,
}

impl PatternLearner {
    pub fn new() -> Self {
        Self { state: Mutex::new(LearnerState::default()), path: None }
    }

    /// Load from a checkpoint file; missing file means a fresh learner
    pub fn load(path: &Path) -> Self {
        Self {
            state: Mutex::new(load_or_default(path)),
            path: Some(path.to_path_buf()),
        }
    }

    /// Persist the current state atomically
    pub fn checkpoint(&self) -> Result<(), LearnError> {
        let Some(path) = &self.path else { return Ok(()) };
        let state = self.state.lock();
        save_json(path, &*state)
    }

    /// Select the strategy to try next for a URL
    ///
    /// Resolution order: active domain rule, best proven domain strategy,
    /// best content-signature strategy, domain-class default for unseen
    /// domains, weighted random draw otherwise.
    pub fn choose(&self, url: &str, signature_key: Option<&str>) -> Strategy {
        let domain = domain_of(url);
        let state = self.state.lock();
        let now = Utc::now();

        // (a) active adaptation rule
        if let Some(rule) = state
            .rules
            .iter()
            .rev()
            .find(|r| r.domain == domain && r.is_active(now))
        {
            debug!("{}: rule pins {}", domain, rule.strategy);
            return rule.strategy;
        }

        // (b) proven domain strategy
        if let Some(per_strategy) = state.domain_stats.get(&domain) {
            let best = per_strategy
                .iter()
                .filter(|(_, s)| s.total >= 5 && s.rate() >= 0.10)
                .max_by(|a, b| a.1.rate().total_cmp(&b.1.rate()));
            if let Some((strategy, stats)) = best {
                debug!("{}: domain stats pick {} ({:.0}%)", domain, strategy, stats.rate() * 100.0);
                return *strategy;
            }
        }

        // (c) proven signature strategy
        if let Some(key) = signature_key {
            if let Some(per_strategy) = state.signature_stats.get(key) {
                let best = per_strategy
                    .iter()
                    .filter(|(_, s)| s.total >= 5 && s.success > 0)
                    .max_by(|a, b| a.1.rate().total_cmp(&b.1.rate()));
                if let Some((strategy, _)) = best {
                    debug!("{}: signature {} pick {}", domain, key, strategy);
                    return *strategy;
                }
            }
        }

        // (d) domain-class default for domains we have never touched
        if !state.domain_stats.contains_key(&domain) {
            return if domain.ends_with(".onion") {
                Strategy::AiEnhanced
            } else {
                Strategy::Basic
            };
        }

        // (e) weighted random draw over the floored distribution
        drop(state);
        self.weighted_draw()
    }

    fn weighted_draw(&self) -> Strategy {
        let state = self.state.lock();
        let total: f64 = state.strategy_weights.values().sum();
        let mut roll = rand::thread_rng().gen_range(0.0..total.max(f64::MIN_POSITIVE));
        for strategy in Strategy::ALL {
            let w = state.strategy_weights.get(&strategy).copied().unwrap_or(WEIGHT_FLOOR);
            if roll < w {
                return strategy;
            }
            roll -= w;
        }
        Strategy::Basic
    }

    /// Record one attempt and run adaptation if any trigger fires
    pub fn record(&self, attempt: &AttemptRecord, signature_key: Option<&str>) {
        let domain = domain_of(&attempt.url);
        let success = attempt.outcome == Outcome::Success;

        let mut state = self.state.lock();

        let domain_entry = state
            .domain_stats
            .entry(domain.clone())
            .or_default()
            .entry(attempt.strategy)
            .or_default();
        domain_entry.total += 1;
        if success {
            domain_entry.success += 1;
        }
        *domain_entry.per_stage.entry(attempt.stage).or_default() += 1;

        if let Some(key) = signature_key {
            let sig_entry = state
                .signature_stats
                .entry(key.to_string())
                .or_default()
                .entry(attempt.strategy)
                .or_default();
            sig_entry.total += 1;
            if success {
                sig_entry.success += 1;
            }
            *sig_entry.per_stage.entry(attempt.stage).or_default() += 1;
        }

        if success {
            state.consecutive_failures.insert(domain.clone(), 0);
        } else {
            *state.consecutive_failures.entry(domain.clone()).or_default() += 1;
        }

        state.recent.push_back(RecentAttempt {
            domain: domain.clone(),
            strategy: attempt.strategy,
            success,
            error_kind: attempt.error_kind,
        });
        while state.recent.len() > RECENT_ATTEMPTS_CAP {
            state.recent.pop_front();
        }

        // Adaptation triggers: interval elapsed, rolling rate collapsed,
        // or this domain just hit the consecutive-failure limit.
        let now = Utc::now();
        let interval_due = now - state.last_adapt > Duration::seconds(ADAPT_INTERVAL_SECS);
        let rolling_bad = {
            let window: Vec<_> = state.recent.iter().rev().take(ROLLING_WINDOW).collect();
            window.len() >= ROLLING_WINDOW
                && (window.iter().filter(|a| a.success).count() as f64 / window.len() as f64)
                    < LOW_SUCCESS_THRESHOLD
        };
        let domain_stuck = state
            .consecutive_failures
            .get(&domain)
            .map(|c| *c >= CONSECUTIVE_FAILURE_LIMIT)
            .unwrap_or(false);

        if interval_due || rolling_bad || domain_stuck {
            Self::adapt(&mut state, now);
        }
    }

    /// Dominant error kind for a domain over the recent window
    fn dominant_error(state: &LearnerState, domain: &str) -> Option<ErrorKind> {
        let mut counts: HashMap<ErrorKind, u32> = HashMap::new();
        for attempt in state.recent.iter().rev() {
            if attempt.domain == domain && !attempt.success {
                if let Some(kind) = attempt.error_kind {
                    *counts.entry(kind).or_default() += 1;
                }
            }
        }
        counts.into_iter().max_by_key(|(_, c)| *c).map(|(k, _)| k)
    }

    /// Strategy that addresses a given failure mode
    fn remedy_for(kind: ErrorKind) -> Strategy {
        match kind {
            ErrorKind::CaptchaRequired => Strategy::CaptchaSolver,
            ErrorKind::LoginRequired => Strategy::Login,
            ErrorKind::RegistrationRequired => Strategy::Register,
            ErrorKind::PaymentRequired => Strategy::Payment,
            ErrorKind::JavascriptRequired => Strategy::JsInteractive,
            _ => Strategy::AiEnhanced,
        }
    }

    /// Apply all pending improvements atomically (the caller holds the lock)
    fn adapt(state: &mut LearnerState, now: DateTime<Utc>) {
        let mut improvements = 0usize;

        // 1. Cut weights of chronically poor strategies, floored.
        let mut global: HashMap<Strategy, StrategyStats> = HashMap::new();
        for per_strategy in state.domain_stats.values() {
            for (strategy, stats) in per_strategy {
                let g = global.entry(*strategy).or_default();
                g.success += stats.success;
                g.total += stats.total;
            }
        }
        for (strategy, stats) in &global {
            if stats.total >= POOR_STRATEGY_MIN_TOTAL && stats.rate() < POOR_STRATEGY_RATE {
                let w = state.strategy_weights.entry(*strategy).or_insert(WEIGHT_FLOOR);
                let reduced = (*w * 0.5).max(WEIGHT_FLOOR);
                if (reduced - *w).abs() > f64::EPSILON {
                    *w = reduced;
                    improvements += 1;
                }
            }
        }
        // Renormalize above the floor so the mass stays constant
        let total: f64 = state.strategy_weights.values().sum();
        if total > 0.0 {
            for w in state.strategy_weights.values_mut() {
                *w = (*w / total).max(WEIGHT_FLOOR);
            }
        }

        // 2. Pin a remedial strategy to each stuck domain.
        let stuck: Vec<String> = state
            .consecutive_failures
            .iter()
            .filter(|(_, c)| **c >= CONSECUTIVE_FAILURE_LIMIT)
            .map(|(d, _)| d.clone())
            .collect();
        for domain in stuck {
            let already_ruled = state
                .rules
                .iter()
                .any(|r| r.domain == domain && r.is_active(now));
            if already_ruled {
                continue;
            }

            // Prefer a strategy proven on this domain; otherwise pick the
            // remedy for its dominant failure mode.
            let proven = state.domain_stats.get(&domain).and_then(|per| {
                per.iter()
                    .filter(|(_, s)| s.total >= 5 && s.rate() >= 0.10)
                    .max_by(|a, b| a.1.rate().total_cmp(&b.1.rate()))
                    .map(|(strategy, _)| *strategy)
            });
            let strategy = proven.unwrap_or_else(|| {
                Self::dominant_error(state, &domain)
                    .map(Self::remedy_for)
                    .unwrap_or(Strategy::AiEnhanced)
            });

            info!("adaptation: pinning {} to {}", strategy, domain);
            state.rules.push(AdaptationRule {
                domain,
                strategy,
                created: now,
                expires: Some(now + Duration::seconds(RULE_TTL_SECS)),
            });
            improvements += 1;
        }

        // 3. Raise retry budgets for frequent error kinds.
        let mut error_counts: HashMap<ErrorKind, u32> = HashMap::new();
        for attempt in state.recent.iter().rev().take(ROLLING_WINDOW) {
            if let Some(kind) = attempt.error_kind {
                *error_counts.entry(kind).or_default() += 1;
            }
        }
        for (kind, count) in error_counts {
            if count >= 5 {
                let policy = state.error_policies.entry(kind).or_default();
                if policy.retries < 3 {
                    policy.retries += 1;
                    policy.timeout_extension_secs += 15;
                    improvements += 1;
                }
            }
        }

        state.rules.retain(|r| r.is_active(now));
        state.last_adapt = now;
        if improvements > 0 {
            debug!("adaptation applied {} improvements", improvements);
        }
    }

    /// Retry policy for an error kind (default when never adapted)
    pub fn error_policy(&self, kind: ErrorKind) -> ErrorPolicy {
        self.state
            .lock()
            .error_policies
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    /// Current weights; exposed for invariant checks and diagnostics
    pub fn weights(&self) -> HashMap<Strategy, f64> {
        self.state.lock().strategy_weights.clone()
    }

    /// Aggregate success/total for a (domain, strategy) pair
    pub fn stats_for(&self, domain: &str, strategy: Strategy) -> Option<StrategyStats> {
        self.state
            .lock()
            .domain_stats
            .get(domain)
            .and_then(|per| per.get(&strategy))
            .cloned()
    }
}

impl Default for PatternLearner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use magpie_core::Stage;

    fn failure(url: &str, strategy: Strategy, kind: ErrorKind) -> AttemptRecord {
        AttemptRecord::failure(url, strategy, Stage::Loaded, kind, "w1")
    }

    fn success(url: &str, strategy: Strategy) -> AttemptRecord {
        AttemptRecord::success(url, strategy, Stage::ExtractedAddress, "w1")
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(domain_of("http://abc.onion/shop"), "abc.onion");
        assert_eq!(domain_of("https://example.com:8080/x"), "example.com");
    }

    #[test]
    fn test_unseen_onion_defaults_to_ai_enhanced() {
        let learner = PatternLearner::new();
        assert_eq!(learner.choose("http://fresh.onion/", None), Strategy::AiEnhanced);
        assert_eq!(learner.choose("http://fresh.example.com/", None), Strategy::Basic);
    }

    #[test]
    fn test_proven_domain_strategy_wins() {
        let learner = PatternLearner::new();
        for _ in 0..5 {
            learner.record(&success("http://shop.onion/", Strategy::Payment), None);
        }
        assert_eq!(learner.choose("http://shop.onion/page", None), Strategy::Payment);
    }

    #[test]
    fn test_consecutive_captcha_failures_pin_captcha_solver() {
        // Three basic/captcha_required failures on one domain; the fourth
        // choose() must return captcha-solver unprompted.
        let learner = PatternLearner::new();
        for _ in 0..3 {
            learner.record(
                &failure("http://x.onion/", Strategy::Basic, ErrorKind::CaptchaRequired),
                None,
            );
        }
        assert_eq!(learner.choose("http://x.onion/", None), Strategy::CaptchaSolver);
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let learner = PatternLearner::new();
        for _ in 0..2 {
            learner.record(
                &failure("http://y.onion/", Strategy::Basic, ErrorKind::SiteUnavailable),
                None,
            );
        }
        learner.record(&success("http://y.onion/", Strategy::Basic), None);
        learner.record(
            &failure("http://y.onion/", Strategy::Basic, ErrorKind::SiteUnavailable),
            None,
        );
        // Only one consecutive failure now, so no rule was created
        let state = learner.state.lock();
        assert!(state.rules.is_empty());
    }

    #[test]
    fn test_weights_respect_floor_and_positive_sum() {
        let learner = PatternLearner::new();
        // Drown one strategy in failures to trigger weight cuts
        for i in 0..30 {
            learner.record(
                &failure(
                    &format!("http://site{}.onion/", i),
                    Strategy::Basic,
                    ErrorKind::UnknownError,
                ),
                None,
            );
        }
        let weights = learner.weights();
        let sum: f64 = weights.values().sum();
        assert!(sum > 0.0);
        for w in weights.values() {
            assert!(*w >= WEIGHT_FLOOR - f64::EPSILON);
        }
    }

    #[test]
    fn test_signature_stats_used_across_domains() {
        let learner = PatternLearner::new();
        for i in 0..5 {
            learner.record(
                &success(&format!("http://a{}.onion/", i), Strategy::Register),
                Some("sigkey1"),
            );
        }
        // Seen domain with no domain-level evidence, but a known signature
        learner.record(
            &failure("http://b.onion/", Strategy::Basic, ErrorKind::UnknownError),
            Some("sigkey1"),
        );
        assert_eq!(
            learner.choose("http://b.onion/", Some("sigkey1")),
            Strategy::Register
        );
    }

    #[test]
    fn test_save_load_reproduces_choices() {
        let path = std::env::temp_dir().join(format!(
            "magpie_pattern_{}.json",
            std::process::id()
        ));
        let learner = PatternLearner::load(&path);
        for _ in 0..5 {
            learner.record(&success("http://shop.onion/", Strategy::Payment), Some("k1"));
        }
        for _ in 0..3 {
            learner.record(
                &failure("http://x.onion/", Strategy::Basic, ErrorKind::CaptchaRequired),
                None,
            );
        }
        learner.checkpoint().unwrap();
        assert!(!path.with_extension("tmp").exists());

        let reloaded = PatternLearner::load(&path);
        assert_eq!(
            learner.choose("http://shop.onion/", Some("k1")),
            reloaded.choose("http://shop.onion/", Some("k1"))
        );
        assert_eq!(
            learner.choose("http://x.onion/", None),
            reloaded.choose("http://x.onion/", None)
        );
        assert_eq!(
            learner.stats_for("shop.onion", Strategy::Payment).unwrap().total,
            reloaded.stats_for("shop.onion", Strategy::Payment).unwrap().total
        );
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_error_policy_raised_for_frequent_kind() {
        let learner = PatternLearner::new();
        for i in 0..6 {
            learner.record(
                &failure(
                    &format!("http://t{}.onion/", i),
                    Strategy::Basic,
                    ErrorKind::ConnectionTimeout,
                ),
                None,
            );
        }
        // Force an adaptation pass via a stuck domain
        for _ in 0..3 {
            learner.record(
                &failure("http://stuck.onion/", Strategy::Basic, ErrorKind::ConnectionTimeout),
                None,
            );
        }
        let policy = learner.error_policy(ErrorKind::ConnectionTimeout);
        assert!(policy.retries >= 2);
        assert!(policy.timeout_extension_secs >= 15);
    }
}
