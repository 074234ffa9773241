//! Attempt bookkeeping: strategies, stages, error kinds, records
//!
//! One [`AttemptRecord`] is emitted per strategy attempt and consumed by the
//! pattern learner. All three enums are closed sets; the learner's persisted
//! state depends on their serde names staying stable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Extraction strategies, ordered by increasing aggressiveness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    Basic,
    AiEnhanced,
    VisualCaptcha,
    JsInteractive,
    Custom,
    Register,
    Login,
    Payment,
    CaptchaSolver,
    Marketplace,
}

impl Strategy {
    pub const ALL: [Strategy; 10] = [
        Strategy::Basic,
        Strategy::AiEnhanced,
        Strategy::VisualCaptcha,
        Strategy::JsInteractive,
        Strategy::Custom,
        Strategy::Register,
        Strategy::Login,
        Strategy::Payment,
        Strategy::CaptchaSolver,
        Strategy::Marketplace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Basic => "basic",
            Strategy::AiEnhanced => "ai-enhanced",
            Strategy::VisualCaptcha => "visual-captcha",
            Strategy::JsInteractive => "js-interactive",
            Strategy::Custom => "custom",
            Strategy::Register => "register",
            Strategy::Login => "login",
            Strategy::Payment => "payment",
            Strategy::CaptchaSolver => "captcha-solver",
            Strategy::Marketplace => "marketplace",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Milestones in the interaction with a page, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Loaded,
    SolvedCaptcha,
    Registered,
    LoggedIn,
    AddedToCart,
    ExtractedAddress,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Loaded => "loaded",
            Stage::SolvedCaptcha => "solved_captcha",
            Stage::Registered => "registered",
            Stage::LoggedIn => "logged_in",
            Stage::AddedToCart => "added_to_cart",
            Stage::ExtractedAddress => "extracted_address",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed taxonomy of per-attempt failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CaptchaRequired,
    LoginRequired,
    RegistrationRequired,
    PaymentRequired,
    ConnectionTimeout,
    JavascriptRequired,
    FormValidationFailed,
    AccessBlocked,
    SiteUnavailable,
    UnknownError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::CaptchaRequired => "captcha_required",
            ErrorKind::LoginRequired => "login_required",
            ErrorKind::RegistrationRequired => "registration_required",
            ErrorKind::PaymentRequired => "payment_required",
            ErrorKind::ConnectionTimeout => "connection_timeout",
            ErrorKind::JavascriptRequired => "javascript_required",
            ErrorKind::FormValidationFailed => "form_validation_failed",
            ErrorKind::AccessBlocked => "access_blocked",
            ErrorKind::SiteUnavailable => "site_unavailable",
            ErrorKind::UnknownError => "unknown_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single strategy attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

/// One attempt as observed by the worker pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub url: String,
    pub strategy: Strategy,
    pub stage: Stage,
    pub outcome: Outcome,
    pub error_kind: Option<ErrorKind>,
    pub timestamp: DateTime<Utc>,
    pub worker_id: String,
}

impl AttemptRecord {
    pub fn success(url: &str, strategy: Strategy, stage: Stage, worker_id: &str) -> Self {
        Self {
            url: url.to_string(),
            strategy,
            stage,
            outcome: Outcome::Success,
            error_kind: None,
            timestamp: Utc::now(),
            worker_id: worker_id.to_string(),
        }
    }

    pub fn failure(
        url: &str,
        strategy: Strategy,
        stage: Stage,
        error_kind: ErrorKind,
        worker_id: &str,
    ) -> Self {
        Self {
            url: url.to_string(),
            strategy,
            stage,
            outcome: Outcome::Failure,
            error_kind: Some(error_kind),
            timestamp: Utc::now(),
            worker_id: worker_id.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_ordering_by_aggressiveness() {
        assert!(Strategy::Basic < Strategy::CaptchaSolver);
        assert!(Strategy::Register < Strategy::Marketplace);
    }

    #[test]
    fn test_serde_names_stable() {
        assert_eq!(
            serde_json::to_string(&Strategy::CaptchaSolver).unwrap(),
            "\"captcha-solver\""
        );
        assert_eq!(
            serde_json::to_string(&Stage::SolvedCaptcha).unwrap(),
            "\"solved_captcha\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorKind::ConnectionTimeout).unwrap(),
            "\"connection_timeout\""
        );
    }

    #[test]
    fn test_attempt_record() {
        let rec = AttemptRecord::failure(
            "http://x.onion",
            Strategy::Basic,
            Stage::Loaded,
            ErrorKind::CaptchaRequired,
            "worker-1",
        );
        assert!(!rec.is_success());
        assert_eq!(rec.error_kind, Some(ErrorKind::CaptchaRequired));
    }
}
