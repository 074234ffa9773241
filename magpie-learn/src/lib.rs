//! Magpie Learning Layer
//!
//! Two learners share this crate: the pattern learner, which picks the next
//! interaction strategy for a URL from per-domain and per-page-shape success
//! history, and the flow learner, which replays multi-step transaction
//! sequences that produced addresses before. Both checkpoint to JSON so
//! learning survives restarts.

pub mod flow;
pub mod pattern;
pub mod store;

pub use flow::{pattern_hash, FlowLearner, TransactionSequence, TxAction, TxStep};
pub use pattern::{AdaptationRule, ErrorPolicy, PatternLearner, StrategyStats};
pub use store::{load_or_default, save_json, LearnError};
