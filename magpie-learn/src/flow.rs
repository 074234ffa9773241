//! Transaction-flow learner
//!
//! Remembers multi-step interaction sequences (product, modal, form,
//! address) that produced an address before, and proposes them for replay on
//! pages with a similar shape. Sequences are never physically deleted;
//! chronic failures only demote them so they can recover later.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::store::{load_or_default, save_json, LearnError};

/// Success rate below which a sequence is demoted (with enough usage)
const DEMOTION_RATE: f64 = 0.2;

/// Uses before the demotion rate is trusted
const DEMOTION_MIN_USES: u64 = 4;

/// Maximum sequences proposed per page
const MAX_PROPOSALS: usize = 3;

/// One interaction step in a replayable sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxAction {
    FindProduct,
    ClickButton,
    WaitForModal,
    FillForm,
    SubmitForm,
    SelectPriceOption,
    ClickContinue,
}

/// An action plus its action-specific parameters
///
/// Parameters use a `BTreeMap` so the pattern hash is order-independent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxStep {
    pub action: TxAction,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl TxStep {
    pub fn new(action: TxAction) -> Self {
        Self { action, params: BTreeMap::new() }
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }
}

/// A recorded sequence with its track record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionSequence {
    pub pattern_hash: String,
    pub steps: Vec<TxStep>,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_used: DateTime<Utc>,
    #[serde(default)]
    pub demoted: bool,
}

impl TransactionSequence {
    pub fn success_rate(&self) -> f64 {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            0.0
        } else {
            self.success_count as f64 / total as f64
        }
    }

    pub fn usage_count(&self) -> u64 {
        self.success_count + self.failure_count
    }
}

/// Stable hash over the step list
pub fn pattern_hash(steps: &[TxStep]) -> String {
    let mut hasher = Sha256::new();
    for step in steps {
        // serde_json over a struct with a BTreeMap is deterministic
        let encoded = serde_json::to_string(step).unwrap_or_default();
        hasher.update(encoded.as_bytes());
        hasher.update(b"|");
    }
    let digest = hasher.finalize();
    digest.iter().take(8).map(|b| format!("{:02x}", b)).collect()
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FlowState {
    sequences: HashMap<String, TransactionSequence>,
    /// signature key -> hashes observed on pages with that shape
    signature_index: HashMap<String, Vec<String>>,
}

/// The learner; a single mutex guards all flow state
pub struct FlowLearner {
    state: Mutex<FlowState>,
    path: Option<PathBuf>,
}

impl FlowLearner {
    pub fn new() -> Self {
        Self { state: Mutex::new(FlowState::default()), path: None }
    }

    pub fn load(path: &Path) -> Self {
        Self {
            state: Mutex::new(load_or_default(path)),
            path: Some(path.to_path_buf()),
        }
    }

    pub fn checkpoint(&self) -> Result<(), LearnError> {
        let Some(path) = &self.path else { return Ok(()) };
        let state = self.state.lock();
        save_json(path, &*state)
    }

    /// Record the outcome of a replayed or freshly discovered sequence
    pub fn record_outcome(&self, signature_key: &str, steps: &[TxStep], succeeded: bool) {
        if steps.is_empty() {
            return;
        }
        let hash = pattern_hash(steps);
        let mut state = self.state.lock();

        let seq = state
            .sequences
            .entry(hash.clone())
            .or_insert_with(|| TransactionSequence {
                pattern_hash: hash.clone(),
                steps: steps.to_vec(),
                success_count: 0,
                failure_count: 0,
                last_used: Utc::now(),
                demoted: false,
            });

        if succeeded {
            seq.success_count += 1;
        } else {
            seq.failure_count += 1;
        }
        seq.last_used = Utc::now();

        // Demote, never delete; recovery is possible once the rate climbs back
        if seq.usage_count() >= DEMOTION_MIN_USES {
            seq.demoted = seq.success_rate() < DEMOTION_RATE;
        }

        let index = state.signature_index.entry(signature_key.to_string()).or_default();
        if !index.contains(&hash) {
            index.push(hash.clone());
        }

        debug!(
            "flow {} on {}: {}",
            hash,
            signature_key,
            if succeeded { "success" } else { "failure" }
        );
    }

    /// Propose up to three sequences for a page shape
    ///
    /// Deterministic in the persisted state: ranked by success rate, then
    /// usage count, then hash.
    pub fn recommend(&self, signature_key: &str) -> Vec<TransactionSequence> {
        let state = self.state.lock();
        let Some(hashes) = state.signature_index.get(signature_key) else {
            return Vec::new();
        };

        let mut candidates: Vec<&TransactionSequence> = hashes
            .iter()
            .filter_map(|h| state.sequences.get(h))
            .filter(|s| !s.demoted && s.success_count > 0)
            .collect();

        candidates.sort_by(|a, b| {
            b.success_rate()
                .total_cmp(&a.success_rate())
                .then(b.usage_count().cmp(&a.usage_count()))
                .then(a.pattern_hash.cmp(&b.pattern_hash))
        });

        candidates.into_iter().take(MAX_PROPOSALS).cloned().collect()
    }
}

impl Default for FlowLearner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buy_steps() -> Vec<TxStep> {
        vec![
            TxStep::new(TxAction::FindProduct),
            TxStep::new(TxAction::ClickButton).with_param("text", "buy now"),
            TxStep::new(TxAction::WaitForModal),
            TxStep::new(TxAction::FillForm).with_param("field", "email"),
            TxStep::new(TxAction::SubmitForm),
        ]
    }

    fn cart_steps() -> Vec<TxStep> {
        vec![
            TxStep::new(TxAction::FindProduct),
            TxStep::new(TxAction::SelectPriceOption).with_param("pick", "highest"),
            TxStep::new(TxAction::ClickContinue),
        ]
    }

    #[test]
    fn test_pattern_hash_stable_and_distinct() {
        assert_eq!(pattern_hash(&buy_steps()), pattern_hash(&buy_steps()));
        assert_ne!(pattern_hash(&buy_steps()), pattern_hash(&cart_steps()));
        assert_eq!(pattern_hash(&buy_steps()).len(), 16);
    }

    #[test]
    fn test_recommend_ranks_by_success_rate() {
        let learner = FlowLearner::new();
        learner.record_outcome("sig1", &buy_steps(), true);
        learner.record_outcome("sig1", &buy_steps(), true);
        learner.record_outcome("sig1", &cart_steps(), true);
        learner.record_outcome("sig1", &cart_steps(), false);

        let proposals = learner.recommend("sig1");
        assert_eq!(proposals.len(), 2);
        assert_eq!(proposals[0].pattern_hash, pattern_hash(&buy_steps()));
    }

    #[test]
    fn test_recommend_is_deterministic() {
        let learner = FlowLearner::new();
        learner.record_outcome("sig1", &buy_steps(), true);
        learner.record_outcome("sig1", &cart_steps(), true);
        let a: Vec<String> = learner.recommend("sig1").iter().map(|s| s.pattern_hash.clone()).collect();
        let b: Vec<String> = learner.recommend("sig1").iter().map(|s| s.pattern_hash.clone()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_demotion_and_recovery() {
        let learner = FlowLearner::new();
        // One success then a run of failures drops the rate below the floor
        learner.record_outcome("sig1", &buy_steps(), true);
        for _ in 0..5 {
            learner.record_outcome("sig1", &buy_steps(), false);
        }
        assert!(learner.recommend("sig1").is_empty());

        // The sequence still exists and can recover
        for _ in 0..6 {
            learner.record_outcome("sig1", &buy_steps(), true);
        }
        assert_eq!(learner.recommend("sig1").len(), 1);
    }

    #[test]
    fn test_unknown_signature_empty() {
        let learner = FlowLearner::new();
        assert!(learner.recommend("nope").is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let path = std::env::temp_dir().join(format!("magpie_flow_{}.json", std::process::id()));
        let learner = FlowLearner::load(&path);
        learner.record_outcome("sig1", &buy_steps(), true);
        learner.checkpoint().unwrap();

        let reloaded = FlowLearner::load(&path);
        let a: Vec<String> = learner.recommend("sig1").iter().map(|s| s.pattern_hash.clone()).collect();
        let b: Vec<String> = reloaded.recommend("sig1").iter().map(|s| s.pattern_hash.clone()).collect();
        assert_eq!(a, b);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_at_most_three_proposals() {
        let learner = FlowLearner::new();
        for i in 0..5 {
            let steps = vec![TxStep::new(TxAction::ClickButton).with_param("text", &format!("b{}", i))];
            learner.record_outcome("sig1", &steps, true);
        }
        assert_eq!(learner.recommend("sig1").len(), 3);
    }
}
