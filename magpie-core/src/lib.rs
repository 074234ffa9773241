//! Magpie Core - domain model for hidden-service address harvesting
//!
//! Foundational primitives shared by every other crate:
//! - Supported chains and syntactic address validation
//! - Regex-driven address extraction with false-positive filtering
//! - Strategy / stage / error-kind taxonomies and attempt records
//! - Structural content signatures for cross-domain learning
//! - The `Finding` output record and taxonomy classifier
//! - Synthetic identity bundles for form filling

pub mod attempt;
pub mod chain;
pub mod extract;
pub mod finding;
pub mod identity;
pub mod signature;
pub mod taxonomy;

pub use attempt::*;
pub use chain::*;
pub use extract::*;
pub use finding::*;
pub use identity::*;
pub use signature::*;
pub use taxonomy::*;

/// Cap on in-memory recent attempt records
pub const RECENT_ATTEMPTS_CAP: usize = 1000;

/// Floor for any strategy weight in the learner distribution
pub const WEIGHT_FLOOR: f64 = 0.05;

/// Consecutive failures on one domain before adaptation kicks in
pub const CONSECUTIVE_FAILURE_LIMIT: u32 = 3;

/// Rolling window for the low-success adaptation trigger
pub const ROLLING_WINDOW: usize = 50;

/// Rolling success rate below which adaptation triggers
pub const LOW_SUCCESS_THRESHOLD: f64 = 0.10;
