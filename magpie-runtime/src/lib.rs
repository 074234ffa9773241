//! Magpie Runtime
//!
//! Wires the layers into a running engine: the CSV result sink, the per-URL
//! worker, and the bounded concurrent pool with graceful shutdown and
//! periodic learner checkpoints.

pub mod engine;
pub mod sink;
pub mod worker;

pub use engine::{Engine, EngineConfig, Summary, CHECKPOINT_INTERVAL};
pub use sink::{ResultSink, SinkError};
pub use worker::{process_url, UrlOutcome, WorkerContext};
