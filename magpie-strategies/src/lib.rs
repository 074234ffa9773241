//! Magpie Strategy Layer
//!
//! Everything that happens between "page loaded" and "address extracted":
//! the escalating interaction pipeline, purchase and account flows, form
//! filling heuristics, link prioritization, and the optional LLM oracle for
//! CAPTCHA reading and identity generation.

pub mod flows;
pub mod forms;
pub mod links;
pub mod oracle;
pub mod pipeline;

pub use flows::*;
pub use forms::*;
pub use links::*;
pub use oracle::{Oracle, OracleConfig, OracleError};
pub use pipeline::{run_pipeline, PipelineContext, PipelineReport};
