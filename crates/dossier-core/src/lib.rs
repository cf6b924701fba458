//! Two-phase company research pipeline with model validation.
//!
//! Phase 1 collects web-search evidence per company through templated
//! queries; completed queries are never re-issued, so evidence can be
//! reprocessed indefinitely. Phase 2 renders the evidence into a
//! deterministic prompt and asks an LLM for a structured profile. A
//! reference model's output serves as cached ground truth against which
//! candidate models are graded field by field, using per-field matching
//! strategies up to and including an LLM judge.

pub mod clock;
pub mod config;
pub mod consensus;
pub mod engine;
pub mod fields;
pub mod fingerprint;
pub mod grading;
pub mod ground_truth;
pub mod model;
pub mod parse;
pub mod pricing;
pub mod prompt;
pub mod providers;
pub mod queries;
pub mod scoring;
pub mod storage;

pub use config::{load_config, ResearchConfig};
pub use engine::runner::Runner;
pub use storage::Store;
