//! libdayi crate root
//!
//! This crate provides the Dàyì-specific pieces on top of `libdayi-core`:
//! loading runtime artifacts from a data directory, parsing raw code
//! buffers, and a `SentenceSession` that tracks the alternative on screen.
//!
//! Public API exported here:
//! - `DayiConfig` from `config`
//! - `CodeParser` from `parser`
//! - `Engine` from `engine`
//! - `SentenceSession` from `session`

pub mod config;
pub mod engine;
pub mod parser;
pub mod session;

// Convenience re-exports for common types used by callers.
pub use config::DayiConfig;
pub use engine::{convert_artifacts, Engine};
pub use parser::{is_valid_code, CodeParser};
pub use session::SentenceSession;

pub use libdayi_core::{
    AdaptationStats, Candidate, Config, CorrectionEvent, Error, PathStep, Prediction, Result,
    ScoredCandidate, Smoothing,
};
