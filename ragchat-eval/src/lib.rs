//! # ragchat-eval: offline answer grading and live exercise drivers
//!
//! - [`scorer`]: heuristic four-dimension quality scorer
//! - [`harness`]: stdin/stdout grading protocol built on the scorer
//! - [`drivers`]: HTTP clients that replay test prompts against a running
//!   service (`/chat`, `/query`, `/embed`, `/text`)

pub mod drivers;
pub mod error;
pub mod harness;
pub mod scorer;

pub use drivers::{
    DriverSettings, ProbeRequest, ProviderResponse, Target, TargetConfig, TargetKind, target_for,
};
pub use error::{EvalError, Result};
pub use harness::{GradeRequest, GradeResponse, grade, run_stdio};
pub use scorer::{QualityScorer, QualityVerdict, ScorerConfig, SubScores};
