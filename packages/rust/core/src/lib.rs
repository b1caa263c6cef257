//! Resolution engine and language-model roles for WebResolve.
//!
//! This crate ties query optimization, search, page fetching, and semantic
//! evaluation into single-answer resolution attempts (see [`ResolutionEngine`]).

pub mod engine;
pub mod evaluation;
pub mod optimizer;
pub mod pipeline;
mod prompts;

pub use engine::{
    CandidateOutcome, CandidateReport, DiscardReason, FailureStage, Resolution, ResolutionEngine,
    ResolveProgress, SilentProgress,
};
pub use evaluation::{LlmEvaluator, LlmRelevanceComparator, parse_evaluation, parse_relevance};
pub use optimizer::QueryOptimizer;
pub use pipeline::WebResolver;
