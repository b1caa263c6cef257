//! Shared types, error model, and configuration for WebResolve.
//!
//! This crate is the foundation depended on by all other WebResolve crates.
//! It provides:
//! - [`WebResolveError`]: the unified error type
//! - Domain types ([`Candidate`], [`EvaluationResult`], [`Strategy`], [`Relevance`])
//! - Collaborator traits ([`SearchProvider`], [`PageFetcher`], [`ChatModel`],
//!   [`SemanticEvaluator`], [`RelevanceComparator`])
//! - Configuration ([`AppConfig`], [`ResolutionConfig`], config loading)

pub mod config;
pub mod contracts;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BelowThresholdPolicy, EarlyStop, FetchConfig, ModelRole, OpenRouterConfig,
    ResolutionConfig, ResolutionSettings, SearchConfig, config_dir, config_file_path,
    init_config, init_config_at, load_config, load_config_from, read_api_key, validate_api_keys,
    validate_config,
};
pub use contracts::{ChatModel, PageFetcher, RelevanceComparator, SearchProvider, SemanticEvaluator};
pub use error::{Result, WebResolveError};
pub use types::{
    AttemptId, Candidate, EvaluationResult, NO_RESULTS_FOUND, Relevance, SearchVariant, Strategy,
};
