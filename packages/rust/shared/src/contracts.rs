//! Interfaces of the collaborators the resolution engine drives.
//!
//! Concrete implementations live in the adapter crates (`webresolve-search`,
//! `webresolve-fetcher`, `webresolve-llm`) and in `webresolve-core`; the
//! engine only ever sees these traits, so tests can swap in fakes.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Candidate, EvaluationResult, Relevance, Strategy};

/// Ranked retrieval over the web.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Return a bounded, rank-ordered candidate list for `query`.
    ///
    /// A failure here leaves nothing to evaluate and is fatal to the attempt.
    async fn search(&self, query: &str) -> Result<Vec<Candidate>>;
}

/// Retrieves a candidate's content as normalized text.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch `url`; non-2xx responses and transport errors are `Fetch` errors.
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// A single-turn text completion capability.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send `prompt` as one user message and return the completion text.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Model identifier, for logging.
    fn model_name(&self) -> &str;
}

/// Judges whether some content answers a question.
#[async_trait]
pub trait SemanticEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        content: &str,
        question: &str,
        strategy: Strategy,
    ) -> Result<EvaluationResult>;
}

/// Decides which of two contents is more relevant to a question.
#[async_trait]
pub trait RelevanceComparator: Send + Sync {
    async fn compare(&self, first: &str, second: &str, question: &str) -> Result<Relevance>;
}
