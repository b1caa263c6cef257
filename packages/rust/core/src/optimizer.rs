//! Query optimization: rewrite a free-form question into a search query.

use std::sync::Arc;

use tracing::{debug, instrument};

use webresolve_shared::{ChatModel, Result, WebResolveError};

use crate::prompts;

/// Rewrites questions into ranked-retrieval queries with a language model.
#[derive(Clone)]
pub struct QueryOptimizer {
    model: Arc<dyn ChatModel>,
}

impl QueryOptimizer {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Produce an optimized query for `question`.
    ///
    /// Any model failure, or a completion that is blank once trimmed, is an
    /// [`WebResolveError::Optimization`].
    #[instrument(skip_all, fields(model = self.model.model_name()))]
    pub async fn optimize(&self, question: &str) -> Result<String> {
        let completion = self
            .model
            .complete(&prompts::query_optimization(question))
            .await
            .map_err(|e| WebResolveError::Optimization(e.to_string()))?;

        let query = clean_query(&completion);
        if query.is_empty() {
            return Err(WebResolveError::Optimization(
                "model returned an empty query".into(),
            ));
        }

        debug!(%query, "optimized query");
        Ok(query)
    }
}

/// Trim whitespace and a wrapping code span the model may add.
fn clean_query(raw: &str) -> String {
    raw.trim().trim_matches('`').trim().to_string()
}
