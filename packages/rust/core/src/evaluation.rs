//! Language-model backed semantic evaluator and relevance comparator.
//!
//! Both talk to a [`ChatModel`] through the prompts in [`crate::prompts`]
//! and turn the free-text completion into a typed result. Output that does
//! not follow the expected format is an
//! [`WebResolveError::EvaluationParse`], which the engine records against the
//! candidate and moves past.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, instrument};

use webresolve_shared::{
    ChatModel, EvaluationResult, RelevanceComparator, Relevance, Result, SemanticEvaluator,
    Strategy, WebResolveError,
};

use crate::prompts::{self, truncate_content};

/// A fenced block wrapping the whole completion, with or without a `json` tag.
static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^```(?i:json)?\s*(.*?)\s*```$").expect("valid regex"));

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// [`SemanticEvaluator`] with one model per strategy.
pub struct LlmEvaluator {
    strict: Arc<dyn ChatModel>,
    loose: Arc<dyn ChatModel>,
    max_content_chars: usize,
}

impl LlmEvaluator {
    pub fn new(
        strict: Arc<dyn ChatModel>,
        loose: Arc<dyn ChatModel>,
        max_content_chars: usize,
    ) -> Self {
        Self {
            strict,
            loose,
            max_content_chars,
        }
    }

    fn model(&self, strategy: Strategy) -> &dyn ChatModel {
        match strategy {
            Strategy::Strict => self.strict.as_ref(),
            Strategy::Loose => self.loose.as_ref(),
        }
    }
}

#[async_trait]
impl SemanticEvaluator for LlmEvaluator {
    #[instrument(skip_all, fields(%strategy, content_len = content.len()))]
    async fn evaluate(
        &self,
        content: &str,
        question: &str,
        strategy: Strategy,
    ) -> Result<EvaluationResult> {
        let content = truncate_content(content, self.max_content_chars);
        let prompt = prompts::content_analysis(strategy, &content, question);

        let raw = self.model(strategy).complete(&prompt).await?;
        debug!(raw_len = raw.len(), "analysis completion received");

        let result = parse_evaluation(&raw)?;
        debug!(
            confidence = result.confidence,
            reasoning = %result.reasoning,
            "analysis parsed"
        );
        Ok(result)
    }
}

/// Parse an analysis completion into an [`EvaluationResult`].
///
/// Newlines are flattened and a wrapping code fence is removed before the
/// JSON object is read. `confidence` may be a number or a numeric string and
/// must lie in `[0, 1]`; `response` and `reasoning` must be present, and
/// non-string values are kept as their JSON text.
pub fn parse_evaluation(raw: &str) -> Result<EvaluationResult> {
    let flattened = raw.replace(['\r', '\n'], " ");
    let body = strip_fence(flattened.trim());

    let value: Value = serde_json::from_str(body)
        .map_err(|e| WebResolveError::evaluation_parse(format!("invalid JSON: {e}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| WebResolveError::evaluation_parse("expected a JSON object"))?;

    let confidence = match object.get("confidence") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| WebResolveError::evaluation_parse("missing or non-numeric `confidence`"))?;

    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Err(WebResolveError::evaluation_parse(format!(
            "`confidence` out of range: {confidence}"
        )));
    }

    Ok(EvaluationResult {
        confidence,
        answer: text_field(object, "response")?,
        reasoning: text_field(object, "reasoning")?,
    })
}

fn text_field(object: &serde_json::Map<String, Value>, name: &str) -> Result<String> {
    match object.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        None | Some(Value::Null) => Err(WebResolveError::evaluation_parse(format!(
            "missing `{name}`"
        ))),
        Some(other) => Ok(other.to_string()),
    }
}

fn strip_fence(text: &str) -> &str {
    FENCE_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map_or(text, |m| m.as_str())
}

// ---------------------------------------------------------------------------
// Comparator
// ---------------------------------------------------------------------------

/// [`RelevanceComparator`] asking a model for a 0/1 verdict.
pub struct LlmRelevanceComparator {
    model: Arc<dyn ChatModel>,
    max_content_chars: usize,
}

impl LlmRelevanceComparator {
    pub fn new(model: Arc<dyn ChatModel>, max_content_chars: usize) -> Self {
        Self {
            model,
            max_content_chars,
        }
    }
}

#[async_trait]
impl RelevanceComparator for LlmRelevanceComparator {
    #[instrument(skip_all)]
    async fn compare(&self, first: &str, second: &str, question: &str) -> Result<Relevance> {
        // Both sides share the budget so neither is dropped from the prompt.
        let budget = self.max_content_chars / 2;
        let prompt = prompts::relevance_comparison(
            &truncate_content(first, budget),
            &truncate_content(second, budget),
            question,
        );

        let raw = self.model.complete(&prompt).await?;
        let relevance = parse_relevance(&raw)?;
        debug!(flag = relevance.flag(), "relevance compared");
        Ok(relevance)
    }
}

/// Parse the comparator's integer verdict.
pub fn parse_relevance(raw: &str) -> Result<Relevance> {
    let text = strip_fence(raw.trim()).trim().trim_matches('`').trim();
    text.parse::<i64>()
        .ok()
        .and_then(Relevance::from_flag)
        .ok_or_else(|| {
            WebResolveError::evaluation_parse(format!("expected 0 or 1, got {text:?}"))
        })
}
