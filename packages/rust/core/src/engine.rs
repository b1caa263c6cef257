//! The resolution engine.
//!
//! One attempt runs `optimize → search → evaluate(strict) → evaluate(loose)`:
//!
//! 1. The question is rewritten into a search query.
//! 2. The search provider returns a ranked candidate list, capped at
//!    `max_candidates`. No further results are ever requested.
//! 3. Each candidate is fetched and evaluated in provider order. The running
//!    best is replaced when a candidate scores strictly higher, and on an exact
//!    tie only when the relevance comparator favors the newcomer. A zero
//!    confidence is never accepted.
//! 4. After the strict pass, a best confidence above the threshold ends the
//!    attempt; otherwise the loose pass revisits the same candidates, keeping
//!    the running best.
//!
//! Only query optimization and retrieval failures abort an attempt. Anything
//! that goes wrong with a single candidate is recorded in its
//! [`CandidateOutcome`] and the loop moves on. A fixed delay separates
//! consecutive candidates across both passes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tracing::{debug, error, info, instrument, warn};

use webresolve_shared::{
    AttemptId, BelowThresholdPolicy, Candidate, EarlyStop, NO_RESULTS_FOUND, PageFetcher,
    Relevance, RelevanceComparator, ResolutionConfig, Result, SearchProvider, SearchVariant,
    SemanticEvaluator, Strategy, WebResolveError,
};

use crate::optimizer::QueryOptimizer;

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// Where in the per-candidate sequence a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Fetch,
    Evaluate,
    Compare,
}

/// Why an evaluated candidate did not become the running best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    /// The evaluator reported confidence 0.
    Unanswerable,
    /// Confidence below the running best.
    LowerConfidence,
    /// Tied with the running best and the comparator kept the incumbent.
    LostTieBreak,
    /// Tied with the running best, which came from this same candidate.
    /// The earlier answer is kept and the comparator is not consulted.
    SameSource,
}

/// What happened to one candidate in one pass.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CandidateOutcome {
    /// Became the running best.
    Accepted { confidence: f64, tie_break: bool },
    /// Evaluated but not kept.
    Discarded {
        confidence: f64,
        reason: DiscardReason,
    },
    /// A per-candidate error; the running best is unchanged.
    Failed {
        stage: FailureStage,
        #[serde(serialize_with = "serialize_error")]
        error: WebResolveError,
    },
}

impl CandidateOutcome {
    /// A failure whose error kind is not expected from a single candidate,
    /// such as a configuration error surfacing from a collaborator.
    pub fn is_unexpected_failure(&self) -> bool {
        matches!(self, Self::Failed { error, .. } if !error.is_recoverable())
    }
}

/// One candidate visit, in processing order.
#[derive(Debug, Serialize)]
pub struct CandidateReport {
    /// Position in the candidate list (0-based).
    pub index: usize,
    pub url: String,
    pub strategy: Strategy,
    #[serde(flatten)]
    pub outcome: CandidateOutcome,
}

/// Full account of a resolution attempt.
#[derive(Debug, Serialize)]
pub struct Resolution {
    pub attempt_id: AttemptId,
    pub variant: SearchVariant,
    pub question: String,
    /// Query actually sent to the search provider.
    pub search_query: String,
    /// The committed answer, or [`NO_RESULTS_FOUND`].
    pub answer: String,
    /// Confidence of the best accepted answer, if any.
    pub confidence: Option<f64>,
    /// Strategy under which the best answer was accepted.
    pub strategy: Option<Strategy>,
    /// Candidate URL the best answer came from.
    pub source_url: Option<String>,
    /// Whether the best confidence cleared the threshold.
    pub threshold_met: bool,
    pub candidate_count: usize,
    pub candidates: Vec<CandidateReport>,
    pub started_at: DateTime<Utc>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl Resolution {
    /// Whether the answer is the "no results found" sentinel.
    pub fn is_sentinel(&self) -> bool {
        self.answer == NO_RESULTS_FOUND
    }
}

fn serialize_error<S: Serializer>(
    error: &WebResolveError,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

fn serialize_millis<S: Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u128(duration.as_millis())
}

// ---------------------------------------------------------------------------
// Progress trait
// ---------------------------------------------------------------------------

/// Progress callback for a resolution attempt.
pub trait ResolveProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before a candidate is fetched.
    fn candidate(&self, strategy: Strategy, current: usize, total: usize, url: &str);
    /// Called once the attempt has produced its answer.
    fn done(&self, resolution: &Resolution);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ResolveProgress for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn candidate(&self, _strategy: Strategy, _current: usize, _total: usize, _url: &str) {}
    fn done(&self, _resolution: &Resolution) {}
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// The accepted answer and the content it came from, always replaced together.
struct Best {
    /// Position of the source candidate in the candidate list.
    index: usize,
    answer: String,
    content: String,
    url: String,
    strategy: Strategy,
}

/// Per-attempt running best. Never shared between attempts.
struct ResolutionState {
    best_confidence: f64,
    best: Option<Best>,
}

impl ResolutionState {
    fn new() -> Self {
        Self {
            best_confidence: -1.0,
            best: None,
        }
    }

    fn clears(&self, threshold: f64) -> bool {
        self.best.is_some() && self.best_confidence > threshold
    }

    fn replace(&mut self, confidence: f64, best: Best) {
        debug_assert!(confidence >= self.best_confidence);
        self.best_confidence = confidence;
        self.best = Some(best);
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Drives resolution attempts over injected collaborators.
pub struct ResolutionEngine {
    optimizer: QueryOptimizer,
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn PageFetcher>,
    evaluator: Arc<dyn SemanticEvaluator>,
    comparator: Arc<dyn RelevanceComparator>,
    config: ResolutionConfig,
}

impl ResolutionEngine {
    pub fn new(
        optimizer: QueryOptimizer,
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn PageFetcher>,
        evaluator: Arc<dyn SemanticEvaluator>,
        comparator: Arc<dyn RelevanceComparator>,
        config: ResolutionConfig,
    ) -> Self {
        Self {
            optimizer,
            search,
            fetcher,
            evaluator,
            comparator,
            config,
        }
    }

    pub fn config(&self) -> &ResolutionConfig {
        &self.config
    }

    /// Resolve `question` to an answer string.
    ///
    /// Returns [`NO_RESULTS_FOUND`] when no candidate produced a usable answer
    /// (or, under [`BelowThresholdPolicy::Sentinel`], none cleared the threshold).
    pub async fn resolve(&self, question: &str) -> Result<String> {
        self.resolve_report(question, SearchVariant::Web, &SilentProgress)
            .await
            .map(|resolution| resolution.answer)
    }

    /// Resolve `question` and return the full [`Resolution`].
    pub async fn resolve_report(
        &self,
        question: &str,
        variant: SearchVariant,
        progress: &dyn ResolveProgress,
    ) -> Result<Resolution> {
        let question = question.trim();
        if question.is_empty() {
            return Err(WebResolveError::validation("question must not be blank"));
        }
        self.run(AttemptId::new(), question, variant, progress).await
    }

    #[instrument(skip_all, fields(%attempt_id, variant = variant.as_str()))]
    async fn run(
        &self,
        attempt_id: AttemptId,
        question: &str,
        variant: SearchVariant,
        progress: &dyn ResolveProgress,
    ) -> Result<Resolution> {
        let started_at = Utc::now();
        let start = Instant::now();
        info!(%question, "starting resolution");

        // --- Optimize ---
        progress.phase("Optimizing query");
        let search_query = match self.optimizer.optimize(question).await {
            Ok(query) => query,
            Err(e) if self.config.fallback_to_question => {
                warn!(error = %e, "query optimization failed, searching with the question");
                question.to_string()
            }
            Err(e) => return Err(e),
        };

        // --- Retrieve ---
        progress.phase("Searching");
        let mut candidates = self
            .search
            .search(&search_query)
            .await
            .map_err(|e| match e {
                WebResolveError::Retrieval(_) => e,
                other => WebResolveError::Retrieval(other.to_string()),
            })?;
        candidates.truncate(self.config.max_candidates);
        info!(%search_query, candidates = candidates.len(), "retrieved candidates");

        // --- Evaluate ---
        let mut state = ResolutionState::new();
        let mut reports = Vec::with_capacity(candidates.len() * Strategy::ORDER.len());
        let mut threshold_met = false;
        let mut visited = 0usize;

        'passes: for strategy in Strategy::ORDER {
            progress.phase(match strategy {
                Strategy::Strict => "Evaluating (strict)",
                Strategy::Loose => "Evaluating (loose)",
            });
            debug!(%strategy, "starting evaluation pass");

            for (index, candidate) in candidates.iter().enumerate() {
                if visited > 0 && !self.config.delay.is_zero() {
                    debug!(delay_ms = self.config.delay.as_millis() as u64, "waiting before next candidate");
                    tokio::time::sleep(self.config.delay).await;
                }
                visited += 1;

                progress.candidate(strategy, index + 1, candidates.len(), &candidate.url);
                let outcome = self
                    .process_candidate(&mut state, index, candidate, question, strategy)
                    .await;
                log_outcome(candidate, strategy, &outcome);
                reports.push(CandidateReport {
                    index,
                    url: candidate.url.clone(),
                    strategy,
                    outcome,
                });

                if self.config.early_stop == EarlyStop::Immediate
                    && state.clears(self.config.threshold)
                {
                    threshold_met = true;
                    break 'passes;
                }
            }

            if state.clears(self.config.threshold) {
                threshold_met = true;
                break;
            }
        }

        // --- Commit ---
        let answer = match (&state.best, threshold_met, self.config.below_threshold) {
            (Some(best), true, _) | (Some(best), false, BelowThresholdPolicy::BestEffort) => {
                best.answer.clone()
            }
            _ => NO_RESULTS_FOUND.to_string(),
        };

        let resolution = Resolution {
            attempt_id,
            variant,
            question: question.to_string(),
            search_query,
            answer,
            confidence: state.best.as_ref().map(|_| state.best_confidence),
            strategy: state.best.as_ref().map(|b| b.strategy),
            source_url: state.best.as_ref().map(|b| b.url.clone()),
            threshold_met,
            candidate_count: candidates.len(),
            candidates: reports,
            started_at,
            elapsed: start.elapsed(),
        };

        progress.done(&resolution);
        info!(
            confidence = ?resolution.confidence,
            strategy = ?resolution.strategy,
            source = resolution.source_url.as_deref().unwrap_or("-"),
            threshold_met,
            elapsed_ms = resolution.elapsed.as_millis() as u64,
            "resolution complete"
        );

        Ok(resolution)
    }

    /// Fetch, evaluate, and apply the update rule for one candidate.
    async fn process_candidate(
        &self,
        state: &mut ResolutionState,
        index: usize,
        candidate: &Candidate,
        question: &str,
        strategy: Strategy,
    ) -> CandidateOutcome {
        let content = match self.fetcher.fetch(&candidate.url).await {
            Ok(content) => content,
            Err(error) => {
                return CandidateOutcome::Failed {
                    stage: FailureStage::Fetch,
                    error,
                };
            }
        };

        let evaluation = match self.evaluator.evaluate(&content, question, strategy).await {
            Ok(evaluation) => evaluation,
            Err(error) => {
                return CandidateOutcome::Failed {
                    stage: FailureStage::Evaluate,
                    error,
                };
            }
        };

        let confidence = evaluation.confidence;
        if !(0.0..=1.0).contains(&confidence) {
            return CandidateOutcome::Failed {
                stage: FailureStage::Evaluate,
                error: WebResolveError::evaluation_parse(format!(
                    "confidence must be in [0, 1], got {confidence}"
                )),
            };
        }

        let incoming = Best {
            index,
            answer: evaluation.answer,
            content,
            url: candidate.url.clone(),
            strategy,
        };

        if confidence == 0.0 {
            return CandidateOutcome::Discarded {
                confidence,
                reason: DiscardReason::Unanswerable,
            };
        }

        let incumbent = match &state.best {
            Some(incumbent)
                if confidence == state.best_confidence && incumbent.index == index =>
            {
                return CandidateOutcome::Discarded {
                    confidence,
                    reason: DiscardReason::SameSource,
                };
            }
            Some(incumbent) if confidence == state.best_confidence => incumbent,
            Some(_) if confidence < state.best_confidence => {
                return CandidateOutcome::Discarded {
                    confidence,
                    reason: DiscardReason::LowerConfidence,
                };
            }
            _ => {
                state.replace(confidence, incoming);
                return CandidateOutcome::Accepted {
                    confidence,
                    tie_break: false,
                };
            }
        };

        let verdict = self
            .comparator
            .compare(&incumbent.content, &incoming.content, question)
            .await;

        match verdict {
            Ok(Relevance::Second) => {
                state.replace(confidence, incoming);
                CandidateOutcome::Accepted {
                    confidence,
                    tie_break: true,
                }
            }
            Ok(Relevance::First) => CandidateOutcome::Discarded {
                confidence,
                reason: DiscardReason::LostTieBreak,
            },
            Err(error) => CandidateOutcome::Failed {
                stage: FailureStage::Compare,
                error,
            },
        }
    }
}

fn log_outcome(candidate: &Candidate, strategy: Strategy, outcome: &CandidateOutcome) {
    match outcome {
        CandidateOutcome::Accepted {
            confidence,
            tie_break,
        } => debug!(
            url = %candidate.url,
            %strategy,
            confidence,
            tie_break,
            "candidate accepted"
        ),
        CandidateOutcome::Discarded { confidence, reason } => debug!(
            url = %candidate.url,
            %strategy,
            confidence,
            ?reason,
            "candidate discarded"
        ),
        CandidateOutcome::Failed { stage, error } if outcome.is_unexpected_failure() => error!(
            url = %candidate.url,
            %strategy,
            ?stage,
            %error,
            "candidate skipped after unexpected error"
        ),
        CandidateOutcome::Failed { stage, error } => warn!(
            url = %candidate.url,
            %strategy,
            ?stage,
            %error,
            "candidate skipped"
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
