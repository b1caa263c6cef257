//! Core domain types for evidence resolution.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Answer returned when no candidate produced a usable answer.
pub const NO_RESULTS_FOUND: &str = "no results found";

// ---------------------------------------------------------------------------
// AttemptId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one resolution attempt (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(pub Uuid);

impl AttemptId {
    /// Generate a new time-sortable attempt identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

/// One ranked source proposed by the search provider.
///
/// The order of a candidate list is the provider's retrieval rank;
/// `rank_score` is informational and never used to re-sort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub url: String,
    pub rank_score: f64,
}

impl Candidate {
    pub fn new(url: impl Into<String>, rank_score: f64) -> Self {
        Self {
            url: url.into(),
            rank_score,
        }
    }
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// Evaluation policy used by the semantic evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// The answer must be literally grounded in the content.
    Strict,
    /// The answer may be inferred from partial content.
    Loose,
}

impl Strategy {
    /// Strategies in the order the engine applies them.
    pub const ORDER: [Strategy; 2] = [Strategy::Strict, Strategy::Loose];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Loose => "loose",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// EvaluationResult
// ---------------------------------------------------------------------------

/// The semantic evaluator's judgment of one (content, question) pair.
///
/// `confidence == 0.0` means the content cannot answer the question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub confidence: f64,
    pub answer: String,
    pub reasoning: String,
}

impl EvaluationResult {
    /// Whether the evaluator declared the content unusable.
    pub fn is_unanswerable(&self) -> bool {
        self.confidence == 0.0
    }
}

// ---------------------------------------------------------------------------
// Relevance
// ---------------------------------------------------------------------------

/// Outcome of a pairwise relevance comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relevance {
    /// The first (incumbent) content is more relevant. Wire flag `0`.
    First,
    /// The second (challenger) content is more relevant. Wire flag `1`.
    Second,
}

impl Relevance {
    /// Map the comparator's binary flag; anything but 0 or 1 is rejected.
    pub fn from_flag(flag: i64) -> Option<Self> {
        match flag {
            0 => Some(Self::First),
            1 => Some(Self::Second),
            _ => None,
        }
    }

    pub fn flag(&self) -> u8 {
        match self {
            Self::First => 0,
            Self::Second => 1,
        }
    }
}

// ---------------------------------------------------------------------------
// SearchVariant
// ---------------------------------------------------------------------------

/// The two caller-facing ways of searching; both run the same engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchVariant {
    /// Task text searched verbatim, keeping any site restriction.
    #[default]
    Web,
    /// A short clarifying question in natural language.
    NaturalLanguage,
}

impl SearchVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::NaturalLanguage => "natural_language",
        }
    }
}
