//! Wiring of the production adapters into a ready-to-use resolver.
//!
//! [`WebResolver`] exposes the two caller-facing entry points,
//! [`WebResolver::search_web`] and [`WebResolver::search_web_natural_language`].
//! Both run the same engine; the variant only tags the attempt.

use std::sync::Arc;

use tracing::{info, instrument};

use webresolve_fetcher::HttpPageFetcher;
use webresolve_llm::OpenRouterClient;
use webresolve_search::TavilySearch;
use webresolve_shared::{
    AppConfig, ChatModel, ModelRole, ResolutionConfig, Result, SearchVariant, validate_api_keys,
};

use crate::engine::{Resolution, ResolutionEngine, ResolveProgress, SilentProgress};
use crate::evaluation::{LlmEvaluator, LlmRelevanceComparator};
use crate::optimizer::QueryOptimizer;

/// A resolution engine backed by Tavily, HTTP fetching and OpenRouter.
pub struct WebResolver {
    engine: ResolutionEngine,
}

impl WebResolver {
    /// Build from config using the default runtime resolution settings it implies.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::with_resolution(config, ResolutionConfig::from(config))
    }

    /// Build from config with an explicit (e.g. CLI-overridden) [`ResolutionConfig`].
    ///
    /// API keys are checked before any client is constructed.
    #[instrument(skip_all)]
    pub fn with_resolution(config: &AppConfig, resolution: ResolutionConfig) -> Result<Self> {
        validate_api_keys(config)?;

        let model = |role| -> Result<Arc<dyn ChatModel>> {
            Ok(Arc::new(OpenRouterClient::for_role(&config.openrouter, role)?))
        };
        let max_chars = config.resolution.max_content_chars;

        let engine = ResolutionEngine::new(
            QueryOptimizer::new(model(ModelRole::QueryOptimization)?),
            Arc::new(TavilySearch::from_config(&config.search)?),
            Arc::new(HttpPageFetcher::new(&config.fetch)?),
            Arc::new(LlmEvaluator::new(
                model(ModelRole::StrictAnalysis)?,
                model(ModelRole::LooseAnalysis)?,
                max_chars,
            )),
            Arc::new(LlmRelevanceComparator::new(model(ModelRole::Relevance)?, max_chars)),
            resolution,
        );

        info!(
            default_model = %config.openrouter.default_model,
            max_results = config.search.max_results,
            "resolver ready"
        );

        Ok(Self::from_engine(engine))
    }

    /// Wrap an already assembled engine.
    pub fn from_engine(engine: ResolutionEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &ResolutionEngine {
        &self.engine
    }

    /// Search the web with the task text as given, keeping any `site:` restriction.
    pub async fn search_web(&self, query: &str) -> Result<String> {
        self.answer(query, SearchVariant::Web).await
    }

    /// Search the web with a short natural-language question.
    pub async fn search_web_natural_language(&self, query: &str) -> Result<String> {
        self.answer(query, SearchVariant::NaturalLanguage).await
    }

    /// Run one attempt and return the full report.
    pub async fn resolve(
        &self,
        query: &str,
        variant: SearchVariant,
        progress: &dyn ResolveProgress,
    ) -> Result<Resolution> {
        self.engine.resolve_report(query, variant, progress).await
    }

    async fn answer(&self, query: &str, variant: SearchVariant) -> Result<String> {
        self.resolve(query, variant, &SilentProgress)
            .await
            .map(|resolution| resolution.answer)
    }
}
