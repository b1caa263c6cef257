//! Tavily search adapter.
//!
//! Sends the optimized query to the Tavily search API and turns the ranked
//! results into [`Candidate`]s, preserving the provider's order. Any failure
//! (transport, HTTP status, payload) is a [`WebResolveError::Retrieval`],
//! which is fatal to the resolution attempt.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use webresolve_shared::{Candidate, Result, SearchConfig, SearchProvider, WebResolveError, read_api_key};

/// User-Agent string for search requests.
const USER_AGENT: &str = concat!("WebResolve/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Request body for `POST /search`.
#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    max_results: usize,
    topic: &'a str,
}

/// Response body of `POST /search`; fields we do not use are ignored.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    score: Option<f64>,
}

// ---------------------------------------------------------------------------
// TavilySearch
// ---------------------------------------------------------------------------

/// [`SearchProvider`] backed by the Tavily search API.
pub struct TavilySearch {
    client: Client,
    base_url: String,
    api_key: String,
    max_results: usize,
    topic: String,
}

impl TavilySearch {
    /// Build a client, reading the API key from `config.api_key_env`.
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        let api_key = read_api_key(&config.api_key_env)?;
        Self::with_key(config, api_key)
    }

    /// Build a client with an explicitly provided API key.
    pub fn with_key(config: &SearchConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WebResolveError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            max_results: config.max_results,
            topic: config.topic.clone(),
        })
    }
}

#[async_trait]
impl SearchProvider for TavilySearch {
    #[instrument(skip(self), fields(max_results = self.max_results))]
    async fn search(&self, query: &str) -> Result<Vec<Candidate>> {
        let url = format!("{}/search", self.base_url);
        let request = SearchRequest {
            query,
            max_results: self.max_results,
            topic: &self.topic,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| WebResolveError::Retrieval(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(WebResolveError::Retrieval(format!("{url}: HTTP {status}: {snippet}")));
        }

        let payload: SearchResponse = response
            .json()
            .await
            .map_err(|e| WebResolveError::Retrieval(format!("invalid search response: {e}")))?;

        let candidates = to_candidates(payload, self.max_results);

        debug!(urls = ?candidates.iter().map(|c| c.url.as_str()).collect::<Vec<_>>(), "search results");
        info!(count = candidates.len(), "search complete");

        Ok(candidates)
    }
}

/// Keep hits that carry a URL, in provider order, capped at `limit`.
fn to_candidates(payload: SearchResponse, limit: usize) -> Vec<Candidate> {
    payload
        .results
        .into_iter()
        .filter_map(|hit| {
            let url = hit.url.filter(|u| !u.trim().is_empty())?;
            Some(Candidate::new(url, hit.score.unwrap_or(0.0)))
        })
        .take(limit)
        .collect()
}
