//! Application configuration for WebResolve.
//!
//! User config lives at `~/.webresolve/webresolve.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WebResolveError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "webresolve.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".webresolve";

// ---------------------------------------------------------------------------
// Config structs (matching webresolve.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Resolution engine policy.
    #[serde(default)]
    pub resolution: ResolutionSettings,

    /// OpenRouter settings.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Search provider settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Page fetcher settings.
    #[serde(default)]
    pub fetch: FetchConfig,
}

/// What to answer when both strategies finish below the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BelowThresholdPolicy {
    /// Return the best accepted answer, however weak.
    #[default]
    BestEffort,
    /// Return the "no results found" sentinel.
    Sentinel,
}

/// When the threshold check runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EarlyStop {
    /// Check once at the end of each strategy pass.
    #[default]
    AfterPass,
    /// Stop as soon as the running best clears the threshold.
    Immediate,
}

/// `[resolution]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionSettings {
    /// Confidence above which an answer is committed.
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Delay between consecutive candidates, in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Maximum number of candidates taken from the search results.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    /// Policy for best answers that never cleared the threshold.
    #[serde(default)]
    pub below_threshold: BelowThresholdPolicy,

    /// Threshold check granularity.
    #[serde(default)]
    pub early_stop: EarlyStop,

    /// Search with the raw question when query optimization fails.
    #[serde(default)]
    pub fallback_to_question: bool,

    /// Page content is truncated to this many characters before prompting.
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
}

impl Default for ResolutionSettings {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            delay_ms: default_delay_ms(),
            max_candidates: default_max_candidates(),
            below_threshold: BelowThresholdPolicy::default(),
            early_stop: EarlyStop::default(),
            fallback_to_question: false,
            max_content_chars: default_max_content_chars(),
        }
    }
}

fn default_threshold() -> f64 {
    0.33
}
fn default_delay_ms() -> u64 {
    20_000
}
fn default_max_candidates() -> usize {
    5
}
fn default_max_content_chars() -> usize {
    60_000
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_openrouter_base_url")]
    pub base_url: String,

    /// Model used for every role without an explicit override.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Model for query optimization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_model: Option<String>,

    /// Model for strict content analysis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict_model: Option<String>,

    /// Model for loose content analysis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loose_model: Option<String>,

    /// Model for relevance comparison.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_model: Option<String>,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Nucleus sampling cutoff.
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Retries on rate limiting or server errors.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-request timeout in seconds.
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_openrouter_base_url(),
            default_model: default_model(),
            query_model: None,
            strict_model: None,
            loose_model: None,
            relevance_model: None,
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_retries: default_max_retries(),
            timeout_secs: default_model_timeout(),
        }
    }
}

impl OpenRouterConfig {
    /// Resolve the model for a role, falling back to `default_model`.
    pub fn model_for(&self, role: ModelRole) -> &str {
        let overridden = match role {
            ModelRole::QueryOptimization => self.query_model.as_deref(),
            ModelRole::StrictAnalysis => self.strict_model.as_deref(),
            ModelRole::LooseAnalysis => self.loose_model.as_deref(),
            ModelRole::Relevance => self.relevance_model.as_deref(),
        };
        overridden.unwrap_or(&self.default_model)
    }
}

/// The distinct jobs a language model performs in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelRole {
    QueryOptimization,
    StrictAnalysis,
    LooseAnalysis,
    Relevance,
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_openrouter_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "google/gemini-2.0-flash-001".into()
}
fn default_temperature() -> f32 {
    0.25
}
fn default_top_p() -> f32 {
    0.95
}
fn default_max_retries() -> u32 {
    2
}
fn default_model_timeout() -> u64 {
    120
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Name of the env var holding the Tavily API key.
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,

    /// Tavily API base URL.
    #[serde(default = "default_search_base_url")]
    pub base_url: String,

    /// Number of results requested from the provider.
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Tavily search topic.
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Request timeout in seconds.
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_search_key_env(),
            base_url: default_search_base_url(),
            max_results: default_max_results(),
            topic: default_topic(),
            timeout_secs: default_search_timeout(),
        }
    }
}

fn default_search_key_env() -> String {
    "TAVILY_API_KEY".into()
}
fn default_search_base_url() -> String {
    "https://api.tavily.com".into()
}
fn default_max_results() -> usize {
    5
}
fn default_topic() -> String {
    "general".into()
}
fn default_search_timeout() -> u64 {
    20
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// Maximum redirects followed per page.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// User-Agent header sent with page requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Bodies larger than this are rejected.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: u64,

    /// Allow fetching loopback/private addresses.
    #[serde(default)]
    pub allow_private_hosts: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
            max_response_bytes: default_max_response_bytes(),
            allow_private_hosts: false,
        }
    }
}

fn default_fetch_timeout() -> u64 {
    30
}
fn default_max_redirects() -> usize {
    5
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0".into()
}
fn default_max_response_bytes() -> u64 {
    10 * 1024 * 1024
}

// ---------------------------------------------------------------------------
// Resolution config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime engine configuration, merged from the config file and CLI flags.
#[derive(Debug, Clone)]
pub struct ResolutionConfig {
    /// Early-stop threshold; an answer must be strictly above it.
    pub threshold: f64,
    /// Mandatory wait between consecutive candidates.
    pub delay: Duration,
    /// Candidate cap applied to the search results.
    pub max_candidates: usize,
    /// What to return when no pass cleared the threshold.
    pub below_threshold: BelowThresholdPolicy,
    /// Threshold check granularity.
    pub early_stop: EarlyStop,
    /// Search with the raw question when optimization fails.
    pub fallback_to_question: bool,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ResolutionConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            threshold: config.resolution.threshold,
            delay: Duration::from_millis(config.resolution.delay_ms),
            max_candidates: config.resolution.max_candidates,
            below_threshold: config.resolution.below_threshold,
            early_stop: config.resolution.early_stop,
            fallback_to_question: config.resolution.fallback_to_question,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.webresolve/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| WebResolveError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.webresolve/webresolve.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| WebResolveError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        WebResolveError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let path = config_file_path()?;
    init_config_at(&path)?;
    Ok(path)
}

/// Write a default config file at `path`, creating parent directories.
pub fn init_config_at(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| WebResolveError::io(dir, e))?;
    }

    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| WebResolveError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| WebResolveError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(())
}

/// Reject values the engine cannot run with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let threshold = config.resolution.threshold;
    if !(0.0..1.0).contains(&threshold) {
        return Err(WebResolveError::config(format!(
            "resolution.threshold must be in [0, 1), got {threshold}"
        )));
    }
    if config.resolution.max_candidates == 0 {
        return Err(WebResolveError::config(
            "resolution.max_candidates must be at least 1",
        ));
    }
    if config.search.max_results == 0 {
        return Err(WebResolveError::config("search.max_results must be at least 1"));
    }
    Ok(())
}

/// Check that the OpenRouter and Tavily API key env vars are set and non-empty.
pub fn validate_api_keys(config: &AppConfig) -> Result<()> {
    require_env(
        &config.openrouter.api_key_env,
        "OpenRouter",
        "https://openrouter.ai/keys",
    )?;
    require_env(&config.search.api_key_env, "Tavily", "https://app.tavily.com")?;
    Ok(())
}

/// Read a required API key from the environment.
pub fn read_api_key(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(WebResolveError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}

fn require_env(var_name: &str, provider: &str, signup_url: &str) -> Result<()> {
    read_api_key(var_name).map(|_| ()).map_err(|_| {
        WebResolveError::config(format!(
            "{provider} API key not found. Set the {var_name} environment variable.\n\
             Get a key at {signup_url}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("threshold"));
        assert!(toml_str.contains("OPENROUTER_API_KEY"));
        assert!(toml_str.contains("TAVILY_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.resolution.max_candidates, 5);
        assert_eq!(parsed.resolution.below_threshold, BelowThresholdPolicy::BestEffort);
        assert_eq!(parsed.openrouter.api_key_env, "OPENROUTER_API_KEY");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[resolution]
delay_ms = 0
below_threshold = "sentinel"
early_stop = "immediate"

[openrouter]
strict_model = "openai/gpt-4o"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.resolution.delay_ms, 0);
        assert_eq!(config.resolution.threshold, 0.33);
        assert_eq!(config.resolution.below_threshold, BelowThresholdPolicy::Sentinel);
        assert_eq!(config.resolution.early_stop, EarlyStop::Immediate);
        assert_eq!(config.search.max_results, 5);
        assert_eq!(
            config.openrouter.model_for(ModelRole::StrictAnalysis),
            "openai/gpt-4o"
        );
        assert_eq!(
            config.openrouter.model_for(ModelRole::Relevance),
            "google/gemini-2.0-flash-001"
        );
    }

    #[test]
    fn resolution_config_from_app_config() {
        let app = AppConfig::default();
        let resolution = ResolutionConfig::from(&app);
        assert_eq!(resolution.threshold, 0.33);
        assert_eq!(resolution.delay, Duration::from_secs(20));
        assert_eq!(resolution.max_candidates, 5);
        assert_eq!(resolution.early_stop, EarlyStop::AfterPass);
        assert!(!resolution.fallback_to_question);
    }

    #[test]
    fn validate_rejects_out_of_range_threshold() {
        let mut config = AppConfig::default();
        config.resolution.threshold = 1.5;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("resolution.threshold"));

        config.resolution.threshold = 0.33;
        config.resolution.max_candidates = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn load_config_from_file() {
        let dir = std::env::temp_dir().join(format!("wr-config-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("webresolve.toml");
        std::fs::write(&path, "[search]\nmax_results = 8\n").unwrap();

        let config = load_config_from(&path).expect("load");
        assert_eq!(config.search.max_results, 8);

        std::fs::write(&path, "[resolution]\nthreshold = \"high\"\n").unwrap();
        assert!(load_config_from(&path).is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn init_config_at_writes_loadable_defaults() {
        let dir = std::env::temp_dir().join(format!("wr-init-test-{}", uuid::Uuid::now_v7()));
        let path = dir.join("nested").join("custom.toml");

        init_config_at(&path).expect("init");
        let config = load_config_from(&path).expect("load");
        assert_eq!(config.resolution.max_candidates, 5);
        assert_eq!(config.search.topic, "general");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.openrouter.api_key_env = "WR_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_keys(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("OpenRouter API key not found"));
    }
}
