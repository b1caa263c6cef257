//! OpenRouter chat-completions client.
//!
//! Every model call in WebResolve is a single user message sent to an
//! OpenAI-compatible `/chat/completions` endpoint. Rate limiting and server
//! errors are retried with exponential backoff; other failures surface as
//! [`WebResolveError::Model`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use webresolve_shared::{
    ChatModel, ModelRole, OpenRouterConfig, Result, WebResolveError, read_api_key,
};

/// User-Agent string for model requests.
const USER_AGENT: &str = concat!("WebResolve/", env!("CARGO_PKG_VERSION"));

/// Upper bound for a single backoff wait.
const MAX_BACKOFF: Duration = Duration::from_secs(32);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// Failure classification
// ---------------------------------------------------------------------------

/// A failed request, split by whether another try may succeed.
#[derive(Debug)]
enum Failure {
    Transient(String),
    Permanent(String),
    /// A 2xx response whose body is not a chat completion.
    Malformed(String),
}

impl Failure {
    fn into_error(self) -> WebResolveError {
        match self {
            Self::Transient(msg) | Self::Permanent(msg) => WebResolveError::Model(msg),
            Self::Malformed(msg) => WebResolveError::parse(msg),
        }
    }
}

/// Map an unsuccessful status to a [`Failure`].
fn classify_status(status: StatusCode, body: &str) -> Failure {
    let snippet: String = body.chars().take(300).collect();
    match status.as_u16() {
        401 | 403 => Failure::Permanent(format!("authentication failed (HTTP {status})")),
        429 => Failure::Transient(format!("rate limited (HTTP 429): {snippet}")),
        s if s >= 500 => Failure::Transient(format!("server error (HTTP {status}): {snippet}")),
        _ => Failure::Permanent(format!("HTTP {status}: {snippet}")),
    }
}

/// Backoff before retry number `attempt` (0-based): base, 2×base, 4×base, …
fn backoff_for(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.min(16)).min(MAX_BACKOFF)
}

// ---------------------------------------------------------------------------
// OpenRouterClient
// ---------------------------------------------------------------------------

/// [`ChatModel`] bound to one OpenRouter model.
pub struct OpenRouterClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    top_p: f32,
    max_retries: u32,
    backoff_base: Duration,
}

impl OpenRouterClient {
    /// Build a client for `role`, reading the API key from `config.api_key_env`.
    pub fn for_role(config: &OpenRouterConfig, role: ModelRole) -> Result<Self> {
        let api_key = read_api_key(&config.api_key_env)?;
        Self::with_key(config, config.model_for(role), api_key)
    }

    /// Build a client for an explicit model and API key.
    pub fn with_key(config: &OpenRouterConfig, model: &str, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WebResolveError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: model.to_string(),
            temperature: config.temperature,
            top_p: config.top_p,
            max_retries: config.max_retries,
            backoff_base: Duration::from_secs(1),
        })
    }

    /// Override the first retry delay (doubles on each further retry).
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    async fn send_once(&self, prompt: &str) -> std::result::Result<String, Failure> {
        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            top_p: self.top_p,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    Failure::Transient(format!("request failed: {e}"))
                } else {
                    Failure::Permanent(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|e| Failure::Malformed(format!("invalid completion payload: {e}")))?;

        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Failure::Permanent("completion contained no message content".into()))
    }
}

#[async_trait]
impl ChatModel for OpenRouterClient {
    #[instrument(skip_all, fields(model = %self.model, prompt_len = prompt.len()))]
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.send_once(prompt).await {
                Ok(text) => {
                    debug!(completion_len = text.len(), "completion received");
                    return Ok(text);
                }
                Err(Failure::Transient(msg)) if attempt < self.max_retries => {
                    let wait = backoff_for(self.backoff_base, attempt);
                    attempt += 1;
                    info!(
                        attempt,
                        max_retries = self.max_retries,
                        backoff_ms = wait.as_millis() as u64,
                        error = %msg,
                        "retrying after transient model error"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(failure) => {
                    warn!(error = ?failure, "model call failed");
                    return Err(failure.into_error());
                }
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str, max_retries: u32) -> OpenRouterClient {
        let config = OpenRouterConfig {
            base_url: base_url.to_string(),
            max_retries,
            timeout_secs: 5,
            ..OpenRouterConfig::default()
        };
        OpenRouterClient::with_key(&config, "test/model", "sk-test".into())
            .unwrap()
            .with_backoff_base(Duration::from_millis(5))
    }

    fn completion(text: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "gen-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": text}}]
        })
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_for(base, 0), Duration::from_secs(1));
        assert_eq!(backoff_for(base, 2), Duration::from_secs(4));
        assert_eq!(backoff_for(base, 10), MAX_BACKOFF);
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            Failure::Transient(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, ""),
            Failure::Transient(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, ""),
            Failure::Permanent(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "bad model"),
            Failure::Permanent(_)
        ));
    }

    #[tokio::test]
    async fn sends_single_user_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "test/model",
                "messages": [{"role": "user", "content": "What is 2+2?"}],
                "temperature": 0.25
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("4")))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), 2);
        assert_eq!(client.model_name(), "test/model");
        assert_eq!(client.complete("What is 2+2?").await.unwrap(), "4");
    }

    #[tokio::test]
    async fn retries_rate_limit_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), 2);
        assert_eq!(client.complete("ping").await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), 2);
        let err = client.complete("ping").await.unwrap_err();
        assert!(matches!(err, WebResolveError::Model(_)));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn auth_failure_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), 2);
        let err = client.complete("ping").await.unwrap_err();
        assert!(err.to_string().contains("authentication failed"));
    }

    #[tokio::test]
    async fn empty_choices_is_model_error() {
        let server = MockServer::start().await;
        Mock::given(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), 0);
        let err = client.complete("ping").await.unwrap_err();
        assert!(matches!(err, WebResolveError::Model(_)));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn malformed_envelope_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), 2);
        let err = client.complete("ping").await.unwrap_err();
        assert!(matches!(err, WebResolveError::Parse { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn role_models_come_from_config() {
        let config = OpenRouterConfig {
            relevance_model: Some("openai/gpt-4o-mini".into()),
            ..OpenRouterConfig::default()
        };
        let client =
            OpenRouterClient::with_key(&config, config.model_for(ModelRole::Relevance), "k".into())
                .unwrap();
        assert_eq!(client.model_name(), "openai/gpt-4o-mini");
    }
}
