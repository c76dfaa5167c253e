//! Inference gateway: one request against a generative model, in free-text or
//! structured JSON mode.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use leadgate_core::config::LlmConfig;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Which pipeline stage issued a completion request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageKind {
    Profiler,
    Strategist,
    Voice,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Profiler => "profiler",
            Self::Strategist => "strategist",
            Self::Voice => "voice",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub stage: StageKind,
    pub messages: Vec<ChatMessage>,
    /// Constrains the model to emit a single JSON object.
    pub structured: bool,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("inference gateway is not configured")]
    NotConfigured,
    #[error("inference call timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("provider rate limit reached")]
    RateLimited,
    #[error("provider rejected credentials: {0}")]
    AuthFailed(String),
    #[error("malformed model output: {0}")]
    MalformedOutput(String),
    #[error("model returned an empty completion")]
    EmptyOutput,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    fn name(&self) -> &str;

    /// `false` when calls can only short-circuit (stub mode).
    fn is_live(&self) -> bool {
        true
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError>;
}

/// Stub-mode client used when no credentials are configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnconfiguredClient;

#[async_trait]
impl LlmClient for UnconfiguredClient {
    fn name(&self) -> &str {
        "unconfigured"
    }

    fn is_live(&self) -> bool {
        false
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<String, GatewayError> {
        Err(GatewayError::NotConfigured)
    }
}

/// Client for any provider that speaks the OpenAI chat-completions format
/// (Groq, OpenAI, Ollama).
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    provider: String,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
}

impl OpenAiCompatClient {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            provider: config.provider.as_str().to_string(),
            base_url: config.resolved_base_url(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.provider
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        let body = CompletionBody {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request.structured.then_some(ResponseFormat { kind: "json_object" }),
        };

        debug!(
            provider = %self.provider,
            model = %self.model,
            stage = %request.stage,
            messages = request.messages.len(),
            structured = request.structured,
            "sending chat completion request"
        );

        let mut call = self.http.post(self.completions_url()).json(&body);
        if let Some(api_key) = &self.api_key {
            call = call.bearer_auth(api_key.expose_secret());
        }

        let response = call.send().await.map_err(|e| GatewayError::Transport(e.to_string()))?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                429 => {
                    warn!(provider = %self.provider, stage = %request.stage, "rate limited");
                    GatewayError::RateLimited
                }
                401 | 403 => GatewayError::AuthFailed(body),
                code => GatewayError::HttpStatus { status: code, body },
            });
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedOutput(format!("failed to parse response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(GatewayError::EmptyOutput)
    }
}

/// Applies the per-call timeout and output checks on top of an [`LlmClient`].
#[derive(Clone)]
pub struct Gateway {
    client: Arc<dyn LlmClient>,
    timeout: Duration,
    temperature: f32,
    max_tokens: u32,
}

impl Gateway {
    pub fn new(client: Arc<dyn LlmClient>, config: &LlmConfig) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(config.timeout_secs),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_live(&self) -> bool {
        self.client.is_live()
    }

    /// Free-text completion. Blank output counts as a failure.
    pub async fn text(
        &self,
        stage: StageKind,
        messages: Vec<ChatMessage>,
    ) -> Result<String, GatewayError> {
        let request = CompletionRequest {
            stage,
            messages,
            structured: false,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let raw = self.call(&request).await?;
        let text = raw.trim();
        if text.is_empty() {
            return Err(GatewayError::EmptyOutput);
        }
        Ok(text.to_string())
    }

    /// Structured completion decoded into `T`. Runs at temperature zero.
    pub async fn structured<T: DeserializeOwned>(
        &self,
        stage: StageKind,
        messages: Vec<ChatMessage>,
    ) -> Result<T, GatewayError> {
        let request = CompletionRequest {
            stage,
            messages,
            structured: true,
            temperature: 0.0,
            max_tokens: self.max_tokens,
        };
        let raw = self.call(&request).await?;
        decode_structured(&raw)
    }

    async fn call(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        let result = match tokio::time::timeout(self.timeout, self.client.complete(request)).await
        {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout { secs: self.timeout.as_secs() }),
        };
        if let Err(error) = &result {
            debug!(
                event_name = "gateway.call.failed",
                client = self.client.name(),
                stage = %request.stage,
                error = %error,
                "completion failed"
            );
        }
        result
    }
}

/// Decodes a JSON object out of model output, tolerating Markdown code fences
/// and prose around the object.
pub fn decode_structured<T: DeserializeOwned>(raw: &str) -> Result<T, GatewayError> {
    let trimmed = strip_code_fence(raw.trim());
    if trimmed.is_empty() {
        return Err(GatewayError::EmptyOutput);
    }

    match serde_json::from_str::<T>(trimmed) {
        Ok(value) => Ok(value),
        Err(first_error) => {
            let object = match (trimmed.find('{'), trimmed.rfind('}')) {
                (Some(start), Some(end)) if start < end => &trimmed[start..=end],
                _ => return Err(GatewayError::MalformedOutput(first_error.to_string())),
            };
            serde_json::from_str::<T>(object)
                .map_err(|e| GatewayError::MalformedOutput(e.to_string()))
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
