//! HTTP client for the completion service.
//!
//! Talks to an OpenAI-compatible chat endpoint and extracts the JSON payload
//! the model was asked to produce. Transport failures are `Network` errors
//! (transient, retryable); a response whose content is not parseable JSON is
//! a `Generation` error (permanent).

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use siteforge_shared::{LlmConfig, Result, SiteForgeError};
use tracing::{debug, instrument};
use url::Url;

/// User-Agent string for completion requests.
const USER_AGENT: &str = concat!("SiteForge/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Client for the chat-completion endpoint.
pub struct CompletionClient {
    http: Client,
    base_url: Url,
    model: String,
    api_key: String,
}

impl CompletionClient {
    /// Build a client from explicit parameters.
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| SiteForgeError::config(format!("invalid completion base URL: {e}")))?;

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SiteForgeError::Network(format!("client build: {e}")))?;

        Ok(Self {
            http,
            base_url,
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    /// Build a client from the `[llm]` config section, reading the API key
    /// from the env var the config names.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            SiteForgeError::config(format!(
                "completion-service API key not found. Set the {} environment variable.",
                config.api_key_env
            ))
        })?;
        Self::new(&config.base_url, &config.model, api_key, config.timeout_secs)
    }

    /// Send one system+user exchange and parse the model's reply as JSON.
    #[instrument(skip_all, fields(model = %self.model))]
    pub async fn complete_json(&self, system: &str, user: &str) -> Result<Value> {
        let url = self
            .base_url
            .join("chat/completions")
            .map_err(|e| SiteForgeError::config(format!("invalid completion URL: {e}")))?;

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        let response = self
            .http
            .post(url.as_str())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SiteForgeError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SiteForgeError::Network(format!("{url}: HTTP {status}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| SiteForgeError::Generation(format!("malformed completion envelope: {e}")))?;

        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| SiteForgeError::Generation("completion returned no choices".into()))?;

        debug!(content_len = content.len(), "completion received");
        extract_json(content)
    }
}

/// Extract a JSON value from model output, tolerating Markdown code fences.
pub fn extract_json(content: &str) -> Result<Value> {
    let trimmed = content.trim();

    let body = if let Some(rest) = trimmed.strip_prefix("```") {
        // Drop the fence language tag line and the closing fence
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        rest.trim_start_matches(['\r', '\n'])
            .trim_end_matches('`')
            .trim()
    } else {
        trimmed
    };

    serde_json::from_str(body)
        .map_err(|e| SiteForgeError::Generation(format!("completion is not valid JSON: {e}")))
}
