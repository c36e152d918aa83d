//! Anthropic-style text generation client.
//!
//! Uses the Messages API shape:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as a top-level field, selected by request mode
//! - Response text in `content[0].text`

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use chatforge_config::TextBackendConfig;
use chatforge_core::error::BackendError;
use chatforge_core::{TextBackend, TextMode, TextRequest};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// The minimum completion budget for a conversational answer. Classification
/// and verification calls can run tighter.
const ANSWER_MIN_TOKENS: u32 = 200;

/// Anthropic Messages API text backend.
pub struct AnthropicText {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl AnthropicText {
    /// Create a client from config. Fails when no API key is available.
    pub fn new(config: &TextBackendConfig) -> Result<Self, BackendError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| BackendError::AuthenticationFailed("No text API key configured".into()))?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BackendError::Network(e.to_string()))?;

        Ok(Self {
            name: "anthropic".into(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            client,
        })
    }

    /// The default system instruction for a mode, used when the request
    /// carries no override.
    fn default_system(mode: TextMode) -> &'static str {
        match mode {
            TextMode::Generic => "You are a helpful AI assistant.",
            TextMode::Answer => {
                "You are a chatbot that uses the conversation context to answer the \
                 following query in detail. If the query is about a specific event, \
                 provide the most accurate information available."
            }
            TextMode::Decide => {
                "Analyze the query and context to determine the most appropriate \
                 response type."
            }
        }
    }

    /// Effective token budget: answers get a floor so conversational replies
    /// are never truncated to classification-sized budgets.
    fn effective_max_tokens(request: &TextRequest) -> u32 {
        match request.mode {
            TextMode::Answer => request.max_tokens.max(ANSWER_MIN_TOKENS),
            _ => request.max_tokens,
        }
    }
}

#[async_trait]
impl TextBackend for AnthropicText {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: TextRequest) -> Result<String, BackendError> {
        let url = format!("{}/v1/messages", self.base_url);

        let system = request
            .system_override
            .clone()
            .unwrap_or_else(|| Self::default_system(request.mode).to_string());
        let max_tokens = Self::effective_max_tokens(&request);

        let body = serde_json::json!({
            "model": self.model,
            "system": system,
            "messages": [{ "role": "user", "content": request.prompt }],
            "max_tokens": max_tokens,
        });

        debug!(backend = %self.name, mode = ?request.mode, max_tokens, "Sending text request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout(e.to_string())
                } else {
                    BackendError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(BackendError::AuthenticationFailed(
                "Invalid text API key".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Text API error");
            return Err(BackendError::Api {
                status_code: status,
                message: error_body,
            });
        }

        let api_resp: MessagesResponse = response.json().await.map_err(|e| BackendError::Api {
            status_code: 200,
            message: format!("Failed to parse text response: {e}"),
        })?;

        let text = api_resp
            .content
            .first()
            .map(|block| block.text.trim().to_string())
            .unwrap_or_default();

        Ok(text)
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}
