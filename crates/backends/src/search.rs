//! Streaming search/answer client.
//!
//! Talks to an OpenAI-compatible `chat/completions` endpoint with
//! `stream: true` and collapses the SSE fragment stream into one answer
//! string. The stream is finite and not restartable: fragments are consumed
//! until `[DONE]` or end-of-stream, unparseable chunks are skipped.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, trace, warn};

use chatforge_config::SearchBackendConfig;
use chatforge_core::error::BackendError;
use chatforge_core::SearchBackend;

/// Streaming search backend (Exa-style answer API).
pub struct ExaSearch {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl ExaSearch {
    /// Create a client from config. Fails when no API key is available.
    pub fn new(config: &SearchBackendConfig) -> Result<Self, BackendError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            BackendError::AuthenticationFailed("No search API key configured".into())
        })?;

        Ok(Self {
            name: "exa".into(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            client: reqwest::Client::new(),
        })
    }

    /// Extract the content fragment from one SSE line, if it carries one.
    ///
    /// Returns `None` for blank lines, comments, `[DONE]`, and chunks whose
    /// JSON does not contain `choices[0].delta.content`.
    fn parse_sse_line(line: &str) -> Option<String> {
        let line = line.trim();
        let data = line.strip_prefix("data:")?.trim();
        if data.is_empty() || data == "[DONE]" {
            return None;
        }

        let chunk: StreamChunk = match serde_json::from_str(data) {
            Ok(c) => c,
            Err(e) => {
                trace!(error = %e, "Ignoring unparseable search SSE chunk");
                return None;
            }
        };

        chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|s| !s.is_empty())
    }
}

#[async_trait]
impl SearchBackend for ExaSearch {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &str) -> Result<String, BackendError> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": query }],
            "stream": true,
            "extra_body": { "text": true },
        });

        debug!(backend = %self.name, "Sending search request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(BackendError::AuthenticationFailed(
                "Invalid search API key".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Search API error");
            return Err(BackendError::Api {
                status_code: status,
                message: error_body,
            });
        }

        let mut byte_stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut answer = String::new();

        while let Some(chunk_result) = byte_stream.next().await {
            let bytes = chunk_result
                .map_err(|e| BackendError::StreamInterrupted(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(line_end) = buffer.find('\n') {
                let line = buffer[..line_end].trim_end_matches('\r').to_string();
                buffer = buffer[line_end + 1..].to_string();

                if let Some(fragment) = Self::parse_sse_line(&line) {
                    answer.push_str(&fragment);
                }
            }
        }

        // Whatever is left in the buffer may be a final unterminated line.
        if let Some(fragment) = Self::parse_sse_line(&buffer) {
            answer.push_str(&fragment);
        }

        Ok(answer.trim().to_string())
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}
