//! Image generation client (FLUX-style submit + poll).
//!
//! `submit` issues exactly one generation request and returns a job whose
//! handle is the backend's polling URL. Completion is retrieved separately
//! through the polling protocol in [`crate::poll`].

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, warn};

use chatforge_config::ImageBackendConfig;
use chatforge_core::error::BackendError;
use chatforge_core::{ImageBackend, ImageJob, PollStatus};

/// FLUX-style image generation backend.
pub struct FluxImage {
    name: String,
    generation_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl FluxImage {
    /// Create a client from config. Fails when no API key is available.
    pub fn new(config: &ImageBackendConfig) -> Result<Self, BackendError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            BackendError::AuthenticationFailed("No image API key configured".into())
        })?;

        Ok(Self {
            name: "flux".into(),
            generation_url: config.generation_url.clone(),
            api_key,
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl ImageBackend for FluxImage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(
        &self,
        prompt: &str,
        width: u32,
        height: u32,
    ) -> Result<ImageJob, BackendError> {
        let body = serde_json::json!({
            "prompt": prompt,
            "width": width,
            "height": height,
            "prompt_upsampling": false,
            "seed": 42,
            "safety_tolerance": 2,
            "output_format": "jpeg",
        });

        debug!(backend = %self.name, width, height, "Submitting image generation job");

        let response = self
            .client
            .post(&self.generation_url)
            .header("X-Key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Image submission failed");
            return Err(BackendError::Api {
                status_code: status,
                message: error_body,
            });
        }

        let api_resp: SubmitResponse = response.json().await.map_err(|e| BackendError::Api {
            status_code: 200,
            message: format!("Failed to parse submission response: {e}"),
        })?;

        match api_resp.polling_url {
            Some(url) if !url.is_empty() => Ok(ImageJob {
                polling_handle: url,
                created_at: Utc::now(),
            }),
            _ => Err(BackendError::Api {
                status_code: 200,
                message: "Submission response carried no polling URL".into(),
            }),
        }
    }

    async fn check(&self, job: &ImageJob) -> Result<PollStatus, BackendError> {
        let response = self
            .client
            .get(&job.polling_handle)
            .header("X-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(BackendError::Api {
                status_code: status,
                message: "Polling endpoint returned an error".into(),
            });
        }

        let api_resp: PollResponse = response.json().await.map_err(|e| BackendError::Api {
            status_code: 200,
            message: format!("Failed to parse poll response: {e}"),
        })?;

        match api_resp.result.and_then(|r| r.sample) {
            Some(url) if !url.is_empty() => Ok(PollStatus::Ready(url)),
            _ => Ok(PollStatus::Pending),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    polling_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PollResponse {
    #[serde(default)]
    result: Option<PollResult>,
}

#[derive(Debug, Deserialize)]
struct PollResult {
    #[serde(default)]
    sample: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_requires_api_key() {
        let config = ImageBackendConfig {
            api_key: Some("flux-test".into()),
            ..ImageBackendConfig::default()
        };
        let backend = FluxImage::new(&config).unwrap();
        assert_eq!(backend.name(), "flux");

        assert!(FluxImage::new(&ImageBackendConfig::default()).is_err());
    }

    #[test]
    fn parse_submission_with_polling_url() {
        let resp: SubmitResponse = serde_json::from_str(
            r#"{"id": "job-1", "polling_url": "https://api.example/poll/job-1"}"#,
        )
        .unwrap();
        assert_eq!(
            resp.polling_url.as_deref(),
            Some("https://api.example/poll/job-1")
        );
    }

    #[test]
    fn parse_submission_without_polling_url() {
        let resp: SubmitResponse = serde_json::from_str(r#"{"id": "job-2"}"#).unwrap();
        assert!(resp.polling_url.is_none());
    }

    #[test]
    fn parse_ready_poll_response() {
        let resp: PollResponse = serde_json::from_str(
            r#"{"status": "Ready", "result": {"sample": "https://img.example/out.jpg"}}"#,
        )
        .unwrap();
        assert_eq!(
            resp.result.and_then(|r| r.sample).as_deref(),
            Some("https://img.example/out.jpg")
        );
    }

    #[test]
    fn parse_pending_poll_response() {
        let resp: PollResponse =
            serde_json::from_str(r#"{"status": "Pending"}"#).unwrap();
        assert!(resp.result.is_none());
    }
}
