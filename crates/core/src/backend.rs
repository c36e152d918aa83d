//! Capability traits — the abstractions over the generative/information
//! backends the orchestrator drives.
//!
//! Three independent upstream capabilities:
//! - `TextBackend`: text completion with a mode-selected system instruction
//! - `SearchBackend`: streamed search/answer, aggregated into one string
//! - `ImageBackend`: asynchronous image generation (submit a job, check it)
//!
//! The orchestrator calls these without knowing which vendor is behind them —
//! pure polymorphism, and the seam where tests inject scripted mocks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// Which default system instruction a text request gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextMode {
    /// General-purpose assistant instruction.
    Generic,
    /// Conversational answer to the user, grounded in history.
    Answer,
    /// Classification: analyze the query and pick a response strategy.
    Decide,
}

/// A single text-generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextRequest {
    /// The user-visible prompt body.
    pub prompt: String,

    /// Which default system instruction to apply.
    pub mode: TextMode,

    /// Overrides the mode's default system instruction when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_override: Option<String>,

    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

impl TextRequest {
    pub fn new(prompt: impl Into<String>, mode: TextMode, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            mode,
            system_override: None,
            max_tokens,
        }
    }

    /// Attach a custom system instruction.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_override = Some(system.into());
        self
    }
}

/// What a prompt-improvement call is rewriting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImprovePurpose {
    /// Enhance into a vivid, detailed image-generation prompt.
    Image,
    /// Rewrite a search query to ask for the most current information.
    Search,
}

impl ImprovePurpose {
    fn system_instruction(&self) -> &'static str {
        match self {
            Self::Image => {
                "Enhance the given text into a highly detailed, vivid, and structured \
                 image generation prompt that emphasizes near-realism. Do not return \
                 any unrelated text."
            }
            Self::Search => {
                "Rewrite the following search query so that it clearly asks for the \
                 most up-to-date and current information. Do not add any extra \
                 commentary; output only the refined query."
            }
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Search => "search",
        }
    }
}

/// Text completion capability.
#[async_trait]
pub trait TextBackend: Send + Sync {
    /// Human-readable backend name (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Generate a completion for the request.
    async fn generate(&self, request: TextRequest) -> Result<String, BackendError>;

    /// Rewrite `text` for the given purpose.
    ///
    /// Default implementation issues a generic request with the purpose's
    /// system instruction, so mocks only need to script `generate`.
    async fn improve_prompt(
        &self,
        text: &str,
        purpose: ImprovePurpose,
    ) -> Result<String, BackendError> {
        let request = TextRequest::new(
            format!("Improve this {} prompt: \"{text}\"", purpose.label()),
            TextMode::Generic,
            100,
        )
        .with_system(purpose.system_instruction());
        self.generate(request).await
    }
}

/// Streaming search/answer capability, already collapsed into one string.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Run the query and aggregate the streamed answer fragments.
    ///
    /// An empty aggregate means the stream completed without content; callers
    /// treat that the same as a transport failure (no data).
    async fn search(&self, query: &str) -> Result<String, BackendError>;
}

/// A submitted image-generation job awaiting completion.
///
/// Ephemeral: its lifetime is bounded by the polling protocol's deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageJob {
    /// Opaque handle (the backend's polling URL or job id).
    pub polling_handle: String,

    /// When the job was submitted.
    pub created_at: DateTime<Utc>,
}

/// One poll observation of an image job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    /// Not ready yet; poll again after the scheduled delay.
    Pending,
    /// The image is ready at this URL.
    Ready(String),
}

/// Asynchronous image generation capability.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Submit a generation job. One request, no retry: a submission failure
    /// is a single failed attempt.
    async fn submit(
        &self,
        prompt: &str,
        width: u32,
        height: u32,
    ) -> Result<ImageJob, BackendError>;

    /// Check whether the job has produced an image.
    async fn check(&self, job: &ImageJob) -> Result<PollStatus, BackendError>;
}
