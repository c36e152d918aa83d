//! Scripted backend doubles shared by the orchestrator test modules.

use std::sync::Mutex;

use async_trait::async_trait;

use chatforge_core::error::{BackendError, DeliveryError};
use chatforge_core::{
    Delivery, DeliveryTarget, ImageBackend, ImageJob, PollStatus, ReplyPayload, SearchBackend,
    TextBackend, TextRequest,
};
use chatforge_backends::Sleep;

/// Text backend that pops one scripted reply per `generate` call and records
/// every request it saw.
pub(crate) struct ScriptedText {
    replies: Mutex<Vec<Result<String, BackendError>>>,
    requests: Mutex<Vec<TextRequest>>,
}

impl ScriptedText {
    pub(crate) fn new(replies: Vec<Result<String, BackendError>>) -> Self {
        Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<TextRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextBackend for ScriptedText {
    fn name(&self) -> &str {
        "scripted-text"
    }

    async fn generate(&self, request: TextRequest) -> Result<String, BackendError> {
        self.requests.lock().unwrap().push(request);
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            Err(BackendError::Network("text script exhausted".into()))
        } else {
            replies.remove(0)
        }
    }
}

/// Search backend with scripted answers and recorded queries.
pub(crate) struct ScriptedSearch {
    replies: Mutex<Vec<Result<String, BackendError>>>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedSearch {
    pub(crate) fn new(replies: Vec<Result<String, BackendError>>) -> Self {
        Self {
            replies: Mutex::new(replies),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl SearchBackend for ScriptedSearch {
    fn name(&self) -> &str {
        "scripted-search"
    }

    async fn search(&self, query: &str) -> Result<String, BackendError> {
        self.queries.lock().unwrap().push(query.to_string());
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            Err(BackendError::Network("search script exhausted".into()))
        } else {
            replies.remove(0)
        }
    }
}

/// Image backend whose submission either succeeds or fails, with scripted
/// poll outcomes (exhausted script means "still pending").
pub(crate) struct ScriptedImage {
    submit_ok: bool,
    checks: Mutex<Vec<Result<PollStatus, BackendError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedImage {
    pub(crate) fn ready(url: &str) -> Self {
        Self {
            submit_ok: true,
            checks: Mutex::new(vec![Ok(PollStatus::Ready(url.into()))]),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn never_ready() -> Self {
        Self {
            submit_ok: true,
            checks: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn submit_fails() -> Self {
        Self {
            submit_ok: false,
            checks: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageBackend for ScriptedImage {
    fn name(&self) -> &str {
        "scripted-image"
    }

    async fn submit(
        &self,
        prompt: &str,
        _width: u32,
        _height: u32,
    ) -> Result<ImageJob, BackendError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.submit_ok {
            Ok(ImageJob {
                polling_handle: "https://poll.example/job/1".into(),
                created_at: chrono::Utc::now(),
            })
        } else {
            Err(BackendError::Api {
                status_code: 500,
                message: "submission rejected".into(),
            })
        }
    }

    async fn check(&self, _job: &ImageJob) -> Result<PollStatus, BackendError> {
        let mut checks = self.checks.lock().unwrap();
        if checks.is_empty() {
            Ok(PollStatus::Pending)
        } else {
            checks.remove(0)
        }
    }
}

/// Delivery double: records successful sends, optionally rejecting payloads
/// that carry an image.
#[derive(Default)]
pub(crate) struct RecordingDelivery {
    pub(crate) reject_images: bool,
    sent: Mutex<Vec<ReplyPayload>>,
}

impl RecordingDelivery {
    pub(crate) fn rejecting_images() -> Self {
        Self {
            reject_images: true,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn sent(&self) -> Vec<ReplyPayload> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Delivery for RecordingDelivery {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(
        &self,
        _target: &DeliveryTarget,
        payload: &ReplyPayload,
    ) -> Result<(), DeliveryError> {
        if self.reject_images && payload.has_image() {
            return Err(DeliveryError::SendFailed {
                reason: "image uploads disabled".into(),
            });
        }
        self.sent.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

/// A sleeper that never actually waits.
pub(crate) struct NoSleep;

#[async_trait]
impl Sleep for NoSleep {
    async fn sleep(&self, _duration: std::time::Duration) {}
}
