//! Intent classification domain types.
//!
//! A user query is classified into one of four response strategies. The
//! classification is produced per request by the intent classifier and never
//! persisted.

use serde::{Deserialize, Serialize};

/// The four response strategies the orchestrator can dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Plain conversational answer from the text backend.
    Text,
    /// Generate an image and send it.
    Image,
    /// Current/time-sensitive information via the search backend.
    Search,
    /// Information lookup plus a generated image in one reply.
    Hybrid,
}

impl Intent {
    /// Parse the classifier's wire name (the token the decide-mode backend is
    /// asked to emit on its `Response type:` line).
    ///
    /// Unknown tokens return `None`; the caller defaults to [`Intent::Text`],
    /// the safest strategy.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s.trim() {
            "text_response" => Some(Self::Text),
            "image_request" => Some(Self::Image),
            "exa_response" => Some(Self::Search),
            "hybrid_response" => Some(Self::Hybrid),
            _ => None,
        }
    }

    /// The wire name used in classifier prompts and logs.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Text => "text_response",
            Self::Image => "image_request",
            Self::Search => "exa_response",
            Self::Hybrid => "hybrid_response",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}

/// The result of classifying one query: the extracted subject context plus the
/// chosen response strategy. Ephemeral, produced per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Subjects/details the backend extracted from the query and history.
    /// Empty when the backend call failed or emitted nothing usable.
    pub extracted_context: String,

    /// The final response strategy after override rules were applied.
    pub intent: Intent,
}

impl ClassificationResult {
    /// The safe default used when the decide call fails or cannot be parsed.
    pub fn fallback() -> Self {
        Self {
            extracted_context: String::new(),
            intent: Intent::Text,
        }
    }
}

/// The outcome of verifying a search answer: valid or not, plus the reason.
/// The reason feeds the refinement rewrite on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationOutcome {
    pub is_valid: bool,
    pub reason: String,
}

impl VerificationOutcome {
    pub fn valid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            reason: reason.into(),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            reason: reason.into(),
        }
    }
}
