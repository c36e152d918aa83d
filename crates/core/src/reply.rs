//! Reply payloads — what the orchestrator hands to the delivery collaborator.

use serde::{Deserialize, Serialize};

/// A fully assembled reply, consumed exactly once by the delivery client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplyPayload {
    /// Plain text answer.
    Text { text: String },

    /// A generated image with the prompt that produced it, for attribution.
    Image { image_url: String, prompt_text: String },

    /// Text answer plus a generated image in a single reply.
    Hybrid {
        text: String,
        image_url: String,
        prompt_text: String,
    },
}

impl ReplyPayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Whether this payload carries an image (used for the image-failure
    /// retry-as-text rule in the delivery path).
    pub fn has_image(&self) -> bool {
        matches!(self, Self::Image { .. } | Self::Hybrid { .. })
    }

    /// A short history entry describing this reply, suitable for appending to
    /// the per-user conversation context after a confirmed send.
    pub fn history_entry(&self) -> String {
        match self {
            Self::Text { text } => text.clone(),
            Self::Image { prompt_text, .. } => {
                format!("[Generated image based on: \"{prompt_text}\"]")
            }
            Self::Hybrid { text, .. } => {
                format!("{text} [with generated image]")
            }
        }
    }
}

/// Routing information for delivering a reply, carried verbatim from the
/// inbound webhook event. Opaque to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryTarget {
    /// Platform user the reply goes to.
    pub user_id: String,

    /// Chat/conversation identifier within the platform.
    pub conversation_id: String,

    /// Platform account/tenant identifier, when the platform requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}
