//! Delivery trait — the abstraction over the chat-platform send path.

use async_trait::async_trait;

use crate::error::DeliveryError;
use crate::reply::{DeliveryTarget, ReplyPayload};

/// Sends assembled replies back to the chat platform.
///
/// Implementations own authentication (token refresh), message formatting,
/// and transport. The orchestrator only ever sees success or failure.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Human-readable delivery name (e.g., "zoom", "callback").
    fn name(&self) -> &str;

    /// Deliver one payload to the target. Consumed exactly once.
    async fn deliver(
        &self,
        target: &DeliveryTarget,
        payload: &ReplyPayload,
    ) -> Result<(), DeliveryError>;
}
