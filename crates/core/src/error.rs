//! Error types for the ChatForge domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! Nothing in the reply pipeline is fatal: backend errors are caught at the
//! call site and absorbed into a degraded fallback value, so these types
//! exist for logging context and for the few places (config loading, server
//! startup) where failing loudly is correct.

use thiserror::Error;

/// The top-level error type for all ChatForge operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Upstream backend errors ---
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    // --- Delivery errors ---
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Errors from the generative/information backends (text, search, image).
///
/// Maps the pipeline's failure taxonomy: transport and non-2xx responses are
/// `Network`/`Api`, exhausted polling is `Timeout`. Parse failures of backend
/// *content* are deliberately not represented here — malformed classification
/// or verification text degrades to a safe default at the parse site instead
/// of becoming an error.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Errors from the chat-platform delivery collaborator.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Not authenticated with the chat platform: {0}")]
    NotAuthenticated(String),

    #[error("Message delivery failed: {reason}")]
    SendFailed { reason: String },

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),
}
