//! # ChatForge Core
//!
//! Domain types, traits, and error definitions for the ChatForge
//! conversational orchestration runtime. This crate has **zero framework
//! dependencies** — it defines the domain model that all other crates
//! implement against.
//!
//! ## Design Philosophy
//!
//! Every upstream capability (text generation, search, image generation,
//! delivery) is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping vendors via configuration
//! - Easy testing with scripted mock backends
//! - Clean dependency graph (all crates depend inward on core)

pub mod backend;
pub mod clock;
pub mod delivery;
pub mod error;
pub mod intent;
pub mod reply;

// Re-export key types at crate root for ergonomics
pub use backend::{
    ImageBackend, ImageJob, ImprovePurpose, PollStatus, SearchBackend, TextBackend, TextMode,
    TextRequest,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use delivery::Delivery;
pub use error::{BackendError, DeliveryError, Error, Result};
pub use intent::{ClassificationResult, Intent, VerificationOutcome};
pub use reply::{DeliveryTarget, ReplyPayload};
