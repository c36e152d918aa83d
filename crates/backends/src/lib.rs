//! Upstream backend clients for ChatForge.
//!
//! Implementations of the core capability traits against real vendor APIs:
//! - [`text::AnthropicText`] — Messages-API text generation
//! - [`search::ExaSearch`] — streaming search/answer aggregation
//! - [`image::FluxImage`] — asynchronous image generation
//!
//! plus the [`poll`] module's bounded-backoff polling protocol that retrieves
//! asynchronous image results.

pub mod image;
pub mod poll;
pub mod search;
pub mod text;

pub use image::FluxImage;
pub use poll::{poll_until_ready, PollSchedule, Sleep, TokioSleep};
pub use search::ExaSearch;
pub use text::AnthropicText;
