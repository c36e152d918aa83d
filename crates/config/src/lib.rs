//! Configuration loading, validation, and management for ChatForge.
//!
//! Loads configuration from `~/.chatforge/config.toml` with environment
//! variable overrides for secrets. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.chatforge/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Text generation backend settings
    #[serde(default)]
    pub text: TextBackendConfig,

    /// Search backend settings
    #[serde(default)]
    pub search: SearchBackendConfig,

    /// Image generation backend settings
    #[serde(default)]
    pub image: ImageBackendConfig,

    /// Chat-platform delivery settings
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Inbound webhook gateway settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Per-user conversation context settings
    #[serde(default)]
    pub context: ContextConfig,
}

/// Text generation backend (Anthropic Messages API shape).
#[derive(Clone, Serialize, Deserialize)]
pub struct TextBackendConfig {
    /// API key; usually supplied via `ANTHROPIC_API_KEY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL for the Messages API.
    #[serde(default = "default_text_base_url")]
    pub base_url: String,

    /// Model identifier.
    #[serde(default = "default_text_model")]
    pub model: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_text_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_text_base_url() -> String {
    "https://api.anthropic.com".into()
}
fn default_text_model() -> String {
    "claude-3-7-sonnet-20250219".into()
}
fn default_text_timeout_secs() -> u64 {
    15
}

impl Default for TextBackendConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_text_base_url(),
            model: default_text_model(),
            timeout_secs: default_text_timeout_secs(),
        }
    }
}

/// Streaming search backend (OpenAI-compatible chat completions).
#[derive(Clone, Serialize, Deserialize)]
pub struct SearchBackendConfig {
    /// API key; usually supplied via `EXA_API_KEY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL for the search API.
    #[serde(default = "default_search_base_url")]
    pub base_url: String,

    /// Model identifier sent in the request body.
    #[serde(default = "default_search_model")]
    pub model: String,
}

fn default_search_base_url() -> String {
    "https://api.exa.ai".into()
}
fn default_search_model() -> String {
    "exa".into()
}

impl Default for SearchBackendConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_search_base_url(),
            model: default_search_model(),
        }
    }
}

/// Image generation backend (submit + poll).
#[derive(Clone, Serialize, Deserialize)]
pub struct ImageBackendConfig {
    /// API key; usually supplied via `FLUX_API_KEY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Generation endpoint URL.
    #[serde(default = "default_image_url")]
    pub generation_url: String,

    /// Output width in pixels.
    #[serde(default = "default_image_width")]
    pub width: u32,

    /// Output height in pixels.
    #[serde(default = "default_image_height")]
    pub height: u32,

    /// Polling schedule for asynchronous job completion.
    #[serde(default)]
    pub poll: PollConfig,
}

fn default_image_url() -> String {
    "https://api.us1.bfl.ai/v1/flux-pro-1.1".into()
}
fn default_image_width() -> u32 {
    1024
}
fn default_image_height() -> u32 {
    768
}

impl Default for ImageBackendConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            generation_url: default_image_url(),
            width: default_image_width(),
            height: default_image_height(),
            poll: PollConfig::default(),
        }
    }
}

/// Bounded exponential-backoff polling schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Maximum number of poll attempts before giving up.
    #[serde(default = "default_poll_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt, in milliseconds.
    #[serde(default = "default_poll_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Multiplier applied to the delay after each unready attempt.
    #[serde(default = "default_poll_backoff_factor")]
    pub backoff_factor: f64,

    /// Delay ceiling in milliseconds.
    #[serde(default = "default_poll_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_poll_attempts() -> u32 {
    10
}
fn default_poll_initial_delay_ms() -> u64 {
    2000
}
fn default_poll_backoff_factor() -> f64 {
    1.5
}
fn default_poll_max_delay_ms() -> u64 {
    15000
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_poll_attempts(),
            initial_delay_ms: default_poll_initial_delay_ms(),
            backoff_factor: default_poll_backoff_factor(),
            max_delay_ms: default_poll_max_delay_ms(),
        }
    }
}

/// Chat-platform delivery (OAuth client-credentials + chat send endpoint).
#[derive(Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// OAuth client id; usually supplied via `CHATFORGE_CLIENT_ID`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// OAuth client secret; usually supplied via `CHATFORGE_CLIENT_SECRET`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Token endpoint (client_credentials grant).
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Chat message send endpoint.
    #[serde(default = "default_chat_url")]
    pub chat_url: String,

    /// Display name shown as the message header on the platform.
    #[serde(default = "default_bot_name")]
    pub bot_name: String,

    /// Platform identity (robot JID) the send API requires; usually supplied
    /// via `CHATFORGE_BOT_JID`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_jid: Option<String>,
}

fn default_token_url() -> String {
    "https://zoom.us/oauth/token?grant_type=client_credentials".into()
}
fn default_chat_url() -> String {
    "https://api.zoom.us/v2/im/chat/messages".into()
}
fn default_bot_name() -> String {
    "ChatForge".into()
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            token_url: default_token_url(),
            chat_url: default_chat_url(),
            bot_name: default_bot_name(),
            bot_jid: None,
        }
    }
}

/// Inbound webhook gateway.
#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Bind host.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Shared secret for HMAC-SHA256 webhook signature validation.
    /// Unset = no validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_secret: Option<String>,
}

fn default_gateway_host() -> String {
    "0.0.0.0".into()
}
fn default_gateway_port() -> u16 {
    4000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            webhook_secret: None,
        }
    }
}

/// Per-user conversation context store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Maximum messages retained per user (oldest evicted first).
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Idle hours after which a user context is swept.
    #[serde(default = "default_expiration_hours")]
    pub expiration_hours: u64,

    /// Interval between sweep runs, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_max_history() -> usize {
    10
}
fn default_expiration_hours() -> u64 {
    24
}
fn default_sweep_interval_secs() -> u64 {
    3600
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            expiration_hours: default_expiration_hours(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("text", &self.text)
            .field("search", &self.search)
            .field("image", &self.image)
            .field("delivery", &self.delivery)
            .field("gateway", &self.gateway)
            .field("context", &self.context)
            .finish()
    }
}

impl std::fmt::Debug for TextBackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextBackendConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl std::fmt::Debug for SearchBackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchBackendConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl std::fmt::Debug for ImageBackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageBackendConfig")
            .field("api_key", &redact(&self.api_key))
            .field("generation_url", &self.generation_url)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("poll", &self.poll)
            .finish()
    }
}

impl std::fmt::Debug for DeliveryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryConfig")
            .field("client_id", &redact(&self.client_id))
            .field("client_secret", &redact(&self.client_secret))
            .field("token_url", &self.token_url)
            .field("chat_url", &self.chat_url)
            .field("bot_name", &self.bot_name)
            .finish()
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("webhook_secret", &redact(&self.webhook_secret))
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            text: TextBackendConfig::default(),
            search: SearchBackendConfig::default(),
            image: ImageBackendConfig::default(),
            delivery: DeliveryConfig::default(),
            gateway: GatewayConfig::default(),
            context: ContextConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.chatforge/config.toml).
    ///
    /// Secrets are taken from the environment when not set in the file:
    /// - `ANTHROPIC_API_KEY` — text backend
    /// - `EXA_API_KEY` — search backend
    /// - `FLUX_API_KEY` — image backend
    /// - `CHATFORGE_CLIENT_ID` / `CHATFORGE_CLIENT_SECRET` — delivery OAuth
    /// - `CHATFORGE_BOT_JID` — delivery robot identity
    /// - `CHATFORGE_WEBHOOK_SECRET` — inbound signature validation
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Fill unset secrets from environment variables.
    pub fn apply_env_overrides(&mut self) {
        if self.text.api_key.is_none() {
            self.text.api_key = std::env::var("ANTHROPIC_API_KEY").ok();
        }
        if self.search.api_key.is_none() {
            self.search.api_key = std::env::var("EXA_API_KEY").ok();
        }
        if self.image.api_key.is_none() {
            self.image.api_key = std::env::var("FLUX_API_KEY").ok();
        }
        if self.delivery.client_id.is_none() {
            self.delivery.client_id = std::env::var("CHATFORGE_CLIENT_ID").ok();
        }
        if self.delivery.client_secret.is_none() {
            self.delivery.client_secret = std::env::var("CHATFORGE_CLIENT_SECRET").ok();
        }
        if self.delivery.bot_jid.is_none() {
            self.delivery.bot_jid = std::env::var("CHATFORGE_BOT_JID").ok();
        }
        if self.gateway.webhook_secret.is_none() {
            self.gateway.webhook_secret = std::env::var("CHATFORGE_WEBHOOK_SECRET").ok();
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse() {
                self.gateway.port = port;
            }
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".chatforge")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.context.max_history == 0 {
            return Err(ConfigError::ValidationError(
                "context.max_history must be at least 1".into(),
            ));
        }

        if self.image.poll.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "image.poll.max_attempts must be at least 1".into(),
            ));
        }

        if self.image.poll.backoff_factor < 1.0 {
            return Err(ConfigError::ValidationError(
                "image.poll.backoff_factor must be >= 1.0".into(),
            ));
        }

        if self.image.poll.max_delay_ms < self.image.poll.initial_delay_ms {
            return Err(ConfigError::ValidationError(
                "image.poll.max_delay_ms must be >= initial_delay_ms".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for first-run setup).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
