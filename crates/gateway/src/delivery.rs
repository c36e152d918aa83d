//! Zoom Team Chat delivery client.
//!
//! Owns the whole send path: OAuth client-credentials token with in-process
//! caching, payload formatting into the platform's head/body shape, and the
//! markdown-link rewrite the platform needs (`[text](url)` becomes
//! `<url|text>`).

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use chatforge_config::DeliveryConfig;
use chatforge_core::error::DeliveryError;
use chatforge_core::{Clock, Delivery, DeliveryTarget, ReplyPayload};

/// Tokens are refreshed this long before they actually expire.
const TOKEN_EXPIRY_BUFFER_SECS: i64 = 300;

static MARKDOWN_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").unwrap());

/// Rewrite markdown links into the platform's `<url|text>` form.
fn convert_markdown_links(text: &str) -> String {
    MARKDOWN_LINK_RE.replace_all(text, "<$2|$1>").into_owned()
}

/// Whether a cached token is still usable at `now`.
fn token_still_valid(cached: &CachedToken, now: DateTime<Utc>) -> bool {
    cached.expires_at > now + Duration::seconds(TOKEN_EXPIRY_BUFFER_SECS)
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Zoom Team Chat send path.
pub struct ZoomDelivery {
    name: String,
    token_url: String,
    chat_url: String,
    bot_name: String,
    bot_jid: String,
    client_id: String,
    client_secret: String,
    client: reqwest::Client,
    clock: Arc<dyn Clock>,
    token: Mutex<Option<CachedToken>>,
}

impl ZoomDelivery {
    /// Create a client from config. Fails when credentials or the robot
    /// identity are missing.
    pub fn new(config: &DeliveryConfig, clock: Arc<dyn Clock>) -> Result<Self, DeliveryError> {
        let client_id = config.client_id.clone().ok_or_else(|| {
            DeliveryError::NotAuthenticated("No delivery client id configured".into())
        })?;
        let client_secret = config.client_secret.clone().ok_or_else(|| {
            DeliveryError::NotAuthenticated("No delivery client secret configured".into())
        })?;
        let bot_jid = config.bot_jid.clone().ok_or_else(|| {
            DeliveryError::NotAuthenticated("No bot JID configured".into())
        })?;

        Ok(Self {
            name: "zoom".into(),
            token_url: config.token_url.clone(),
            chat_url: config.chat_url.clone(),
            bot_name: config.bot_name.clone(),
            bot_jid,
            client_id,
            client_secret,
            client: reqwest::Client::new(),
            clock,
            token: Mutex::new(None),
        })
    }

    /// The cached access token, refreshed through the client-credentials
    /// grant when absent or within the expiry buffer.
    async fn access_token(&self) -> Result<String, DeliveryError> {
        let mut cached = self.token.lock().await;
        let now = self.clock.now();

        if let Some(token) = cached.as_ref() {
            if token_still_valid(token, now) {
                return Ok(token.token.clone());
            }
        }

        let basic = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.client_id, self.client_secret));

        let response = self
            .client
            .post(&self.token_url)
            .header("Authorization", format!("Basic {basic}"))
            .send()
            .await
            .map_err(|e| DeliveryError::NotAuthenticated(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            warn!(status, body = %body, "Token request failed");
            return Err(DeliveryError::NotAuthenticated(format!(
                "Token endpoint returned status {status}"
            )));
        }

        let token_resp: TokenResponse = response
            .json()
            .await
            .map_err(|e| DeliveryError::NotAuthenticated(e.to_string()))?;

        info!(
            expires_in = token_resp.expires_in,
            "Chat platform token received"
        );

        *cached = Some(CachedToken {
            token: token_resp.access_token.clone(),
            expires_at: now + Duration::seconds(token_resp.expires_in),
        });

        Ok(token_resp.access_token)
    }

    /// Build the platform's head/body content block for a payload.
    fn format_content(&self, payload: &ReplyPayload) -> serde_json::Value {
        match payload {
            ReplyPayload::Text { text } => serde_json::json!({
                "head": { "text": self.bot_name },
                "body": [{
                    "type": "message",
                    "is_markdown_support": true,
                    "text": convert_markdown_links(text),
                }],
            }),
            ReplyPayload::Image {
                image_url,
                prompt_text,
            } => serde_json::json!({
                "head": { "text": self.bot_name },
                "body": [{
                    "type": "attachments",
                    "resource_url": image_url,
                    "img_url": image_url,
                    "information": {
                        "title": { "text": "AI-Generated Image" },
                        "description": { "text": format!("Prompt: \"{prompt_text}\"") },
                    },
                }],
            }),
            ReplyPayload::Hybrid {
                text,
                image_url,
                prompt_text,
            } => serde_json::json!({
                "head": { "text": self.bot_name },
                "body": [
                    {
                        "type": "message",
                        "is_markdown_support": true,
                        "text": convert_markdown_links(text),
                    },
                    {
                        "type": "attachments",
                        "resource_url": image_url,
                        "img_url": image_url,
                        "information": {
                            "title": { "text": "AI-Generated Visualization" },
                            "description": { "text": format!("Based on: \"{prompt_text}\"") },
                        },
                    },
                ],
            }),
        }
    }
}

#[async_trait]
impl Delivery for ZoomDelivery {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(
        &self,
        target: &DeliveryTarget,
        payload: &ReplyPayload,
    ) -> Result<(), DeliveryError> {
        let token = self.access_token().await?;

        let body = serde_json::json!({
            "robot_jid": self.bot_jid,
            "to_jid": target.conversation_id,
            "user_jid": target.conversation_id,
            "account_id": target.account_id,
            "content": self.format_content(payload),
        });

        debug!(delivery = %self.name, to = %target.conversation_id, "Sending chat message");

        let response = self
            .client
            .post(&self.chat_url)
            .bearer_auth(&token)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::SendFailed {
                reason: e.to_string(),
            })?;

        let status = response.status().as_u16();
        if status == 401 {
            // The cached token was revoked out from under us.
            *self.token.lock().await = None;
            return Err(DeliveryError::NotAuthenticated(
                "Send rejected with 401; token cache cleared".into(),
            ));
        }
        if !(200..300).contains(&status) {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Chat send failed");
            return Err(DeliveryError::SendFailed {
                reason: format!("status {status}: {error_body}"),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
}
