//! HTTP gateway for ChatForge.
//!
//! One inbound surface: the chat-platform webhook. The handler validates the
//! optional HMAC signature, acknowledges immediately with a 200, and hands
//! the message to the orchestrator on a detached task — the platform's
//! delivery window is short and the reply pipeline can take tens of seconds.
//!
//! Built on Axum.

pub mod delivery;

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tracing::{info, warn, Instrument};

use chatforge_core::DeliveryTarget;
use chatforge_orchestrator::Orchestrator;

/// Shared state for the gateway routes.
pub struct GatewayState {
    pub orchestrator: Arc<Orchestrator>,
    pub webhook_secret: Option<String>,
}

type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/chat", post(chat_webhook_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: SharedState, host: &str, port: u16) -> chatforge_core::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| chatforge_core::Error::Internal(format!("Failed to bind {addr}: {e}")))?;

    info!(addr = %addr, "Gateway listening");

    axum::serve(listener, build_router(state))
        .await
        .map_err(|e| chatforge_core::Error::Internal(format!("Server error: {e}")))
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Inbound chat event, in the platform's webhook shape.
#[derive(Debug, Deserialize)]
struct ChatEvent {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    payload: Option<ChatEventPayload>,
}

#[derive(Debug, Deserialize)]
struct ChatEventPayload {
    #[serde(rename = "userId")]
    user_id: String,
    /// The user's message text.
    cmd: String,
    #[serde(rename = "toJid")]
    to_jid: String,
    #[serde(rename = "accountId", default)]
    account_id: Option<String>,
}

/// Validate a hex-encoded HMAC-SHA256 signature (optionally prefixed with
/// `sha256=`) against the shared secret. No configured secret means no
/// validation; a configured secret with a missing or malformed signature is a
/// rejection. Comparison is constant-time.
fn validate_signature(secret: Option<&str>, body: &[u8], signature: Option<&str>) -> bool {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return true;
    };
    let Some(signature) = signature else {
        return false;
    };

    let sig_hex = signature.strip_prefix("sha256=").unwrap_or(signature);
    let provided = match hex::decode(sig_hex) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    mac.verify_slice(&provided).is_ok()
}

/// The webhook endpoint. Acknowledges with a 200 before the reply pipeline
/// runs; the orchestrator's work happens on a detached task.
async fn chat_webhook_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<serde_json::Value>) {
    let signature = headers
        .get("x-zm-signature")
        .and_then(|v| v.to_str().ok());

    if !validate_signature(state.webhook_secret.as_deref(), &body, signature) {
        warn!("Rejected webhook with invalid signature");
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "message": "Invalid signature" })),
        );
    }

    let event: ChatEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Unparseable webhook body");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "message": "Malformed event" })),
            );
        }
    };

    info!(event = event.event.as_deref().unwrap_or("unknown"), "Chat event received");

    let Some(payload) = event.payload else {
        // Verification pings and other non-message events are acknowledged
        // and dropped.
        return (
            StatusCode::OK,
            Json(serde_json::json!({ "message": "Event ignored", "status": 200 })),
        );
    };

    let orchestrator = state.orchestrator.clone();
    let request_id = uuid::Uuid::new_v4().to_string();
    tokio::spawn(
        async move {
            let target = DeliveryTarget {
                user_id: payload.user_id.clone(),
                conversation_id: payload.to_jid,
                account_id: payload.account_id,
            };
            orchestrator.handle(&payload.user_id, &payload.cmd, &target).await;
        }
        .instrument(tracing::info_span!("chat_event", request_id = %request_id)),
    );

    (
        StatusCode::OK,
        Json(serde_json::json!({ "message": "Event received. Processing...", "status": 200 })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_event_parses_platform_shape() {
        let raw = r#"{
            "event": "bot_notification",
            "payload": {
                "userId": "u-123",
                "cmd": "what's the weather today",
                "toJid": "room@xmpp.example",
                "accountId": "acct-9"
            }
        }"#;
        let event: ChatEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.event.as_deref(), Some("bot_notification"));

        let payload = event.payload.unwrap();
        assert_eq!(payload.user_id, "u-123");
        assert_eq!(payload.cmd, "what's the weather today");
        assert_eq!(payload.to_jid, "room@xmpp.example");
        assert_eq!(payload.account_id.as_deref(), Some("acct-9"));
    }

    #[test]
    fn chat_event_without_payload_is_tolerated() {
        let event: ChatEvent = serde_json::from_str(r#"{"event": "endpoint.url_validation"}"#).unwrap();
        assert!(event.payload.is_none());
    }

    #[test]
    fn missing_secret_accepts_everything() {
        assert!(validate_signature(None, b"body", None));
        assert!(validate_signature(Some(""), b"body", Some("junk")));
    }

    #[test]
    fn signature_round_trip() {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        let secret = "webhook-secret";
        let body = br#"{"event":"bot_notification"}"#;

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let sig = hex::encode(mac.finalize().into_bytes());

        assert!(validate_signature(Some(secret), body, Some(&sig)));
        assert!(validate_signature(
            Some(secret),
            body,
            Some(&format!("sha256={sig}"))
        ));

        // Wrong body, wrong secret, malformed hex, missing signature.
        assert!(!validate_signature(Some(secret), b"tampered", Some(&sig)));
        assert!(!validate_signature(Some("other"), body, Some(&sig)));
        assert!(!validate_signature(Some(secret), body, Some("not-hex")));
        assert!(!validate_signature(Some(secret), body, None));
    }
}
