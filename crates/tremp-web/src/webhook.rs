//! Webhook handlers: verify handshake, signature check, envelope unwrap.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, info, warn};

use crate::AppState;
use tremp::store::Prefix;

type HmacSha256 = Hmac<Sha256>;

/// GET /webhook — the provider's subscription handshake.
///
/// Echoes `hub.challenge` when `hub.mode` is `subscribe` and the verify
/// token matches; 403 otherwise.
pub async fn verify_handshake(
    State(app): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let mode = params.get("hub.mode").map(String::as_str);
    let token = params.get("hub.verify_token").map(String::as_str);
    let challenge = params.get("hub.challenge").cloned().unwrap_or_default();

    let expected = &app.coordinator.config().webhook_verify_token;
    if mode == Some("subscribe") && !expected.is_empty() && token == Some(expected.as_str()) {
        info!("webhook handshake verified");
        (StatusCode::OK, challenge)
    } else {
        warn!("webhook handshake rejected (mode {mode:?})");
        (StatusCode::FORBIDDEN, String::new())
    }
}

/// POST /webhook — inbound messages from the chat provider.
///
/// Verifies `X-Hub-Signature-256` over the raw body, unwraps the envelope,
/// and routes each text message through the coordinator. Sandbox requests
/// (`?sandbox=1` or `X-Sandbox: 1`) run against the `test_` namespace with
/// sends suppressed and get their replies inline; live messages are
/// acknowledged immediately and handled on detached tasks.
pub async fn receive(
    State(app): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let secret = &app.coordinator.config().webhook_app_secret;
    if !secret.is_empty() && !signature_valid(secret, &headers, &body) {
        warn!("webhook POST rejected: bad signature");
        return (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({"status": "bad signature"})),
        );
    }

    let envelope: WebhookEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("webhook POST rejected: malformed envelope: {e}");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"status": "malformed"})),
            );
        }
    };

    let sandbox = params.get("sandbox").is_some_and(|v| v == "1")
        || headers
            .get("x-sandbox")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "1");
    let (prefix, send_externally) = if sandbox {
        (Prefix::sandbox(), false)
    } else {
        (Prefix::live(), true)
    };

    let messages = envelope.text_messages();
    debug!(
        "webhook POST: {} text message(s), sandbox={sandbox}",
        messages.len()
    );

    let mut replies = Vec::new();
    for (from, text) in messages {
        if sandbox {
            let reply = app
                .coordinator
                .handle_message(&from, &text, &prefix, send_externally)
                .await;
            replies.push(serde_json::json!({"to": from, "reply": reply}));
        } else {
            // Acknowledge fast; the reply reaches the user via the sink.
            let coordinator = app.coordinator.clone();
            let prefix = prefix.clone();
            tokio::spawn(async move {
                coordinator
                    .handle_message(&from, &text, &prefix, send_externally)
                    .await;
            });
        }
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({"status": "accepted", "replies": replies})),
    )
}

fn signature_valid(secret: &str, headers: &HeaderMap, body: &[u8]) -> bool {
    let Some(header) = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let Some(provided) = header.strip_prefix("sha256=") else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());
    expected == provided.to_lowercase()
}

// ── Provider envelope ──────────────────────────────────────────────

/// The provider-specific webhook envelope, reduced to what the core needs.
#[derive(Deserialize, Debug)]
struct WebhookEnvelope {
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Deserialize, Debug)]
struct Entry {
    #[serde(default)]
    changes: Vec<Change>,
}

#[derive(Deserialize, Debug)]
struct Change {
    #[serde(default)]
    value: ChangeValue,
}

#[derive(Deserialize, Debug, Default)]
struct ChangeValue {
    #[serde(default)]
    messages: Vec<InboundMessage>,
}

#[derive(Deserialize, Debug)]
struct InboundMessage {
    from: String,
    #[serde(default)]
    text: Option<TextBody>,
}

#[derive(Deserialize, Debug)]
struct TextBody {
    body: String,
}

impl WebhookEnvelope {
    /// All `(from_phone, text)` pairs in the envelope. Non-text messages
    /// (statuses, media) are ignored.
    fn text_messages(&self) -> Vec<(String, String)> {
        self.entry
            .iter()
            .flat_map(|entry| &entry.changes)
            .flat_map(|change| &change.value.messages)
            .filter_map(|message| {
                message
                    .text
                    .as_ref()
                    .map(|text| (message.from.clone(), text.body.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_extracts_text_messages() {
        let raw = r#"{
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "0",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "messages": [
                            {"from": "972501", "type": "text", "text": {"body": "טרמפ לתל אביב"}},
                            {"from": "972502", "type": "image"}
                        ]
                    }
                }]
            }]
        }"#;
        let envelope: WebhookEnvelope = serde_json::from_str(raw).unwrap();
        let messages = envelope.text_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, "972501");
        assert_eq!(messages[0].1, "טרמפ לתל אביב");
    }

    #[test]
    fn status_only_envelope_is_empty() {
        let raw = r#"{"entry": [{"changes": [{"value": {"statuses": [{"id": "x"}]}}]}]}"#;
        let envelope: WebhookEnvelope = serde_json::from_str(raw).unwrap();
        assert!(envelope.text_messages().is_empty());
    }

    #[test]
    fn signature_round_trip() {
        let secret = "top-secret";
        let body = br#"{"entry":[]}"#;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let sig = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));

        let mut headers = HeaderMap::new();
        headers.insert("x-hub-signature-256", sig.parse().unwrap());
        assert!(signature_valid(secret, &headers, body));
        assert!(!signature_valid("other-secret", &headers, body));

        headers.remove("x-hub-signature-256");
        assert!(!signature_valid(secret, &headers, body));
    }
}
