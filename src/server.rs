//! Webhook interactions endpoint for slash commands.
//!
//! This is a stateless request/response path, fully independent of the
//! gateway pipeline. Discord signs every request with the application's
//! ed25519 key; anything that fails verification is rejected before parsing.

use crate::config::WebhookConfig;
use crate::error::{ConfigError, Result};
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

// Discord interaction wire constants.
const INTERACTION_PING: u64 = 1;
const INTERACTION_APPLICATION_COMMAND: u64 = 2;
const RESPONSE_PONG: u64 = 1;
const RESPONSE_CHANNEL_MESSAGE: u64 = 4;
const FLAG_EPHEMERAL: u64 = 64;

const AWW_TEXT: &str = "Here's something adorable to brighten your day! (｡♥‿♥｡)🐾";

struct ServerState {
    public_key: VerifyingKey,
    application_id: String,
}

/// Run the webhook server until the process exits. Only called when a
/// public key is configured.
pub async fn serve(config: &WebhookConfig) -> Result<()> {
    let public_key_hex = config
        .public_key
        .as_deref()
        .ok_or_else(|| ConfigError::Invalid("webhook public key not configured".to_string()))?;
    let public_key = parse_public_key(public_key_hex)?;

    let state = Arc::new(ServerState {
        public_key,
        application_id: config.application_id.clone().unwrap_or_default(),
    });

    let app = Router::new()
        .route("/", get(index).post(interactions))
        .with_state(state);

    let bind = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(%bind, "webhook server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn parse_public_key(public_key_hex: &str) -> Result<VerifyingKey> {
    let bytes = hex::decode(public_key_hex)
        .map_err(|e| ConfigError::Invalid(format!("public key is not valid hex: {e}")))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| ConfigError::Invalid("public key must be 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|e| ConfigError::Invalid(format!("invalid ed25519 public key: {e}")).into())
}

async fn index(State(state): State<Arc<ServerState>>) -> String {
    format!("👋 {}", state.application_id)
}

async fn interactions(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = header_str(&headers, "x-signature-ed25519");
    let timestamp = header_str(&headers, "x-signature-timestamp");
    let (Some(signature), Some(timestamp)) = (signature, timestamp) else {
        return (StatusCode::UNAUTHORIZED, "Bad request signature.").into_response();
    };

    if !verify_signature(&state.public_key, signature, timestamp, &body) {
        warn!("rejected interaction with bad signature");
        return (StatusCode::UNAUTHORIZED, "Bad request signature.").into_response();
    }

    let Ok(interaction) = serde_json::from_slice::<serde_json::Value>(&body) else {
        return (StatusCode::BAD_REQUEST, "Invalid JSON.").into_response();
    };

    match interaction["type"].as_u64() {
        Some(INTERACTION_PING) => {
            Json(serde_json::json!({ "type": RESPONSE_PONG })).into_response()
        }
        Some(INTERACTION_APPLICATION_COMMAND) => {
            let name = interaction["data"]["name"].as_str().unwrap_or_default();
            match command_response(name, &state.application_id) {
                Some(reply) => Json(reply).into_response(),
                None => (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({ "error": "Unknown Type" })),
                )
                    .into_response(),
            }
        }
        _ => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "Unknown Type" })),
        )
            .into_response(),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Verify a Discord webhook signature: ed25519 over `timestamp || body`.
pub fn verify_signature(
    public_key: &VerifyingKey,
    signature_hex: &str,
    timestamp: &str,
    body: &[u8],
) -> bool {
    let Ok(signature_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&signature_bytes) else {
        return false;
    };

    let mut message = Vec::with_capacity(timestamp.len() + body.len());
    message.extend_from_slice(timestamp.as_bytes());
    message.extend_from_slice(body);
    public_key.verify(&message, &signature).is_ok()
}

/// Build the response payload for a known slash command.
fn command_response(name: &str, application_id: &str) -> Option<serde_json::Value> {
    match name.to_lowercase().as_str() {
        "aww" => Some(serde_json::json!({
            "type": RESPONSE_CHANNEL_MESSAGE,
            "data": { "content": AWW_TEXT },
        })),
        "invite" => {
            let invite_url = format!(
                "https://discord.com/oauth2/authorize?client_id={application_id}&scope=applications.commands"
            );
            Some(serde_json::json!({
                "type": RESPONSE_CHANNEL_MESSAGE,
                "data": {
                    "content": invite_url,
                    "flags": FLAG_EPHEMERAL,
                },
            }))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn keypair() -> (SigningKey, VerifyingKey) {
        let signing_key = SigningKey::from_bytes(&[7u8; 32]);
        let verifying_key = VerifyingKey::from(&signing_key);
        (signing_key, verifying_key)
    }

    #[test]
    fn valid_signature_passes() {
        let (signing_key, verifying_key) = keypair();
        let timestamp = "1700000000";
        let body = br#"{"type":1}"#;

        let mut message = timestamp.as_bytes().to_vec();
        message.extend_from_slice(body);
        let signature = hex::encode(signing_key.sign(&message).to_bytes());

        assert!(verify_signature(&verifying_key, &signature, timestamp, body));
    }

    #[test]
    fn tampered_body_fails() {
        let (signing_key, verifying_key) = keypair();
        let timestamp = "1700000000";
        let body = br#"{"type":1}"#;

        let mut message = timestamp.as_bytes().to_vec();
        message.extend_from_slice(body);
        let signature = hex::encode(signing_key.sign(&message).to_bytes());

        assert!(!verify_signature(
            &verifying_key,
            &signature,
            timestamp,
            br#"{"type":2}"#
        ));
        assert!(!verify_signature(
            &verifying_key,
            &signature,
            "1700000001",
            body
        ));
    }

    #[test]
    fn garbage_signature_fails_without_panic() {
        let (_, verifying_key) = keypair();
        assert!(!verify_signature(&verifying_key, "not-hex", "0", b""));
        assert!(!verify_signature(&verifying_key, "abcd", "0", b""));
    }

    #[test]
    fn known_commands_answer_unknown_rejected() {
        let invite = command_response("invite", "12345").expect("invite should resolve");
        assert_eq!(invite["type"], RESPONSE_CHANNEL_MESSAGE);
        assert!(
            invite["data"]["content"]
                .as_str()
                .expect("content should be a string")
                .contains("client_id=12345")
        );
        assert_eq!(invite["data"]["flags"], FLAG_EPHEMERAL);

        let aww = command_response("AWW", "12345").expect("aww should resolve");
        assert_eq!(aww["data"]["content"], AWW_TEXT);

        assert!(command_response("unknown", "12345").is_none());
    }

    #[test]
    fn parse_public_key_validates_input() {
        let (_, verifying_key) = keypair();
        let parsed = parse_public_key(&hex::encode(verifying_key.to_bytes()))
            .expect("round-tripped key should parse");
        assert_eq!(parsed, verifying_key);

        assert!(parse_public_key("zzzz").is_err());
        assert!(parse_public_key("abcd").is_err());
    }
}
