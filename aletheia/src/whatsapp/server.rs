use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rocket::data::{Limits, ToByteUnit};
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::serde::json::Json;
use rocket::{get, post, routes, Build, FromForm, Rocket, State};
use serde::Serialize;

use common::ServerConfig;

use super::{extract_messages, verify_signature, WebhookPayload, SIGNATURE_HEADER};
use crate::relay::{ChatClient, Relay};

/// Application state stored inside Rocket managed state.
pub struct WebhookState {
    pub started_at: DateTime<Utc>,
    pub relay: Relay,
    pub client: Arc<dyn ChatClient>,
    /// Token Meta echoes back during the subscription handshake
    pub verify_token: Option<String>,
    /// When set, every webhook body must carry a valid signature
    pub app_secret: Option<String>,
    pub business_number: Option<String>,
    pub backend_url: String,
    pub channels: Vec<&'static str>,
}

/// Response structure for `/api/v1/status`.
#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    uptime_seconds: i64,
    channels: Vec<&'static str>,
    backend_url: String,
}

/// `hub.*` query parameters of the subscription handshake
#[derive(Debug, FromForm)]
pub struct HubQuery {
    mode: Option<String>,
    verify_token: Option<String>,
    challenge: Option<String>,
}

/// Raw `X-Hub-Signature-256` header, if any
pub struct HubSignature(Option<String>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for HubSignature {
    type Error = std::convert::Infallible;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(HubSignature(
            req.headers().get_one(SIGNATURE_HEADER).map(str::to_string),
        ))
    }
}

#[get("/health")]
async fn health() -> &'static str {
    "OK"
}

/// Status endpoint returning simple JSON with uptime and enabled channels.
#[get("/api/v1/status")]
async fn status(state: &State<WebhookState>) -> Json<StatusResponse> {
    let uptime = (Utc::now() - state.started_at).num_seconds();
    Json(StatusResponse {
        status: "ok",
        uptime_seconds: uptime,
        channels: state.channels.clone(),
        backend_url: state.backend_url.clone(),
    })
}

#[get("/webhook/whatsapp?<hub>")]
async fn verify_webhook(state: &State<WebhookState>, hub: HubQuery) -> Result<String, Status> {
    let expected = state.verify_token.as_deref();
    match (hub.mode.as_deref(), hub.verify_token.as_deref(), hub.challenge) {
        (Some("subscribe"), Some(token), Some(challenge)) if Some(token) == expected => {
            tracing::info!("WhatsApp webhook verified successfully");
            Ok(challenge)
        }
        _ => {
            tracing::warn!("WhatsApp webhook verification failed");
            Err(Status::Forbidden)
        }
    }
}

#[post("/webhook/whatsapp", data = "<body>")]
async fn receive_webhook(
    state: &State<WebhookState>,
    signature: HubSignature,
    body: Vec<u8>,
) -> Status {
    if let Some(secret) = state.app_secret.as_deref() {
        if !verify_signature(secret, &body, signature.0.as_deref()) {
            tracing::warn!("rejecting WhatsApp webhook with invalid signature");
            return Status::Unauthorized;
        }
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "malformed WhatsApp webhook payload");
            return Status::BadRequest;
        }
    };

    let messages = extract_messages(payload, state.business_number.as_deref());
    tracing::debug!(count = messages.len(), "WhatsApp webhook received");

    // Meta retries webhooks that are not answered quickly, so each message
    // is relayed on its own task and the webhook is acknowledged right away.
    for message in messages {
        let relay = state.relay.clone();
        let client = Arc::clone(&state.client);
        tokio::spawn(async move {
            relay.handle(client.as_ref(), &message).await;
        });
    }

    Status::Ok
}

/// Build the Rocket instance serving the webhook and status routes.
pub fn build_rocket(state: WebhookState, server: &ServerConfig) -> Rocket<Build> {
    let mut fig = rocket::Config::figment()
        .merge(("limits", Limits::default().limit("bytes", 1.mebibytes())));
    if let Some(bind) = &server.bind {
        fig = fig.merge(("address", bind.clone()));
    }
    if let Some(port) = server.port {
        fig = fig.merge(("port", port));
    }

    rocket::custom(fig).manage(state).mount(
        "/",
        routes![health, status, verify_webhook, receive_webhook],
    )
}

/// Launch the webhook server; returns once Rocket shuts down (SIGINT/SIGTERM).
pub async fn launch(state: WebhookState, server: &ServerConfig) -> Result<()> {
    tracing::info!("Starting Rocket HTTP server");
    build_rocket(state, server)
        .launch()
        .await
        .map_err(|e| anyhow!("Rocket failed: {}", e))?;

    tracing::info!("Rocket HTTP server has shut down");
    Ok(())
}
