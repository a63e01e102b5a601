//! WhatsApp Cloud webhook adapter for the tremp coordinator.
//!
//! `tremp-web` exposes the chat provider's webhook surface over axum:
//!
//! - `GET /webhook` — the provider's verify handshake (echoes
//!   `hub.challenge` when `hub.verify_token` matches).
//! - `POST /webhook` — inbound messages. The raw body is authenticated with
//!   `X-Hub-Signature-256` (HMAC-SHA256), the provider envelope is unwrapped
//!   to `(from_phone, text)`, and each message is handed to
//!   [`Coordinator::handle_message`](tremp::chat::Coordinator::handle_message).
//! - `POST /admin/command` — the admin surface, behind a bearer token.
//!
//! # Sandbox
//!
//! A `?sandbox=1` query (or `X-Sandbox: 1` header) on the webhook POST routes
//! the message into the `test_` namespace with outbound sends suppressed; the
//! reply — including inline match details — comes back in the HTTP response
//! instead. Both namespaces are servable from one process.

mod admin;
mod server;
mod webhook;

pub use server::build_router;

use std::net::SocketAddr;
use std::sync::Arc;

use tremp::chat::Coordinator;

/// Configuration for the web server.
pub struct WebConfig {
    /// Address to bind to. Default: `0.0.0.0:8080`.
    pub bind_addr: SocketAddr,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

/// Shared application state passed to all handlers via axum's `State`.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}

/// Spawn the web server on a Tokio task and return the bound address.
///
/// The server runs until the Tokio runtime shuts down.
pub async fn spawn_web(coordinator: Arc<Coordinator>, config: WebConfig) -> SocketAddr {
    let router = build_router(AppState { coordinator });
    server::start_server(router, config.bind_addr).await
}
