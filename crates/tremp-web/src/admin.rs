//! HTTP admin endpoint, behind the configured bearer token.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use tracing::warn;

use crate::AppState;
use tremp::store::Prefix;

/// Request body for POST /admin/command.
#[derive(Deserialize)]
pub struct AdminRequest {
    /// Command line, same grammar as the chat surface (without `/a`):
    /// `list <phone>`, `delete <phone>`, `reset <phone>`, `phone <old> <new>`.
    pub command: String,
    /// Run against the sandbox namespace instead of the live one.
    #[serde(default)]
    pub sandbox: bool,
}

/// POST /admin/command — execute an admin command.
///
/// Requires `Authorization: Bearer {admin_token}`; 401 otherwise.
pub async fn command(
    State(app): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AdminRequest>,
) -> impl IntoResponse {
    let expected = &app.coordinator.config().admin_token;
    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if expected.is_empty() || provided != Some(expected.as_str()) {
        warn!("admin command rejected: bad bearer token");
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"status": "unauthorized"})),
        );
    }

    let prefix = if body.sandbox {
        Prefix::sandbox()
    } else {
        Prefix::live()
    };
    let reply = app.coordinator.admin_command(&body.command, &prefix).await;
    (
        StatusCode::OK,
        Json(serde_json::json!({"status": "ok", "reply": reply})),
    )
}
