//! Webhook server binary.
//!
//! Reads configuration from the environment (see `tremp::config`), wires the
//! production coordinator, and serves the webhook + admin endpoints.
//!
//! # Usage
//!
//! ```bash
//! LLM_API_KEY=sk-... \
//! CHAT_PROVIDER_PHONE_ID=1055... CHAT_PROVIDER_TOKEN=EAAG... \
//! WEBHOOK_VERIFY_TOKEN=verify-me WEBHOOK_APP_SECRET=app-secret \
//! ADMIN_TOKEN=admin-secret \
//! cargo run -p tremp-web -- --port 8080
//! ```

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tremp::chat::Coordinator;
use tremp::config::CoordinatorConfig;
use tremp_web::{WebConfig, spawn_web};

/// WhatsApp webhook server for the tremp coordinator.
#[derive(Parser)]
#[command(about = "Conversational ride-sharing coordinator webhook server")]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Bind address.
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = CoordinatorConfig::from_env();
    if config.llm_api_key.is_empty() {
        return Err("Set LLM_API_KEY to the intent-extraction API key".to_string());
    }

    let coordinator = Arc::new(Coordinator::production(config)?);

    let bind_addr = format!("{}:{}", args.bind, args.port)
        .parse()
        .map_err(|e| format!("invalid bind address: {e}"))?;
    let addr = spawn_web(coordinator, WebConfig { bind_addr }).await;
    tracing::info!("webhook server listening on http://{addr}");

    // Serve until the process is stopped.
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to wait for ctrl-c: {e}"))?;
    tracing::info!("shutting down");
    Ok(())
}
