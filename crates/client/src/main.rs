//! kycwatch - watch a KYC subscription key from the terminal.

use anyhow::Context;
use clap::{Parser, Subcommand};
use kycwatch_client::{ApiClient, EventType, InboundMessage, RealtimeClient, RealtimeConfig};
use kycwatch_shared::{ExpiryAlert, KycDocument, KycStatus};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "kycwatch", version, about = "Real-time KYC notification client")]
struct Cli {
    /// Websocket base URL (overrides KYCWATCH_WS_URL)
    #[arg(long, global = true)]
    ws_url: Option<String>,

    /// REST base URL (overrides KYCWATCH_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Subscribe to a key and log every update until interrupted
    Watch { key: String },
    /// Publish an event for a key through the dev server
    Publish {
        key: String,
        event_type: EventType,
        /// JSON payload
        #[arg(default_value = "null")]
        data: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("kycwatch_client=debug,kycwatch=debug")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = RealtimeConfig::from_env().context("invalid KYCWATCH_* configuration")?;
    if let Some(ws) = cli.ws_url {
        config = config.with_ws_base(ws);
    }
    if let Some(api) = cli.api_url {
        config = config.with_api_base(api);
    }

    match cli.command {
        Command::Watch { key } => watch(config, &key).await,
        Command::Publish {
            key,
            event_type,
            data,
        } => publish(config, &key, event_type, &data).await,
    }
}

async fn watch(config: RealtimeConfig, key: &str) -> anyhow::Result<()> {
    let client = RealtimeClient::from_config(config);

    let _guards = [
        client.on_document_uploaded(|data| log_document("uploaded", data)),
        client.on_document_verified(|data| log_document("verified", data)),
        client.on_document_rejected(|data| log_document("rejected", data)),
        client.on_document_flagged(|data| log_document("flagged", data)),
        client.on_expiry_alert(|data| match serde_json::from_value::<ExpiryAlert>(data.clone()) {
            Ok(alert) => tracing::warn!(
                document = %alert.document_id,
                days = alert.days_remaining,
                "document expiring"
            ),
            Err(_) => tracing::warn!(%data, "expiry alert"),
        }),
    ];

    let mut watch = client.watch(key);
    tracing::info!(key, "watching");

    loop {
        tokio::select! {
            _ = watch.changed() => {
                let snapshot = watch.snapshot();
                if let Some(status) = snapshot.status() {
                    tracing::info!(
                        investor = %status.investor_id,
                        level = ?status.level,
                        documents = status.documents.len(),
                        "kyc status"
                    );
                }
                tracing::info!(
                    state = %snapshot.connection_state,
                    updated = ?snapshot.last_update,
                    data = ?snapshot.latest_data,
                    "snapshot"
                );
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    watch.dispose();
    client.cleanup();
    Ok(())
}

async fn publish(
    config: RealtimeConfig,
    key: &str,
    event_type: EventType,
    data: &str,
) -> anyhow::Result<()> {
    let data: Value = serde_json::from_str(data).context("payload is not valid JSON")?;
    let message = InboundMessage::new(event_type, data);
    if event_type == EventType::KycUpdate {
        let status: KycStatus = message
            .decode()
            .context("kyc_update payload is not a KYC status")?;
        tracing::debug!(investor = %status.investor_id, level = ?status.level, "publishing status");
    }

    let api = ApiClient::from_config(&config);
    let path = format!("/api/investors/{}/events", urlencoding::encode(key));
    let delivered: Value = api.post_json(&path, &message).await?;
    tracing::info!(key, %event_type, %delivered, "published");
    Ok(())
}

fn log_document(action: &str, data: &Value) {
    match serde_json::from_value::<KycDocument>(data.clone()) {
        Ok(doc) => tracing::info!(
            action,
            id = %doc.id,
            kind = %doc.document_type,
            status = ?doc.status,
            "document event"
        ),
        Err(_) => tracing::info!(action, %data, "document event"),
    }
}
