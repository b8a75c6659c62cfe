//! Ingress gateway
//!
//! Starts every HTTP source from a TOML config and logs the messages they
//! accept.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client request
//!        │
//!        ▼
//!   http::server ──▶ source (callbacks | endpoints | paths)
//!                        │ MessageBuilder → Authorizer
//!                        ▼
//!                  callbacks / endpoint workers / path queues
//!                        │
//!                        ▼
//!   Client reply ◀── Responder (confirm, transmit, auto-respond, timeout)
//!
//!   Transmitter ──▶ outbound HTTP ──✗──▶ RetryDelivery (disk) ──▶ sweep
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use ingress_gateway::config::load_config;
use ingress_gateway::observability::{init_logging, init_metrics};
use ingress_gateway::{Gateway, HandlerError, Message};

#[derive(Parser)]
#[command(name = "ingress-gateway")]
#[command(about = "HTTP ingress gateway with durable outbound delivery", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    init_logging(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?cli.config,
        sources = config.sources.len(),
        "ingress-gateway starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                tokio::spawn(async move {
                    if let Err(e) = init_metrics(addr).await {
                        tracing::error!(error = %e, "Metrics server failed");
                    }
                });
            }
            Err(_) => {
                tracing::error!(
                    metrics_address = %config.observability.metrics_address,
                    "Failed to parse metrics address"
                );
            }
        }
    }

    let gateway = Gateway::builder(config)
        .callback("log", |message: Arc<Message>| async move {
            tracing::info!(
                message_id = %message.id(),
                method = %message.method(),
                path = %message.path(),
                "Message received"
            );
            Ok::<(), HandlerError>(())
        })
        .start()
        .await?;

    gateway.wait().await;
    Ok(())
}
