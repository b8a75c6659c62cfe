use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::Value;

use ingress_gateway::config::{load_config, GatewayConfig, SourceConfig};
use ingress_gateway::resilience::{RetryDelivery, ALL_RECORDS};
use ingress_gateway::source::transmit::perform_transmission;
use ingress_gateway::{TransmitOptions, Transmitter};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Inspect and drive the ingress gateway's retry stores", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List records waiting for redelivery
    Pending {
        /// Only this source
        #[arg(short, long)]
        source: Option<String>,
    },
    /// Run one redelivery sweep now
    Resend {
        #[arg(short, long)]
        source: String,
        /// Only this message id
        #[arg(short, long)]
        id: Option<String>,
    },
    /// Transmit a JSON payload through a source's outbound destination
    Send {
        #[arg(short, long)]
        source: String,
        /// JSON document; plain strings are sent as-is
        payload: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Pending { source } => {
            for source in config
                .sources
                .iter()
                .filter(|s| source.as_deref().map_or(true, |name| name == s.name))
            {
                let retry = retry_store(&config, source)?;
                let pending = retry.pending()?;
                println!("{} ({} pending)", source.name, pending.len());
                for path in pending {
                    println!("  {}", path.display());
                }
            }
        }
        Commands::Resend { source, id } => {
            let source = find_source(&config, &source)?;
            let retry = retry_store(&config, source)?;
            if !retry.attempt_redelivery(id.as_deref().unwrap_or(ALL_RECORDS)).await {
                return Err(format!("{}: another redelivery sweep is running", source.name).into());
            }
            let remaining = retry.pending()?.len();
            match id {
                Some(id) if retry.record_path(&id).exists() => {
                    println!("{}: {id} still pending ({remaining} pending)", source.name)
                }
                Some(id) => println!("{}: {id} delivered ({remaining} pending)", source.name),
                None => println!("{}: sweep finished ({remaining} still pending)", source.name),
            }
        }
        Commands::Send { source, payload } => {
            let source = find_source(&config, &source)?;
            let retry = Arc::new(retry_store(&config, source)?);
            let transmitter = Transmitter::new(source, retry.clone());
            let value: Value = serde_json::from_str(&payload).unwrap_or(Value::String(payload));

            let record = transmitter.outbound_record(&value, &TransmitOptions::default())?;
            let id = record.message_id.clone();
            let delivered = perform_transmission(retry.clone(), record).await?;
            let outcome = if delivered || !retry.record_path(&id).exists() {
                "delivered"
            } else {
                "queued for redelivery"
            };
            println!("{id}: {outcome}");
        }
    }

    Ok(())
}

fn find_source<'a>(config: &'a GatewayConfig, name: &str) -> Result<&'a SourceConfig, Box<dyn std::error::Error>> {
    config
        .sources
        .iter()
        .find(|s| s.name == name)
        .ok_or_else(|| format!("no source named `{name}`").into())
}

fn retry_store(config: &GatewayConfig, source: &SourceConfig) -> Result<RetryDelivery, Box<dyn std::error::Error>> {
    Ok(RetryDelivery::new(
        source.retry_path(),
        config.retries.clone(),
        Duration::from_secs(config.timeouts.outbound_secs),
    )?)
}
