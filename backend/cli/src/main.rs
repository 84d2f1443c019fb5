mod client;
mod wiring;

use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

use crowdhealth_config::defaults::{DEFAULT_BIND, DEFAULT_LOG_LEVEL, DEFAULT_PORT, DEFAULT_REQUEST_TIMEOUT_SECS};
use crowdhealth_config::{config_dir, config_file_path, redact, CrowdHealthConfig};
use crowdhealth_core::ChatEvent;
use crowdhealth_gateway::{start_server, GatewayState};
use crowdhealth_understanding::encode_file;

use client::ApiClient;

#[derive(Parser)]
#[command(name = "crowdhealth")]
#[command(about = "Medical bill scanning, crowdfunding campaigns, and grounded campaign chat")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind the HTTP server to
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Check whether a server is running
    Status {
        #[arg(long, default_value = "http://localhost:3000")]
        url: String,
    },
    /// Send a bill photo through the OCR pipeline of a running server
    Scan {
        /// Image file to upload
        image: PathBuf,
        /// Why the patient needs help; stored on the campaign
        #[arg(short, long)]
        reason: Option<String>,
        /// Skip the structuring stage
        #[arg(long)]
        no_structure: bool,
        /// Do not save the bill or create a campaign
        #[arg(long)]
        no_persist: bool,
        #[arg(long, default_value = "http://localhost:3000")]
        url: String,
    },
    /// Ask a question about a campaign
    Ask {
        campaign_id: String,
        query: String,
        #[arg(long, default_value = "http://localhost:3000")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port } => {
            let path = config_file_path(&config_dir());
            let (config, report) = crowdhealth_config::load(&path).await?;
            let logging = config.logging();
            logging::init_logger(
                logging.dir.as_deref().map(Path::new),
                logging.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL),
            );
            report.ensure_valid()?;
            info!(path = %path.display(), config = %redacted(&config), "Configuration loaded");
            run_server(config, port).await?;
        }
        Commands::Status { url } => match ApiClient::new(&url).health().await {
            Ok(body) => println!("{}", serde_json::to_string_pretty(&body)?),
            Err(_) => println!("CrowdHealth is not running at {url}"),
        },
        Commands::Scan {
            image,
            reason,
            no_structure,
            no_persist,
            url,
        } => {
            let bytes = tokio::fs::read(&image)
                .await
                .with_context(|| format!("Failed to read {}", image.display()))?;
            let body = json!({
                "image": encode_file(&image, &bytes),
                "reason": reason,
                "structure": !no_structure,
                "persist": !no_persist,
            });
            let output = ApiClient::new(&url).scan(&body).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Ask {
            campaign_id,
            query,
            url,
        } => {
            let transcript = ApiClient::new(&url)
                .ask(&campaign_id, &query, |event| {
                    if let ChatEvent::Text(text) = event {
                        print!("{text}");
                        let _ = std::io::stdout().flush();
                    }
                })
                .await?;
            println!();
            if let Some(error) = transcript.error {
                eprintln!("error: {error}");
            } else if !transcript.completed {
                eprintln!("warning: stream ended before completion");
            }
        }
    }

    Ok(())
}

fn redacted(config: &CrowdHealthConfig) -> String {
    serde_json::to_value(config)
        .map(|value| redact(&value).to_string())
        .unwrap_or_default()
}

async fn run_server(config: CrowdHealthConfig, port: Option<u16>) -> Result<()> {
    let gateway_config = config.gateway();
    let bind = gateway_config.bind.as_deref().unwrap_or(DEFAULT_BIND);
    let port = port.or(gateway_config.port).unwrap_or(DEFAULT_PORT);
    let addr: SocketAddr = format!("{bind}:{port}")
        .parse()
        .with_context(|| format!("Invalid bind address {bind}:{port}"))?;
    let timeout = Duration::from_secs(
        gateway_config
            .request_timeout_secs
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
    );

    let inference = Arc::new(wiring::build_inference(&config.inference(), timeout));
    let store = wiring::build_store(&config.database())?;
    info!(port, bind, store = store.name(), "Starting CrowdHealth server");

    let state = GatewayState::new(inference, store).with_upload_password(gateway_config.upload_password);
    start_server(addr, state, timeout).await
}
