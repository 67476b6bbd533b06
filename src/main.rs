use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

use aria_voice::config::Config;
use aria_voice::relay::{create_router, RelayState};
use aria_voice::storage::FsAudioStore;
use aria_voice::transport::Transport;

#[derive(Parser)]
#[command(name = "aria-voice", about = "Turn-taking voice session controller")]
struct Cli {
    /// Path to the configuration file, without extension
    #[arg(short, long, default_value = "config/aria-voice")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP audio-ingress relay
    Relay,
    /// Load the configuration and print the effective values
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Relay => run_relay(config).await,
        Commands::CheckConfig => {
            println!("{:#?}", config);
            Ok(())
        }
    }
}

async fn run_relay(config: Config) -> Result<()> {
    let transport = Arc::new(
        Transport::connect(&config.transport.nats_url)
            .await?
            .with_retry(
                config.transport.publish_retry_attempts,
                config.transport.publish_backoff(),
            ),
    );
    let store = Arc::new(FsAudioStore::new(&config.relay.storage_dir)?);

    let state = RelayState::new(transport, store);
    let app = create_router(state);

    let addr = format!("{}:{}", config.relay.bind, config.relay.port);
    info!("{} relay listening on {}", config.service.name, addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
