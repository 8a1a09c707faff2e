//! Streaming relay
//!
//! `serve` runs the JSON-lines streaming server (axum or bare hyper);
//! `relay` runs the reverse proxy meant to sit in front of it.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;

use streaming_relay::config::validation::validate_config;
use streaming_relay::config::{load_or_default, AdapterKind, AppConfig, ConfigError};
use streaming_relay::lifecycle::{signals, Shutdown};
use streaming_relay::net::Listener;
use streaming_relay::observability::{logging, metrics};
use streaming_relay::pong::pong_source;
use streaming_relay::{HttpServer, RawServer, RelayServer, Streamer};

#[derive(Parser)]
#[command(name = "streaming-relay")]
#[command(about = "JSON-lines streaming server and relay", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the record stream
    Serve {
        /// HTTP adapter to serve with
        #[arg(long, value_enum)]
        adapter: Option<AdapterKind>,

        /// Bind address, overriding listener.bind_address
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run the reverse proxy
    Relay {
        /// Upstream base URL, overriding relay.upstream
        #[arg(long)]
        upstream: Option<String>,

        /// Bind address, overriding relay.bind_address
        #[arg(long)]
        bind: Option<String>,
    },
}

impl Command {
    fn apply(&self, config: &mut AppConfig) {
        match self {
            Command::Serve { adapter, bind } => {
                if let Some(adapter) = adapter {
                    config.streaming.adapter = *adapter;
                }
                if let Some(bind) = bind {
                    config.listener.bind_address = bind.clone();
                }
            }
            Command::Relay { upstream, bind } => {
                if let Some(upstream) = upstream {
                    config.relay.upstream = upstream.clone();
                }
                if let Some(bind) = bind {
                    config.relay.bind_address = bind.clone();
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_or_default(cli.config.as_deref())?;
    cli.command.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "streaming-relay starting");

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    match cli.command {
        Command::Serve { .. } => serve(&config, &shutdown).await?,
        Command::Relay { .. } => relay(&config, &shutdown).await?,
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn serve(config: &AppConfig, shutdown: &Shutdown) -> Result<(), Box<dyn std::error::Error>> {
    let streamer =
        Streamer::new(shutdown.subscribe()).with_record_mirror(config.streaming.mirror_records);

    tracing::info!(
        adapter = ?config.streaming.adapter,
        bind_address = %config.listener.bind_address,
        stream_path = %config.streaming.path,
        mirror_records = config.streaming.mirror_records,
        "Configuration loaded"
    );

    match config.streaming.adapter {
        AdapterKind::Axum => {
            let listener = TcpListener::bind(&config.listener.bind_address).await?;
            HttpServer::new(config, streamer, pong_source())
                .run(listener)
                .await?;
        }
        AdapterKind::Hyper => {
            let listener = Listener::bind(&config.listener).await?;
            RawServer::new(config, streamer, pong_source())
                .run(listener)
                .await?;
        }
    }
    Ok(())
}

async fn relay(config: &AppConfig, shutdown: &Shutdown) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        bind_address = %config.relay.bind_address,
        upstream = %config.relay.upstream,
        prefix = %config.relay.prefix,
        strip_prefix = config.relay.strip_prefix,
        "Configuration loaded"
    );

    let server = RelayServer::new(config, shutdown.token())?;
    let listener = TcpListener::bind(&config.relay.bind_address).await?;
    server.run(listener).await?;
    Ok(())
}
