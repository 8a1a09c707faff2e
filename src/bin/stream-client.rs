use clap::Parser;
use futures_util::StreamExt;
use serde_json::Value;

use streaming_relay::client::StreamClient;

#[derive(Parser)]
#[command(name = "stream-client")]
#[command(about = "Subscribe to a JSON-lines stream and log every record", long_about = None)]
struct Cli {
    /// Stream URL
    #[arg(short, long, default_value = "http://localhost:9000/api/ping")]
    url: String,

    /// How fast to get updates
    #[arg(short, long, default_value = "100ms")]
    interval: String,

    /// Stop after this many records
    #[arg(short, long)]
    limit: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stream_client=info,streaming_relay=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let client = StreamClient::new();
    let records = client
        .subscribe::<Value>(&cli.url, Some(&cli.interval))
        .await?;

    let mut records = match cli.limit {
        Some(limit) => records.take(limit).boxed(),
        None => records,
    };

    let mut received = 0usize;
    while let Some(record) = records.next().await {
        let record = record?;
        received += 1;
        tracing::info!(seq = received, record = %serde_json::to_string(&record)?, "Record");
    }

    tracing::info!(records = received, "Stream ended");
    Ok(())
}
