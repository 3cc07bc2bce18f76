//! Main entry point for the registration-data-downloader CLI

use clap::Parser;
use registration_data_downloader::cli::{dictionaries, Cli, Commands};
use registration_data_downloader::metrics::init_metrics;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("registration_data_downloader=info"));

    // Logs go to stderr so CSV and JSON output on stdout stay clean
    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    if let Some(addr) = cli.metrics_addr {
        init_metrics(addr)
            .await
            .map_err(|e| anyhow::anyhow!("failed to start metrics exporter: {e}"))?;
        info!(%addr, "Metrics exporter listening");
    }

    let client = cli.client()?;

    match &cli.command {
        Commands::Search(args) => args.execute(cli, &client).await?,
        Commands::SearchAll(args) => args.execute(cli, &client).await?,
        Commands::Dictionaries(args) => args.execute(cli.output_format, &client).await?,
        Commands::Regions => dictionaries::execute_regions(cli.output_format, &client).await?,
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    if let Err(e) = run(&cli).await {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }
}
