//! CLI command implementations

pub mod dictionaries;
pub mod error;
pub mod search;

pub use dictionaries::DictionariesArgs;
pub use error::CliError;
pub use search::{QueryArgs, SearchAllArgs, SearchArgs};

use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;

use crate::client::{CepikClient, ClientConfig};
use crate::downloader::config::MAX_CONCURRENT_PARTITIONS;
use crate::fetcher::cepik_http::TlsPolicy;

/// Maximum worker count; more only trips the upstream throttle sooner
const MAX_WORKERS: usize = MAX_CONCURRENT_PARTITIONS;

/// Parse and validate the worker count
fn parse_workers(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("workers must be at least 1".to_string());
    }
    if value > MAX_WORKERS {
        return Err(format!("workers {value} exceeds maximum of {MAX_WORKERS}"));
    }
    Ok(value)
}

/// Registration Data Downloader CLI
#[derive(Parser, Debug)]
#[command(name = "registration-data-downloader")]
#[command(about = "Download vehicle registration records from the CEPiK API", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "human")]
    pub output_format: OutputFormat,

    /// API base URL (default: $CEPIK_API_URL or https://api.cepik.gov.pl)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Use default TLS settings instead of accepting the server's legacy ciphers
    #[arg(long, global = true, default_value_t = false)]
    pub strict_tls: bool,

    /// Regions fetched at once by search-all (1 or 2, default: 2)
    #[arg(long, global = true, default_value = "2", value_parser = parse_workers)]
    pub workers: usize,

    /// Do not retry failed requests
    #[arg(long, global = true, default_value_t = false)]
    pub no_retry: bool,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9090)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    /// Client configuration from the global flags
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::default().with_workers(self.workers);
        if let Some(base_url) = &self.base_url {
            config = config.with_base_url(base_url.as_str());
        }
        if self.strict_tls {
            config = config.with_tls(TlsPolicy::Strict);
        }
        config
    }

    /// Build the API client
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn client(&self) -> Result<CepikClient, CliError> {
        Ok(CepikClient::new(self.client_config())?)
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch records for one region
    Search(SearchArgs),

    /// Fetch records for all (or selected) regions in parallel
    SearchAll(SearchAllArgs),

    /// List dictionary values
    Dictionaries(DictionariesArgs),

    /// List region codes and names
    Regions,
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}
