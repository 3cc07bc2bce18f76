//! # Registration Data Downloader Library
//!
//! A library for downloading vehicle registration records from the public
//! CEPiK REST API. The API is paginated, rate-limited and sharded by region,
//! so the library focuses on fetching all 16 regions concurrently without
//! tripping the upstream throttle.
//!
//! ## Features
//!
//! - **Parallel Fetch**: One partition per region, bounded to a small worker pool
//! - **Shared Rate Limiting**: A process-wide gate pauses every fetcher when the
//!   API signals throttling, plus a minimum interval between any two requests
//! - **Deduplication**: Records are merged by identifier across all partitions
//! - **Progress Snapshots**: Consistent per-partition status copies streamed to a sink
//! - **Dictionaries**: Cached enumerated value lists (brands, fuel types, regions)
//! - **Tabular Output**: Flattened rows with region names and numeric coercion
//!
//! ## Quick Start
//!
//! ```no_run
//! use registration_data_downloader::client::{CepikClient, ClientConfig};
//! use registration_data_downloader::downloader::{SearchParams, progress::NoProgress};
//! use chrono::NaiveDate;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CepikClient::new(ClientConfig::default())?;
//!
//! let params = SearchParams::new()
//!     .with_date_range(
//!         NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!         NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
//!     )
//!     .with_brand("toyota");
//!
//! let outcome = client.search_all_parallel(&params, &NoProgress).await?;
//! let rows = client.to_table(&outcome.records);
//! println!("{} rows, {} failed regions", rows.len(), outcome.errors.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`region`] - The 16 region codes used as partitions
//! - [`fetcher`] - HTTP transport, response parsing, pagination, dictionaries
//! - [`downloader`] - Rate-limit coordination and the parallel executor
//! - [`output`] - Table normalization and CSV export
//! - [`client`] - Facade tying the pieces together for UI callers
//! - [`metrics`] - Request and throttle counters

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// CLI command implementations
pub mod cli;

/// API client facade
pub mod client;

/// Parallel download orchestration
pub mod downloader;

/// HTTP transport, parsing and pagination
pub mod fetcher;

/// Observability metrics
pub mod metrics;

/// Tabular output and CSV export
pub mod output;

/// Region codes and names
pub mod region;

pub use client::{CepikClient, ClientConfig};
pub use region::RegionCode;

/// A single vehicle record as returned by the `/pojazdy` endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    /// Unique record identifier
    pub id: String,
    /// Raw attribute map (brand, model, production year, ...)
    pub attributes: Map<String, Value>,
    /// Batch tag of the search run that produced this record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<u64>,
}

impl Record {
    /// Create a record without a batch tag
    pub fn new(id: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            attributes,
            batch: None,
        }
    }

    /// Attribute rendered as text; numbers are formatted, null and
    /// nested values yield `None`.
    pub fn attribute_text(&self, key: &str) -> Option<String> {
        match self.attributes.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Production year (`rok-produkcji`) as an integer
    ///
    /// Returns `None` when the attribute is missing or not an integer,
    /// whether it arrives as a JSON number or a numeric string.
    pub fn production_year(&self) -> Option<i64> {
        match self.attributes.get(fetcher::cepik_config::ATTR_PRODUCTION_YEAR)? {
            Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.is_finite())
                    .map(|f| f as i64)
            }),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }
}
