//! Parallel download orchestration and rate limiting
//!
//! # Overview
//!
//! A search over all regions runs as follows:
//!
//! 1. **Tasks**: [`job::SearchParams`] is validated and split into one
//!    [`job::PartitionTask`] per region
//! 2. **Execution**: [`executor::ParallelExecutor`] runs the tasks two at a time
//! 3. **Rate Limiting**: every request passes the shared
//!    [`rate_limit::RateLimitCoordinator`] (request floor plus throttle gate)
//! 4. **Progress**: per-partition [`job::PartitionStatus`] entries are copied
//!    into [`progress::ProgressSnapshot`]s for the caller's sink
//!
//! # Quick Start
//!
//! ```no_run
//! use registration_data_downloader::downloader::{
//!     ParallelExecutor, RateLimitConfig, RateLimitCoordinator, SearchParams,
//! };
//! use registration_data_downloader::downloader::progress::NoProgress;
//! use registration_data_downloader::fetcher::cepik_http::{transport_for, TlsPolicy};
//! use registration_data_downloader::fetcher::pagination::PartitionFetcher;
//! use registration_data_downloader::region::RegionCode;
//! use chrono::NaiveDate;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = transport_for(TlsPolicy::Legacy)?;
//! let coordinator = RateLimitCoordinator::shared(RateLimitConfig::default());
//! let fetcher = PartitionFetcher::new(transport, "https://api.cepik.gov.pl", coordinator);
//!
//! let params = SearchParams::new().with_date_range(
//!     NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
//!     NaiveDate::from_ymd_opt(2024, 3, 7).unwrap(),
//! );
//! let tasks = params.tasks_for(&RegionCode::all())?;
//!
//! let outcome = ParallelExecutor::new(fetcher).fetch_all(tasks, &NoProgress).await;
//! println!("{} records", outcome.records.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Components
//!
//! - [`executor`] - Bounded pool, merge and snapshot emission
//! - [`job`] - Search parameters, tasks, statuses and outcomes
//! - [`progress`] - Observer and sink traits, status board
//! - [`rate_limit`] - Shared gate and request floor
//! - [`config`] - Timing constants

pub mod config;
pub mod executor;
pub mod job;
pub mod progress;
pub mod rate_limit;

pub use config::RateLimitConfig;
pub use executor::ParallelExecutor;
pub use job::{
    FetchOutcome, ParallelOutcome, PartitionState, PartitionStatus, PartitionTask, SearchParams,
};
pub use rate_limit::{RateLimitCoordinator, Slot, ThrottleSignal};

use crate::fetcher::FetcherError;

/// Download errors
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Run rejected before any request
    #[error("validation error: {0}")]
    Validation(String),

    /// Fetcher-level failure surfaced to the caller
    #[error(transparent)]
    Fetcher(#[from] FetcherError),
}
