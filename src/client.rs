//! API client facade
//!
//! [`CepikClient`] owns the HTTP transport, the dictionary cache and the
//! batch counter, and exposes the operations a UI needs: single-region and
//! all-region searches, dictionaries, and tabular conversion.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::downloader::config::{MAX_CONCURRENT_PARTITIONS, RETRY_DELAY};
use crate::downloader::progress::{FetchObserver, ProgressSink};
use crate::downloader::{
    DownloadError, ParallelExecutor, ParallelOutcome, RateLimitConfig, RateLimitCoordinator,
    SearchParams,
};
use crate::fetcher::cepik_config::base_url_from_env;
use crate::fetcher::cepik_http::{transport_for, TlsPolicy};
use crate::fetcher::dictionary::DictionaryCache;
use crate::fetcher::pagination::PartitionFetcher;
use crate::fetcher::{FetcherError, FetcherResult, HttpTransport};
use crate::output::table::{self, TableRow};
use crate::region::RegionCode;
use crate::Record;

/// Client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// API base URL without trailing slash
    pub base_url: String,
    /// TLS policy for the reqwest transport
    pub tls: TlsPolicy,
    /// Request floor, cooldown and throttle retry budget
    pub rate_limit: RateLimitConfig,
    /// Partitions fetched at once in parallel searches
    pub workers: usize,
    /// Delay before the transport retry
    pub retry_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: base_url_from_env(),
            tls: TlsPolicy::default(),
            rate_limit: RateLimitConfig::default(),
            workers: MAX_CONCURRENT_PARTITIONS,
            retry_delay: RETRY_DELAY,
        }
    }
}

impl ClientConfig {
    /// Override the base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the TLS policy
    pub fn with_tls(mut self, tls: TlsPolicy) -> Self {
        self.tls = tls;
        self
    }

    /// Override the rate-limit timings
    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Lower the worker count, clamped to `1..=MAX_CONCURRENT_PARTITIONS`
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.clamp(1, MAX_CONCURRENT_PARTITIONS);
        self
    }

    /// Override the transport retry delay
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// Summary of a single-region search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchMeta {
    /// `meta.count` reported by the API
    pub total_count: Option<u64>,
    /// Records returned after deduplication and year filtering
    pub fetched_count: usize,
    /// Pages fetched
    pub pages_fetched: u32,
}

/// Records of a single-region search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Records tagged with `batch`
    pub records: Vec<Record>,
    /// Counts
    pub meta: SearchMeta,
    /// Batch id of this search
    pub batch: u64,
}

/// CEPiK API client
pub struct CepikClient {
    transport: Arc<dyn HttpTransport>,
    config: ClientConfig,
    dictionaries: DictionaryCache,
    batch_counter: AtomicU64,
}

impl CepikClient {
    /// Client over the transport `config.tls` selects
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> FetcherResult<Self> {
        let transport = transport_for(config.tls)?;
        Ok(Self::with_transport(transport, config))
    }

    /// Client over a caller-supplied transport
    pub fn with_transport(transport: Arc<dyn HttpTransport>, config: ClientConfig) -> Self {
        let dictionaries = DictionaryCache::new(Arc::clone(&transport), config.base_url.clone());
        Self {
            transport,
            config,
            dictionaries,
            batch_counter: AtomicU64::new(0),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Dictionary cache
    pub fn dictionaries(&self) -> &DictionaryCache {
        &self.dictionaries
    }

    fn next_batch(&self) -> u64 {
        self.batch_counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    // Each search gets its own coordinator: the gate and request floor are
    // per run.
    fn fetcher(&self, retry: bool) -> PartitionFetcher {
        let coordinator = RateLimitCoordinator::shared(self.config.rate_limit);
        PartitionFetcher::new(
            Arc::clone(&self.transport),
            self.config.base_url.clone(),
            coordinator,
        )
        .with_retry(retry)
        .with_retry_delay(self.config.retry_delay)
    }

    /// Fetch every page for the region in `params.region`
    ///
    /// # Errors
    /// Returns `Validation` before any request for bad parameters, otherwise
    /// the error that stopped pagination. Partial records are discarded.
    pub async fn search(
        &self,
        params: &SearchParams,
        on_progress: &dyn FetchObserver,
    ) -> FetcherResult<SearchResult> {
        let task = params.single_task()?;
        let outcome = self
            .fetcher(params.retry)
            .fetch(&task, on_progress)
            .await;

        if let Some(err) = outcome.error {
            return Err(err);
        }

        let batch = self.next_batch();
        let mut records = outcome.records;
        for record in &mut records {
            record.batch = Some(batch);
        }
        info!(region = %task.region, records = records.len(), batch, "Search finished");

        Ok(SearchResult {
            meta: SearchMeta {
                total_count: outcome.total_count,
                fetched_count: records.len(),
                pages_fetched: outcome.pages_fetched,
            },
            records,
            batch,
        })
    }

    /// Fetch all 16 regions in parallel
    ///
    /// `params.region` is ignored. Per-region failures are reported in the
    /// outcome, not as an error.
    ///
    /// # Errors
    /// Returns `Validation` for bad parameters, before any request.
    pub async fn search_all_parallel(
        &self,
        params: &SearchParams,
        sink: &dyn ProgressSink,
    ) -> Result<ParallelOutcome, DownloadError> {
        self.search_regions_parallel(params, &RegionCode::all(), sink)
            .await
    }

    /// Fetch a subset of regions in parallel
    ///
    /// # Errors
    /// Returns `Validation` for an empty subset or bad parameters.
    pub async fn search_regions_parallel(
        &self,
        params: &SearchParams,
        regions: &[RegionCode],
        sink: &dyn ProgressSink,
    ) -> Result<ParallelOutcome, DownloadError> {
        if regions.is_empty() {
            return Err(DownloadError::Validation("no regions selected".into()));
        }
        let tasks = params.tasks_for(regions).map_err(|e| match e {
            FetcherError::Validation(message) => DownloadError::Validation(message),
            other => DownloadError::Fetcher(other),
        })?;

        let batch = self.next_batch();
        let outcome = ParallelExecutor::new(self.fetcher(params.retry))
            .with_workers(self.config.workers)
            .with_batch(batch)
            .fetch_all(tasks, sink)
            .await;
        Ok(outcome)
    }

    /// Flatten records into table rows
    pub fn to_table(&self, records: &[Record]) -> Vec<TableRow> {
        table::to_table(records)
    }

    /// Distinct brands in `records`
    pub fn brands_in(&self, records: &[Record]) -> Vec<String> {
        table::brands_in(records)
    }

    /// Distinct models in `records`, optionally for one brand
    pub fn models_in(&self, records: &[Record], brand: Option<&str>) -> Vec<String> {
        table::models_in(records, brand)
    }

    /// See [`DictionaryCache::get_dictionary`]
    pub async fn get_dictionary(&self, name: &str) -> Vec<String> {
        self.dictionaries.get_dictionary(name).await
    }

    /// See [`DictionaryCache::get_all_dictionaries`]
    pub async fn get_all_dictionaries(&self) -> BTreeMap<String, Vec<String>> {
        self.dictionaries.get_all_dictionaries().await
    }

    /// See [`DictionaryCache::get_regions`]
    pub async fn get_regions(&self) -> Vec<(String, String)> {
        self.dictionaries.get_regions().await
    }
}

/// Records accumulated over successive searches
///
/// Appending skips ids already present, so the first batch to deliver a
/// record keeps it.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    records: Vec<Record>,
    ids: HashSet<String>,
}

impl ResultSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch, returning how many records were new
    pub fn append(&mut self, records: impl IntoIterator<Item = Record>) -> usize {
        let before = self.records.len();
        for record in records {
            if self.ids.insert(record.id.clone()) {
                self.records.push(record);
            }
        }
        self.records.len() - before
    }

    /// Replace the contents with a batch
    pub fn replace(&mut self, records: impl IntoIterator<Item = Record>) -> usize {
        self.clear();
        self.append(records)
    }

    /// All records in arrival order
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Batch ids present
    pub fn batches(&self) -> BTreeSet<u64> {
        self.records.iter().filter_map(|r| r.batch).collect()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// No records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.records.clear();
        self.ids.clear();
    }

    /// Take the records
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}
