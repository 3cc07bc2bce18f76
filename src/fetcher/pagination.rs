//! Paginated retrieval of one partition
//!
//! [`PartitionFetcher`] walks `/pojazdy` page by page for a single
//! [`PartitionTask`]. Every request goes through the shared
//! [`RateLimitCoordinator`], so the request floor and throttle gate hold
//! across all partitions of a run.
//!
//! Safety mechanisms:
//! - Page cap ([`MAX_PAGES`]) against a `links.next` that never ends
//! - One transport retry per request when enabled
//! - A bounded number of throttle retries per page

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::downloader::config::RETRY_DELAY;
use crate::downloader::job::{FetchOutcome, PartitionTask};
use crate::downloader::progress::FetchObserver;
use crate::downloader::rate_limit::{RateLimitCoordinator, Slot, ThrottleSignal};
use crate::fetcher::cepik_config::{MAX_PAGES, RECORDS_TIMEOUT, VEHICLES_ENDPOINT};
use crate::fetcher::cepik_parser::{ApiPage, CepikParser};
use crate::fetcher::{status_error, FetcherError, FetcherResult, HttpResponse, HttpTransport};
use crate::metrics::{self, RequestMetrics};

/// Fetches every page of one partition
pub struct PartitionFetcher {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    coordinator: Arc<RateLimitCoordinator>,
    retry: bool,
    retry_delay: Duration,
    max_pages: u32,
}

impl PartitionFetcher {
    /// Fetcher against `base_url` sharing `coordinator` with its siblings
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        base_url: impl Into<String>,
        coordinator: Arc<RateLimitCoordinator>,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            coordinator,
            retry: true,
            retry_delay: RETRY_DELAY,
            max_pages: MAX_PAGES,
        }
    }

    /// Enable or disable the single transport retry
    pub fn with_retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    /// Delay before the transport retry
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Override the page cap
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Fetch all pages of `task`
    ///
    /// Never fails as a whole: an error stops pagination and is returned in
    /// the outcome next to the records fetched before it. Records are
    /// deduplicated by id and then passed through the year post-filter.
    pub async fn fetch(&self, task: &PartitionTask, observer: &dyn FetchObserver) -> FetchOutcome {
        let span = info_span!("partition", region = task.region.code());
        self.fetch_pages(task, observer).instrument(span).await
    }

    async fn fetch_pages(&self, task: &PartitionTask, observer: &dyn FetchObserver) -> FetchOutcome {
        info!(
            region = %task.region,
            from = %task.date_range.from,
            to = %task.date_range.to,
            "Starting partition fetch"
        );
        observer.on_started();

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        let mut total_count = None;
        let mut pages_fetched = 0;
        let mut error = None;
        let mut page = 1;

        loop {
            if page > self.max_pages {
                warn!(max_pages = self.max_pages, "Page cap reached, stopping");
                error = Some(FetcherError::PageLimit(self.max_pages));
                break;
            }

            let api_page = match self.fetch_page(task, page, observer).await {
                Ok(api_page) => api_page,
                Err(e) => {
                    warn!(page, error = %e, "Page fetch failed, keeping {} records", records.len());
                    error = Some(e);
                    break;
                }
            };

            pages_fetched = page;
            if api_page.total_count.is_some() {
                total_count = api_page.total_count;
            }

            let received = api_page.records.len();
            for record in api_page.records {
                if seen.insert(record.id.clone()) {
                    records.push(record);
                }
            }
            debug!(page, received, unique = records.len(), "Page merged");
            observer.on_page(page, total_count, records.len());

            if !api_page.has_next {
                break;
            }
            page += 1;
        }

        let unique = records.len();
        records.retain(|r| task.year_range.admits(r));
        if records.len() != unique {
            debug!(
                dropped = unique - records.len(),
                "Year filter removed records"
            );
        }

        info!(
            pages = pages_fetched,
            records = records.len(),
            failed = error.is_some(),
            "Partition fetch finished"
        );

        FetchOutcome {
            records,
            total_count,
            pages_fetched,
            error,
        }
    }

    /// Fetch and parse one page, riding out throttle incidents
    ///
    /// # Errors
    /// Transport, TLS and HTTP failures after the retry policy, parse
    /// failures, or `RateLimitExceeded` once the throttle budget is spent.
    pub async fn fetch_page(
        &self,
        task: &PartitionTask,
        page: u32,
        observer: &dyn FetchObserver,
    ) -> FetcherResult<ApiPage> {
        let url = format!("{}{}", self.base_url, VEHICLES_ENDPOINT);
        let params = task.query_params(page);
        let partition = task.region.code();
        let max_throttles = self.coordinator.config().max_retries;
        let mut throttled = 0;

        loop {
            let (slot, response) = self.request_with_retry(&url, &params, partition).await?;

            if let Some(signal) = ThrottleSignal::detect(&response) {
                throttled += 1;
                if throttled > max_throttles {
                    return Err(FetcherError::RateLimitExceeded {
                        attempts: throttled,
                    });
                }
                self.coordinator
                    .handle_throttle(signal, slot, partition, observer)
                    .await;
                continue;
            }

            self.coordinator.check_quota(&response, partition);
            if !response.is_success() {
                return Err(status_error(&response));
            }
            return CepikParser::parse_page(&response.json()?);
        }
    }

    /// One request, repeated once after `retry_delay` on a retryable failure
    ///
    /// If the repeat fails too, the first error is returned.
    async fn request_with_retry(
        &self,
        url: &str,
        params: &[(String, String)],
        partition: &str,
    ) -> FetcherResult<(Slot, HttpResponse)> {
        match self.send(url, params, partition).await {
            Err(err) if self.retry && err.is_retryable() => {
                warn!(
                    error = %err,
                    delay_ms = self.retry_delay.as_millis(),
                    "Request failed, retrying once"
                );
                metrics::record_retry(partition, self.retry_delay);
                sleep(self.retry_delay).await;
                self.send(url, params, partition).await.map_err(|retry_err| {
                    debug!(error = %retry_err, "Retry failed as well");
                    err
                })
            }
            other => other,
        }
    }

    /// Wait for a slot and issue one request; 5xx other than 503 become errors
    async fn send(
        &self,
        url: &str,
        params: &[(String, String)],
        partition: &str,
    ) -> FetcherResult<(Slot, HttpResponse)> {
        let slot = self.coordinator.acquire_slot().await;

        let request = RequestMetrics::start(VEHICLES_ENDPOINT, partition);
        match self.transport.get(url, params, RECORDS_TIMEOUT).await {
            Ok(response) => {
                request.record_complete(response.status);
                if response.status >= 500 && ThrottleSignal::detect(&response).is_none() {
                    Err(status_error(&response))
                } else {
                    Ok((slot, response))
                }
            }
            Err(e) => {
                request.record_transport_error(&e.to_string());
                Err(e)
            }
        }
    }
}
