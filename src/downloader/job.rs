//! Search parameters, partition tasks and per-partition status

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::fetcher::cepik_config::{
    filter_param, API_DATE_FORMAT, ATTR_BRAND, ATTR_MODEL, PAGE_LIMIT, PARAM_DATE_FROM,
    PARAM_DATE_TO, PARAM_LIMIT, PARAM_PAGE, PARAM_REGION,
};
use crate::fetcher::{FetcherError, FetcherResult};
use crate::region::RegionCode;
use crate::Record;

/// Caller-facing search query
///
/// Built with the `with_*` methods and turned into one [`PartitionTask`] per
/// region. String filters are upper-cased when sent.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    /// Region code, required for single-partition searches
    pub region: Option<String>,
    /// First registration date (inclusive)
    pub date_from: Option<NaiveDate>,
    /// Last registration date (inclusive)
    pub date_to: Option<NaiveDate>,
    /// Brand filter
    pub brand: Option<String>,
    /// Model filter
    pub model: Option<String>,
    /// Lowest production year kept
    pub year_from: Option<i32>,
    /// Highest production year kept
    pub year_to: Option<i32>,
    /// Additional `filter[<key>]` parameters
    pub extra_filters: BTreeMap<String, String>,
    /// Retry transport failures once
    pub retry: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            region: None,
            date_from: None,
            date_to: None,
            brand: None,
            model: None,
            year_from: None,
            year_to: None,
            extra_filters: BTreeMap::new(),
            retry: true,
        }
    }
}

impl SearchParams {
    /// Empty query with retry enabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one region
    pub fn with_region(mut self, code: impl Into<String>) -> Self {
        self.region = Some(code.into());
        self
    }

    /// Set both ends of the registration date range
    pub fn with_date_range(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.date_from = Some(from);
        self.date_to = Some(to);
        self
    }

    /// Filter by brand
    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    /// Filter by model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Keep only records produced in `[from, to]`; either end may be open
    pub fn with_years(mut self, from: Option<i32>, to: Option<i32>) -> Self {
        self.year_from = from;
        self.year_to = to;
        self
    }

    /// Add a `filter[<key>]` parameter
    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_filters.insert(key.into(), value.into());
        self
    }

    /// Enable or disable the single transport retry
    pub fn with_retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    /// Validate the date range and year bounds
    ///
    /// # Errors
    /// Returns `Validation` if a date is missing, `date_from > date_to`,
    /// or `year_from > year_to`.
    pub fn validate(&self) -> FetcherResult<DateRange> {
        let (from, to) = match (self.date_from, self.date_to) {
            (Some(from), Some(to)) => (from, to),
            _ => {
                return Err(FetcherError::Validation(
                    "both date_from and date_to are required".into(),
                ))
            }
        };
        if from > to {
            return Err(FetcherError::Validation(format!(
                "date_from ({from}) is after date_to ({to})"
            )));
        }
        if let (Some(lo), Some(hi)) = (self.year_from, self.year_to) {
            if lo > hi {
                return Err(FetcherError::Validation(format!(
                    "year_from ({lo}) is after year_to ({hi})"
                )));
            }
        }
        Ok(DateRange { from, to })
    }

    /// Task for the configured single region
    ///
    /// # Errors
    /// Returns `Validation` if no region is set, the code is unknown,
    /// or [`validate`](Self::validate) fails.
    pub fn single_task(&self) -> FetcherResult<PartitionTask> {
        let code = self
            .region
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| FetcherError::Validation("region is required".into()))?;
        let region =
            RegionCode::parse(code).map_err(|e| FetcherError::Validation(e.to_string()))?;
        self.task_for(region)
    }

    /// One task per region, in the given order
    ///
    /// # Errors
    /// Returns `Validation` if [`validate`](Self::validate) fails.
    pub fn tasks_for(&self, regions: &[RegionCode]) -> FetcherResult<Vec<PartitionTask>> {
        regions.iter().map(|r| self.task_for(r.clone())).collect()
    }

    fn task_for(&self, region: RegionCode) -> FetcherResult<PartitionTask> {
        let date_range = self.validate()?;
        Ok(PartitionTask {
            region,
            date_range,
            brand: non_empty(self.brand.as_deref()),
            model: non_empty(self.model.as_deref()),
            year_range: YearRange {
                from: self.year_from,
                to: self.year_to,
            },
            extra_filters: self
                .extra_filters
                .iter()
                .filter(|(k, v)| !k.trim().is_empty() && !v.trim().is_empty())
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .collect(),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Inclusive registration date range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    /// First day
    pub from: NaiveDate,
    /// Last day
    pub to: NaiveDate,
}

impl DateRange {
    /// `data-od` value (`YYYYMMDD`)
    pub fn api_from(&self) -> String {
        self.from.format(API_DATE_FORMAT).to_string()
    }

    /// `data-do` value (`YYYYMMDD`)
    pub fn api_to(&self) -> String {
        self.to.format(API_DATE_FORMAT).to_string()
    }
}

/// Inclusive production year bounds, either end optional
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct YearRange {
    /// Lower bound
    pub from: Option<i32>,
    /// Upper bound
    pub to: Option<i32>,
}

impl YearRange {
    /// At least one bound is set
    pub fn is_active(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }

    /// Whether a record passes the year post-filter
    ///
    /// With no bounds everything passes. With a bound, records without a
    /// numeric production year are rejected.
    pub fn admits(&self, record: &Record) -> bool {
        if !self.is_active() {
            return true;
        }
        let Some(year) = record.production_year() else {
            return false;
        };
        self.from.map_or(true, |lo| year >= i64::from(lo))
            && self.to.map_or(true, |hi| year <= i64::from(hi))
    }
}

/// One partition's share of a search
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionTask {
    /// Region queried
    pub region: RegionCode,
    /// Registration dates
    pub date_range: DateRange,
    /// Brand filter
    pub brand: Option<String>,
    /// Model filter
    pub model: Option<String>,
    /// Production year post-filter
    pub year_range: YearRange,
    /// Additional filters
    pub extra_filters: BTreeMap<String, String>,
}

impl PartitionTask {
    /// Query parameters for `page`
    pub fn query_params(&self, page: u32) -> Vec<(String, String)> {
        let mut params = vec![
            (PARAM_REGION.to_string(), self.region.code().to_string()),
            (PARAM_DATE_FROM.to_string(), self.date_range.api_from()),
            (PARAM_DATE_TO.to_string(), self.date_range.api_to()),
            (PARAM_LIMIT.to_string(), PAGE_LIMIT.to_string()),
            (PARAM_PAGE.to_string(), page.to_string()),
        ];
        if let Some(brand) = &self.brand {
            params.push((filter_param(ATTR_BRAND), brand.to_uppercase()));
        }
        if let Some(model) = &self.model {
            params.push((filter_param(ATTR_MODEL), model.to_uppercase()));
        }
        for (key, value) in &self.extra_filters {
            if key == ATTR_BRAND || key == ATTR_MODEL {
                continue;
            }
            params.push((filter_param(key), value.to_uppercase()));
        }
        params
    }
}

/// Lifecycle state of a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionState {
    /// Not started
    Waiting,
    /// Started, first page in flight
    Fetching,
    /// Page `n` received
    Page(u32),
    /// Held by another partition's throttle incident
    Paused,
    /// This partition observed the throttle and is cooling down
    RateLimited,
    /// Cooldown over, retrying
    Resuming,
    /// Finished without error
    Completed,
    /// Finished with an error
    Failed,
}

impl PartitionState {
    /// `Completed` or `Failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for PartitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Fetching => write!(f, "fetching"),
            Self::Page(n) => write!(f, "page {n}"),
            Self::Paused => write!(f, "paused"),
            Self::RateLimited => write!(f, "rate limited"),
            Self::Resuming => write!(f, "resuming"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Progress of one partition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionStatus {
    /// Region code
    pub code: String,
    /// Region display name
    pub name: String,
    /// Current state
    pub state: PartitionState,
    /// Records fetched so far
    pub records_fetched: usize,
    /// Pages fetched so far
    pub pages_fetched: u32,
    /// Total reported by the API
    pub total_count: Option<u64>,
    /// Failure message
    pub error: Option<String>,
    /// Time since the partition started
    pub elapsed: Duration,
    #[serde(skip)]
    started: Option<Instant>,
}

impl PartitionStatus {
    /// Fresh `Waiting` status
    pub fn waiting(region: &RegionCode) -> Self {
        Self {
            code: region.code().to_string(),
            name: region.name().to_string(),
            state: PartitionState::Waiting,
            records_fetched: 0,
            pages_fetched: 0,
            total_count: None,
            error: None,
            elapsed: Duration::ZERO,
            started: None,
        }
    }

    /// Record the start instant and move to `Fetching`
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
        self.state = PartitionState::Fetching;
    }

    /// Leave `Paused` for the state the partition was in before the pause
    pub fn unpause(&mut self) {
        if self.state != PartitionState::Paused {
            return;
        }
        self.state = match (self.started, self.pages_fetched) {
            (None, _) => PartitionState::Waiting,
            (Some(_), 0) => PartitionState::Fetching,
            (Some(_), page) => PartitionState::Page(page),
        };
    }

    /// Refresh `elapsed` from the start instant
    pub fn touch(&mut self) {
        if let Some(started) = self.started {
            self.elapsed = started.elapsed();
        }
    }
}

/// Result of fetching one partition
///
/// Records fetched before a failure are kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOutcome {
    /// Deduplicated, year-filtered records
    pub records: Vec<Record>,
    /// `meta.count` from the last page that reported it
    pub total_count: Option<u64>,
    /// Pages successfully fetched
    pub pages_fetched: u32,
    /// Error that stopped pagination
    pub error: Option<FetcherError>,
}

impl FetchOutcome {
    /// Finished without error
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate result of a parallel run
#[derive(Debug, Clone, Default)]
pub struct ParallelOutcome {
    /// Records deduplicated across all partitions
    pub records: Vec<Record>,
    /// `"<name>: <message>"` for each failed partition
    pub errors: Vec<String>,
    /// Final status per region code
    pub statuses: BTreeMap<String, PartitionStatus>,
    /// Batch id the records are tagged with
    pub batch: u64,
}

impl ParallelOutcome {
    /// At least one partition failed
    pub fn is_partial_failure(&self) -> bool {
        !self.errors.is_empty()
    }
}
