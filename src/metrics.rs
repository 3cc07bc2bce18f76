//! Observability metrics for the registration downloader
//!
//! Counts requests, throttle incidents, retries and partition outcomes with
//! the `metrics` facade. Nothing is recorded until [`init_metrics`] installs
//! the Prometheus exporter; before that every macro is a no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Correlation ID source for request tracing
static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Install the Prometheus exporter and register metric descriptions
///
/// Idempotent: later calls return `Ok(())` without rebinding.
///
/// # Errors
/// Returns an error if the exporter cannot bind `addr`.
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!(%addr, "Initializing metrics exporter");

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "cepik_requests_total",
        Unit::Count,
        "HTTP requests sent to the CEPiK API"
    );
    describe_histogram!(
        "cepik_request_duration_seconds",
        Unit::Seconds,
        "CEPiK request duration"
    );
    describe_counter!(
        "cepik_rate_limit_incidents_total",
        Unit::Count,
        "Throttle incidents that closed the shared gate"
    );
    describe_histogram!(
        "cepik_gate_wait_seconds",
        Unit::Seconds,
        "Time a fetcher spent waiting for the gate or the request floor"
    );
    describe_counter!(
        "cepik_retries_total",
        Unit::Count,
        "Transport retries"
    );
    describe_counter!(
        "cepik_partitions_completed_total",
        Unit::Count,
        "Partitions that finished without error"
    );
    describe_counter!(
        "cepik_partitions_failed_total",
        Unit::Count,
        "Partitions that finished with an error"
    );

    *initialized = true;
    info!(%addr, "Metrics exporter ready");
    Ok(())
}

/// Whether [`init_metrics`] has completed
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}

/// Next correlation ID (`req-0000002a`)
pub fn next_correlation_id() -> String {
    let id = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{id:08x}")
}

/// Timing and outcome of one HTTP request
pub struct RequestMetrics {
    endpoint: String,
    partition: String,
    start_time: Instant,
    correlation_id: String,
}

impl RequestMetrics {
    /// Start timing a request
    pub fn start(endpoint: impl Into<String>, partition: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            partition: partition.into(),
            start_time: Instant::now(),
            correlation_id: next_correlation_id(),
        }
    }

    /// Record a response with its status code
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "cepik_requests_total",
            "endpoint" => self.endpoint.clone(),
            "status" => status_code.to_string(),
        )
        .increment(1);
        histogram!(
            "cepik_request_duration_seconds",
            "endpoint" => self.endpoint.clone(),
        )
        .record(duration.as_secs_f64());

        debug!(
            correlation_id = %self.correlation_id,
            endpoint = %self.endpoint,
            partition = %self.partition,
            status = status_code,
            duration_ms = duration.as_millis(),
            "Request completed"
        );
    }

    /// Record a request that produced no response
    pub fn record_transport_error(&self, error: &str) {
        let duration = self.start_time.elapsed();

        counter!(
            "cepik_requests_total",
            "endpoint" => self.endpoint.clone(),
            "status" => "transport_error",
        )
        .increment(1);

        warn!(
            correlation_id = %self.correlation_id,
            endpoint = %self.endpoint,
            partition = %self.partition,
            duration_ms = duration.as_millis(),
            error = %error,
            "Request failed without a response"
        );
    }

    /// Correlation ID of this request
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record a transport retry
pub fn record_retry(partition: &str, delay: Duration) {
    counter!("cepik_retries_total", "partition" => partition.to_string()).increment(1);
    debug!(partition, delay_ms = delay.as_millis(), "Retry recorded");
}

/// Record a throttle incident that closed the gate
pub fn record_rate_limit_incident(partition: &str) {
    counter!(
        "cepik_rate_limit_incidents_total",
        "partition" => partition.to_string(),
    )
    .increment(1);
}

/// Record time spent before a request slot was granted
pub fn record_gate_wait(wait: Duration) {
    histogram!("cepik_gate_wait_seconds").record(wait.as_secs_f64());
}

/// Outcome tracking for one partition
pub struct PartitionMetrics {
    partition: String,
    start_time: Instant,
}

impl PartitionMetrics {
    /// Start tracking a partition
    pub fn start(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            start_time: Instant::now(),
        }
    }

    /// Record a partition that finished without error
    pub fn record_success(&self, records: usize) {
        counter!(
            "cepik_partitions_completed_total",
            "partition" => self.partition.clone(),
        )
        .increment(1);

        info!(
            partition = %self.partition,
            records,
            duration_secs = self.start_time.elapsed().as_secs(),
            "Partition completed"
        );
    }

    /// Record a failed partition
    pub fn record_failure(&self, error: &str) {
        counter!(
            "cepik_partitions_failed_total",
            "partition" => self.partition.clone(),
        )
        .increment(1);

        error!(
            partition = %self.partition,
            error = %error,
            duration_secs = self.start_time.elapsed().as_secs(),
            "Partition failed"
        );
    }
}
