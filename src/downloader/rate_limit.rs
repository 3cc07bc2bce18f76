//! Shared rate limiting for concurrent fetchers
//!
//! One [`RateLimitCoordinator`] is shared by every fetcher of a run. It
//! enforces a minimum interval between any two requests and, when the API
//! signals throttling, closes a gate that holds every fetcher until the
//! cooldown elapses. Exactly one fetcher per incident closes the gate and
//! sleeps; the rest wait on it. Each granted [`Slot`] carries the incident
//! count at send time, so a throttle answered after its incident already
//! ended does not start another cooldown.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::downloader::config::RateLimitConfig;
use crate::downloader::progress::FetchObserver;
use crate::fetcher::cepik_config::REMAINING_QUOTA_HEADER;
use crate::fetcher::HttpResponse;
use crate::metrics;

/// Open/closed flag with waiter notification
#[derive(Debug, Default)]
pub struct RateLimitGate {
    closed: AtomicBool,
    notify: Notify,
}

impl RateLimitGate {
    /// Open gate
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether requests may be issued
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    /// Close the gate; only the caller that flips it from open gets `true`
    pub fn try_close(&self) -> bool {
        self.closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Reopen and wake every waiter
    pub fn reopen(&self) {
        self.closed.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Wait until the gate is open. Returns immediately if it already is.
    pub async fn wait_open(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a reopen in between is not missed
            notified.as_mut().enable();
            if self.is_open() {
                return;
            }
            notified.await;
        }
    }
}

/// Why a response counts as throttled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleSignal {
    /// 429 or 503
    Status(u16),
    /// `X-RateLimit-Remaining` at or below zero
    QuotaExhausted(i64),
}

impl ThrottleSignal {
    /// Detect a throttle signal in a response
    pub fn detect(response: &HttpResponse) -> Option<Self> {
        if matches!(response.status, 429 | 503) {
            return Some(Self::Status(response.status));
        }
        match remaining_quota(response) {
            Some(remaining) if remaining <= 0 => Some(Self::QuotaExhausted(remaining)),
            _ => None,
        }
    }
}

impl std::fmt::Display for ThrottleSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status(status) => write!(f, "HTTP {status}"),
            Self::QuotaExhausted(remaining) => write!(f, "remaining quota {remaining}"),
        }
    }
}

/// `X-RateLimit-Remaining` as an integer; unparseable values are ignored
pub fn remaining_quota(response: &HttpResponse) -> Option<i64> {
    response
        .header(REMAINING_QUOTA_HEADER)
        .and_then(|v| v.trim().parse::<i64>().ok())
}

/// Permission to send one request, stamped with the incident count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    incident: u64,
}

impl Slot {
    /// Throttle incidents started before this slot was granted
    pub fn incident(&self) -> u64 {
        self.incident
    }
}

/// Gate, request floor and cooldown shared by all fetchers of a run
#[derive(Debug)]
pub struct RateLimitCoordinator {
    gate: RateLimitGate,
    incidents: AtomicU64,
    last_request: Mutex<Option<Instant>>,
    config: RateLimitConfig,
}

impl RateLimitCoordinator {
    /// Coordinator with the given timings
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            gate: RateLimitGate::new(),
            incidents: AtomicU64::new(0),
            last_request: Mutex::new(None),
            config,
        }
    }

    /// Coordinator wrapped in [`Arc`] for sharing
    pub fn shared(config: RateLimitConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    /// Active timings
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// The shared gate
    pub fn gate(&self) -> &RateLimitGate {
        &self.gate
    }

    /// Throttle incidents started so far
    pub fn incidents(&self) -> u64 {
        self.incidents.load(Ordering::SeqCst)
    }

    /// Wait until a request may be issued
    ///
    /// Returns once the gate is open and `min_interval` has passed since the
    /// last request granted to any fetcher. The gate is checked again after
    /// the interval wait so nothing slips through while it is closed.
    pub async fn acquire_slot(&self) -> Slot {
        let started = Instant::now();
        loop {
            self.gate.wait_open().await;

            let mut last = self.last_request.lock().await;
            if let Some(previous) = *last {
                let ready_at = previous + self.config.min_interval;
                if ready_at > Instant::now() {
                    sleep(ready_at - Instant::now()).await;
                }
            }

            // Read before the gate check: a close racing past it leaves a stale stamp
            let incident = self.incidents();
            if !self.gate.is_open() {
                continue;
            }

            *last = Some(Instant::now());
            metrics::record_gate_wait(started.elapsed());
            return Slot { incident };
        }
    }

    /// React to a throttle signal for a request sent under `slot`
    ///
    /// The fetcher that closes the gate notifies its observer, sleeps the
    /// cooldown, reopens the gate and reports the resume; it gets `true`.
    /// Any other fetcher waits for the gate and gets `false`. A signal for a
    /// request sent before the latest incident began belongs to that
    /// incident and returns `false` without closing the gate again.
    pub async fn handle_throttle(
        &self,
        signal: ThrottleSignal,
        slot: Slot,
        partition: &str,
        observer: &dyn FetchObserver,
    ) -> bool {
        if slot.incident != self.incidents() {
            debug!(partition, %signal, "Throttle from an earlier incident, not pausing again");
            self.gate.wait_open().await;
            return false;
        }
        if !self.gate.try_close() {
            debug!(partition, %signal, "Gate already closed, waiting for reopen");
            self.gate.wait_open().await;
            return false;
        }
        self.incidents.fetch_add(1, Ordering::SeqCst);

        metrics::record_rate_limit_incident(partition);
        warn!(
            partition,
            %signal,
            cooldown_secs = self.config.cooldown.as_secs_f64(),
            "Rate limited, pausing all fetchers"
        );
        observer.on_rate_limited();

        sleep(self.config.cooldown).await;

        self.gate.reopen();
        observer.on_resumed();
        info!(partition, "Cooldown over, resuming");
        true
    }

    /// Log a warning when the remaining quota runs low
    pub fn check_quota(&self, response: &HttpResponse, partition: &str) {
        if let Some(remaining) = remaining_quota(response) {
            if remaining > 0 && remaining <= self.config.low_quota_warning {
                warn!(partition, remaining, "Rate limit quota running low");
            }
        }
    }
}

impl Default for RateLimitCoordinator {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
