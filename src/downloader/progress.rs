//! Progress reporting for single and parallel fetches.
//!
//! Fetchers report through [`FetchObserver`] callbacks. In a parallel run the
//! callbacks land on a [`StatusBoard`] (one [`PartitionStatus`] per region
//! under a std mutex), and the orchestrator copies the board into
//! [`ProgressSnapshot`]s for the caller's [`ProgressSink`]. Observers only take
//! short std locks and never await.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc::UnboundedSender;

use crate::downloader::job::{FetchOutcome, PartitionState, PartitionStatus};
use crate::region::RegionCode;

/// Callbacks a fetcher fires while paginating
///
/// Every method defaults to a no-op.
pub trait FetchObserver: Send + Sync {
    /// First request is about to be issued
    fn on_started(&self) {}

    /// Page `page` arrived; `fetched` is the running unique record count
    fn on_page(&self, _page: u32, _total: Option<u64>, _fetched: usize) {}

    /// This fetcher won the throttle incident and is cooling down
    fn on_rate_limited(&self) {}

    /// Cooldown over, the throttled page is being retried
    fn on_resumed(&self) {}
}

/// Consumer of progress snapshots from a parallel run
pub trait ProgressSink: Send + Sync {
    /// Receive one snapshot
    fn emit(&self, snapshot: ProgressSnapshot);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressSnapshot) + Send + Sync,
{
    fn emit(&self, snapshot: ProgressSnapshot) {
        self(snapshot)
    }
}

impl ProgressSink for UnboundedSender<ProgressSnapshot> {
    fn emit(&self, snapshot: ProgressSnapshot) {
        // A dropped receiver only means nobody is watching
        let _ = self.send(snapshot);
    }
}

/// Observer and sink that ignore everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl FetchObserver for NoProgress {}

impl ProgressSink for NoProgress {
    fn emit(&self, _snapshot: ProgressSnapshot) {}
}

/// Adapts a `(page, total, fetched)` callback to [`FetchObserver`]
pub struct PageProgress<F>(pub F);

impl<F> FetchObserver for PageProgress<F>
where
    F: Fn(u32, Option<u64>, usize) + Send + Sync,
{
    fn on_page(&self, page: u32, total: Option<u64>, fetched: usize) {
        (self.0)(page, total, fetched)
    }
}

/// Consistent copy of every partition's status
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Statuses in region order
    pub partitions: Vec<PartitionStatus>,
    /// Unique records merged so far
    pub unique_records: usize,
}

impl ProgressSnapshot {
    /// Partitions in a terminal state
    pub fn completed(&self) -> usize {
        self.partitions
            .iter()
            .filter(|p| p.state.is_terminal())
            .count()
    }

    /// Number of partitions in the run
    pub fn total(&self) -> usize {
        self.partitions.len()
    }

    /// Every partition is terminal
    pub fn is_finished(&self) -> bool {
        self.completed() == self.total()
    }
}

/// Shared per-partition status table
#[derive(Debug)]
pub struct StatusBoard {
    statuses: Mutex<BTreeMap<String, PartitionStatus>>,
}

impl StatusBoard {
    /// One `Waiting` entry per region
    pub fn new<'a>(regions: impl IntoIterator<Item = &'a RegionCode>) -> Self {
        let statuses = regions
            .into_iter()
            .map(|r| (r.code().to_string(), PartitionStatus::waiting(r)))
            .collect();
        Self {
            statuses: Mutex::new(statuses),
        }
    }

    // A panicking observer must not take progress reporting down with it
    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, PartitionStatus>> {
        self.statuses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply `f` to one partition's status and refresh its elapsed time
    pub fn update(&self, code: &str, f: impl FnOnce(&mut PartitionStatus)) {
        let mut statuses = self.lock();
        if let Some(status) = statuses.get_mut(code) {
            f(status);
            status.touch();
        }
    }

    /// Winner becomes `RateLimited`, every other live partition `Paused`
    pub fn mark_rate_limited(&self, winner: &str) {
        let mut statuses = self.lock();
        for (code, status) in statuses.iter_mut() {
            if status.state.is_terminal() {
                continue;
            }
            status.state = if code == winner {
                PartitionState::RateLimited
            } else {
                PartitionState::Paused
            };
            status.touch();
        }
    }

    /// Winner becomes `Resuming`, every `Paused` partition returns to where it was
    pub fn mark_resumed(&self, winner: &str) {
        let mut statuses = self.lock();
        for (code, status) in statuses.iter_mut() {
            if code == winner && !status.state.is_terminal() {
                status.state = PartitionState::Resuming;
            } else {
                status.unpause();
            }
            status.touch();
        }
    }

    /// Set the terminal state from a fetch outcome
    pub fn finish(&self, code: &str, outcome: &FetchOutcome) {
        self.update(code, |status| {
            status.records_fetched = outcome.records.len();
            status.pages_fetched = outcome.pages_fetched;
            status.total_count = outcome.total_count.or(status.total_count);
            match &outcome.error {
                None => status.state = PartitionState::Completed,
                Some(err) => {
                    status.state = PartitionState::Failed;
                    status.error = Some(err.to_string());
                }
            }
        });
    }

    /// Copy of the board
    pub fn snapshot(&self, unique_records: usize) -> ProgressSnapshot {
        ProgressSnapshot {
            partitions: self.lock().values().cloned().collect(),
            unique_records,
        }
    }

    /// Final statuses keyed by region code
    pub fn into_statuses(self) -> BTreeMap<String, PartitionStatus> {
        self.statuses
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// [`FetchObserver`] writing one partition's progress to a [`StatusBoard`]
pub struct PartitionObserver<'a> {
    board: &'a StatusBoard,
    code: String,
}

impl<'a> PartitionObserver<'a> {
    /// Observer for the partition `code`
    pub fn new(board: &'a StatusBoard, code: impl Into<String>) -> Self {
        Self {
            board,
            code: code.into(),
        }
    }
}

impl FetchObserver for PartitionObserver<'_> {
    fn on_started(&self) {
        self.board.update(&self.code, PartitionStatus::start);
    }

    fn on_page(&self, page: u32, total: Option<u64>, fetched: usize) {
        self.board.update(&self.code, |status| {
            status.state = PartitionState::Page(page);
            status.pages_fetched = page;
            status.records_fetched = fetched;
            if total.is_some() {
                status.total_count = total;
            }
        });
    }

    fn on_rate_limited(&self) {
        self.board.mark_rate_limited(&self.code);
    }

    fn on_resumed(&self) {
        self.board.mark_resumed(&self.code);
    }
}
