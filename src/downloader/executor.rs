//! Parallel multi-partition executor
//!
//! Runs one [`PartitionFetcher`] per task through a bounded pool and merges
//! the results as partitions finish. Workers only touch their own entry on
//! the [`StatusBoard`]; merging, deduplication and snapshot emission happen
//! in the orchestrating loop.

use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use tracing::{info, info_span, warn, Instrument};

use crate::downloader::config::MAX_CONCURRENT_PARTITIONS;
use crate::downloader::job::{ParallelOutcome, PartitionTask};
use crate::downloader::progress::{PartitionObserver, ProgressSink, StatusBoard};
use crate::fetcher::pagination::PartitionFetcher;
use crate::metrics::PartitionMetrics;

/// Bounded-concurrency fetch across partitions
pub struct ParallelExecutor {
    fetcher: PartitionFetcher,
    workers: usize,
    batch: Option<u64>,
}

impl ParallelExecutor {
    /// Executor with the default worker count
    pub fn new(fetcher: PartitionFetcher) -> Self {
        Self {
            fetcher,
            workers: MAX_CONCURRENT_PARTITIONS,
            batch: None,
        }
    }

    /// Lower the number of partitions fetched at once, clamped to `1..=2`
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.clamp(1, MAX_CONCURRENT_PARTITIONS);
        self
    }

    /// Tag every merged record with `batch`
    pub fn with_batch(mut self, batch: u64) -> Self {
        self.batch = Some(batch);
        self
    }

    /// Fetch every task and merge the results
    ///
    /// Emits one all-waiting snapshot up front and one after each partition
    /// finishes. Failed partitions contribute their partial records and a
    /// `"<name>: <message>"` entry in `errors`; they never abort the run.
    pub async fn fetch_all(
        &self,
        tasks: Vec<PartitionTask>,
        sink: &dyn ProgressSink,
    ) -> ParallelOutcome {
        let span = info_span!("parallel_fetch", partitions = tasks.len(), batch = ?self.batch);
        self.run(tasks, sink).instrument(span).await
    }

    async fn run(&self, tasks: Vec<PartitionTask>, sink: &dyn ProgressSink) -> ParallelOutcome {
        let board = StatusBoard::new(tasks.iter().map(|t| &t.region));
        let mut seen = HashSet::new();
        let mut records = Vec::new();
        let mut errors = Vec::new();

        info!(workers = self.workers, "Starting parallel fetch");
        sink.emit(board.snapshot(0));

        let board_ref = &board;
        let fetcher = &self.fetcher;
        let mut finished = stream::iter(tasks)
            .map(move |task| async move {
                let code = task.region.code();
                let metrics = PartitionMetrics::start(code);
                let observer = PartitionObserver::new(board_ref, code);

                let outcome = fetcher.fetch(&task, &observer).await;

                board_ref.finish(code, &outcome);
                match &outcome.error {
                    None => metrics.record_success(outcome.records.len()),
                    Some(e) => metrics.record_failure(&e.to_string()),
                }
                (task, outcome)
            })
            .buffer_unordered(self.workers);

        while let Some((task, outcome)) = finished.next().await {
            let before = records.len();
            for mut record in outcome.records {
                if seen.insert(record.id.clone()) {
                    record.batch = self.batch;
                    records.push(record);
                }
            }

            if let Some(e) = outcome.error {
                warn!(region = %task.region, error = %e, "Partition failed");
                errors.push(format!("{}: {}", task.region.name(), e));
            }

            info!(
                region = %task.region,
                new_records = records.len() - before,
                total_records = records.len(),
                "Partition merged"
            );
            sink.emit(board.snapshot(records.len()));
        }
        drop(finished);

        info!(
            records = records.len(),
            failed = errors.len(),
            "Parallel fetch finished"
        );

        ParallelOutcome {
            records,
            errors,
            statuses: board.into_statuses(),
            batch: self.batch.unwrap_or_default(),
        }
    }
}
