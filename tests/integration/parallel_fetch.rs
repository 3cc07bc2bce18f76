//! Integration tests for the all-region parallel search

use std::collections::HashSet;
use std::sync::Arc;

use registration_data_downloader::client::{CepikClient, ClientConfig};
use registration_data_downloader::downloader::progress::{NoProgress, ProgressSnapshot};
use registration_data_downloader::downloader::{DownloadError, PartitionState, SearchParams};
use registration_data_downloader::fetcher::HttpResponse;
use registration_data_downloader::region::RegionCode;

use crate::support::{date, ids_page, MockTransport};

fn params() -> SearchParams {
    SearchParams::new().with_date_range(date(2024, 3, 1), date(2024, 3, 3))
}

fn client(transport: Arc<MockTransport>) -> CepikClient {
    CepikClient::with_transport(
        transport,
        ClientConfig::default().with_base_url("http://mock"),
    )
}

/// Regions 02 and 04 overlap on "b", 06 fails, the rest are empty
fn scripted() -> Arc<MockTransport> {
    MockTransport::new(|call, _| match call.region() {
        Some("02") => ids_page(&["a", "b"], false),
        Some("04") => ids_page(&["b", "c"], false),
        Some("06") => Ok(HttpResponse::new(400, "bad filter")),
        _ => ids_page(&[], false),
    })
}

fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ProgressSnapshot>) -> Vec<ProgressSnapshot> {
    let mut snapshots = Vec::new();
    while let Ok(snapshot) = rx.try_recv() {
        snapshots.push(snapshot);
    }
    snapshots
}

#[tokio::test(start_paused = true)]
async fn test_all_regions_merged_and_deduplicated() {
    let transport = scripted();
    let client = client(transport.clone());

    let outcome = client
        .search_all_parallel(&params(), &NoProgress)
        .await
        .unwrap();

    let ids: HashSet<_> = outcome.records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, HashSet::from(["a", "b", "c"]));
    assert_eq!(outcome.records.len(), 3);

    let regions: HashSet<_> = transport
        .calls()
        .iter()
        .filter_map(|c| c.region().map(str::to_string))
        .collect();
    assert_eq!(regions.len(), 16);
    assert_eq!(outcome.statuses.len(), 16);
}

#[tokio::test(start_paused = true)]
async fn test_failed_region_reported_by_name() {
    let outcome = client(scripted())
        .search_all_parallel(&params(), &NoProgress)
        .await
        .unwrap();

    assert!(outcome.is_partial_failure());
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].starts_with("LUBELSKIE: "));
    assert!(outcome.errors[0].contains("400"));

    let failed = &outcome.statuses["06"];
    assert_eq!(failed.state, PartitionState::Failed);
    assert!(failed.error.is_some());
    assert_eq!(outcome.statuses["02"].state, PartitionState::Completed);
    assert_eq!(outcome.statuses["02"].records_fetched, 2);
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_per_completion_plus_initial() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    client(scripted())
        .search_all_parallel(&params(), &tx)
        .await
        .unwrap();

    let snapshots = drain(&mut rx);
    assert_eq!(snapshots.len(), 17);

    let first = &snapshots[0];
    assert_eq!(first.total(), 16);
    assert!(first
        .partitions
        .iter()
        .all(|p| p.state == PartitionState::Waiting));

    for (i, snapshot) in snapshots.iter().enumerate() {
        assert_eq!(snapshot.completed(), i);
        let in_flight = snapshot
            .partitions
            .iter()
            .filter(|p| !p.state.is_terminal() && p.state != PartitionState::Waiting)
            .count();
        assert!(in_flight <= 2);
    }

    let last = snapshots.last().unwrap();
    assert!(last.is_finished());
    assert_eq!(last.unique_records, 3);
}

#[tokio::test(start_paused = true)]
async fn test_region_subset() {
    let transport = scripted();
    let regions = vec![RegionCode::parse("02").unwrap(), RegionCode::parse("04").unwrap()];

    let outcome = client(transport.clone())
        .search_regions_parallel(&params(), &regions, &NoProgress)
        .await
        .unwrap();

    assert_eq!(outcome.records.len(), 3);
    assert_eq!(outcome.statuses.len(), 2);
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_records_tagged_with_run_batch() {
    let client = client(scripted());
    let regions = vec![RegionCode::parse("02").unwrap()];

    let first = client
        .search_regions_parallel(&params(), &regions, &NoProgress)
        .await
        .unwrap();
    let second = client
        .search_regions_parallel(&params(), &regions, &NoProgress)
        .await
        .unwrap();

    assert_eq!(first.batch, 1);
    assert_eq!(second.batch, 2);
    assert!(first.records.iter().all(|r| r.batch == Some(1)));
    assert!(second.records.iter().all(|r| r.batch == Some(2)));
}

#[tokio::test(start_paused = true)]
async fn test_validation_fails_before_any_request() {
    let transport = scripted();
    let client = client(transport.clone());

    let missing_dates = client
        .search_all_parallel(&SearchParams::new(), &NoProgress)
        .await;
    assert!(matches!(missing_dates, Err(DownloadError::Validation(_))));

    let inverted = SearchParams::new().with_date_range(date(2024, 3, 3), date(2024, 3, 1));
    assert!(matches!(
        client.search_all_parallel(&inverted, &NoProgress).await,
        Err(DownloadError::Validation(_))
    ));

    assert!(matches!(
        client
            .search_regions_parallel(&params(), &[], &NoProgress)
            .await,
        Err(DownloadError::Validation(_))
    ));

    assert_eq!(transport.call_count(), 0);
}
