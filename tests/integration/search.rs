//! Integration tests for single-region search through the client

use serde_json::json;
use std::sync::Arc;

use registration_data_downloader::client::{CepikClient, ClientConfig, ResultSet};
use registration_data_downloader::downloader::progress::NoProgress;
use registration_data_downloader::downloader::SearchParams;
use registration_data_downloader::fetcher::FetcherError;

use crate::support::{date, ids_page, page, vehicle, MockTransport};

fn client(transport: Arc<MockTransport>) -> CepikClient {
    CepikClient::with_transport(
        transport,
        ClientConfig::default().with_base_url("http://mock/"),
    )
}

fn params(region: &str) -> SearchParams {
    SearchParams::new()
        .with_region(region)
        .with_date_range(date(2023, 12, 1), date(2023, 12, 31))
}

#[tokio::test(start_paused = true)]
async fn test_search_returns_tagged_records_and_meta() {
    let transport = MockTransport::new(|call, _| match call.page() {
        1 => ids_page(&["a", "b"], true),
        _ => ids_page(&["c"], false),
    });
    let client = client(transport.clone());

    let result = client.search(&params("14"), &NoProgress).await.unwrap();

    assert_eq!(result.batch, 1);
    assert_eq!(result.meta.pages_fetched, 2);
    assert_eq!(result.meta.fetched_count, 3);
    assert!(result.records.iter().all(|r| r.batch == Some(1)));
    assert_eq!(transport.calls()[0].url, "http://mock/pojazdy");
}

#[tokio::test(start_paused = true)]
async fn test_search_requires_region() {
    let transport = MockTransport::new(|_, _| ids_page(&["a"], false));
    let client = client(transport.clone());

    let no_region = SearchParams::new().with_date_range(date(2024, 1, 1), date(2024, 1, 2));
    assert!(matches!(
        client.search(&no_region, &NoProgress).await,
        Err(FetcherError::Validation(_))
    ));
    assert!(matches!(
        client.search(&params("99"), &NoProgress).await,
        Err(FetcherError::Validation(_))
    ));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_search_failure_discards_partial_records() {
    let transport = MockTransport::new(|call, _| match call.page() {
        1 => ids_page(&["a"], true),
        _ => Err(FetcherError::Tls("certificate verify failed".into())),
    });

    let result = client(transport).search(&params("14"), &NoProgress).await;

    assert!(matches!(result, Err(FetcherError::Tls(_))));
}

#[tokio::test(start_paused = true)]
async fn test_successive_searches_accumulate_in_result_set() {
    let transport = MockTransport::new(|call, _| match call.region() {
        Some("14") => ids_page(&["a", "b"], false),
        _ => ids_page(&["b", "c"], false),
    });
    let client = client(transport);
    let mut results = ResultSet::new();

    let first = client.search(&params("14"), &NoProgress).await.unwrap();
    assert_eq!(results.append(first.records), 2);
    let second = client.search(&params("12"), &NoProgress).await.unwrap();
    assert_eq!(results.append(second.records), 1);

    assert_eq!(results.len(), 3);
    assert_eq!(results.batches().into_iter().collect::<Vec<_>>(), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_brand_and_model_listing() {
    let transport = MockTransport::new(|_, _| {
        page(
            vec![
                vehicle("1", json!({"marka": "TOYOTA", "model": "COROLLA"})),
                vehicle("2", json!({"marka": "TOYOTA", "model": "YARIS"})),
                vehicle("3", json!({"marka": "FIAT", "model": "PANDA"})),
                vehicle("4", json!({"marka": "---", "model": "---"})),
            ],
            false,
        )
    });
    let client = client(transport);
    let result = client.search(&params("14"), &NoProgress).await.unwrap();

    assert_eq!(client.brands_in(&result.records), vec!["FIAT", "TOYOTA"]);
    assert_eq!(
        client.models_in(&result.records, Some("toyota")),
        vec!["COROLLA", "YARIS"]
    );
    assert_eq!(client.models_in(&result.records, None).len(), 3);
}
