//! Integration tests for single-partition pagination

use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use registration_data_downloader::downloader::progress::{NoProgress, PageProgress};
use registration_data_downloader::downloader::{
    PartitionTask, RateLimitConfig, RateLimitCoordinator, SearchParams,
};
use registration_data_downloader::fetcher::pagination::PartitionFetcher;
use registration_data_downloader::fetcher::{FetcherError, HttpResponse};

use crate::support::{date, ids_page, page, vehicle, MockTransport};

fn task(code: &str) -> PartitionTask {
    SearchParams::new()
        .with_region(code)
        .with_date_range(date(2024, 1, 1), date(2024, 1, 31))
        .single_task()
        .unwrap()
}

fn fetcher(transport: Arc<MockTransport>) -> PartitionFetcher {
    PartitionFetcher::new(
        transport,
        "http://mock",
        RateLimitCoordinator::shared(RateLimitConfig::default()),
    )
}

#[tokio::test(start_paused = true)]
async fn test_follows_next_links_until_last_page() {
    let transport = MockTransport::new(|call, _| match call.page() {
        1 => ids_page(&["a", "b"], true),
        2 => ids_page(&["c", "d"], true),
        _ => ids_page(&["e"], false),
    });

    let outcome = fetcher(transport.clone()).fetch(&task("14"), &NoProgress).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.pages_fetched, 3);
    assert_eq!(outcome.records.len(), 5);

    let calls = transport.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(
        calls.iter().map(|c| c.page()).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(calls[0].url, "http://mock/pojazdy");
    assert_eq!(calls[0].region(), Some("14"));
    assert_eq!(calls[0].param("limit"), Some("500"));
    assert_eq!(calls[0].param("data-od"), Some("20240101"));
    assert_eq!(calls[0].param("data-do"), Some("20240131"));
}

#[tokio::test(start_paused = true)]
async fn test_requests_respect_minimum_interval() {
    let transport = MockTransport::new(|call, _| ids_page(&["x"], call.page() < 3));

    fetcher(transport.clone()).fetch(&task("14"), &NoProgress).await;

    let calls = transport.calls();
    for pair in calls.windows(2) {
        assert!(pair[1].at - pair[0].at >= Duration::from_millis(2500));
    }
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_ids_across_pages_are_dropped() {
    let transport = MockTransport::new(|call, _| match call.page() {
        1 => ids_page(&["a", "b"], true),
        _ => ids_page(&["b", "c"], false),
    });

    let outcome = fetcher(transport).fetch(&task("02"), &NoProgress).await;

    let ids: Vec<_> = outcome.records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[tokio::test(start_paused = true)]
async fn test_progress_reports_running_unique_count() {
    let transport = MockTransport::new(|call, _| match call.page() {
        1 => Ok(HttpResponse::new(
            200,
            crate::support::page_body(
                vec![vehicle("a", json!({})), vehicle("b", json!({}))],
                Some(3),
                true,
            ),
        )),
        _ => ids_page(&["b", "c"], false),
    });

    let seen = Arc::new(Mutex::new(Vec::new()));
    let progress = PageProgress({
        let seen = Arc::clone(&seen);
        move |page: u32, total: Option<u64>, fetched: usize| {
            seen.lock().unwrap().push((page, total, fetched));
        }
    });

    let outcome = fetcher(transport).fetch(&task("02"), &progress).await;

    assert_eq!(outcome.total_count, Some(3));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(1, Some(3), 2), (2, Some(3), 3)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_retried_once() {
    let transport = MockTransport::new(|_, attempt| {
        if attempt == 0 {
            Err(FetcherError::Transport("connection reset".into()))
        } else {
            ids_page(&["a"], false)
        }
    });

    let outcome = fetcher(transport.clone()).fetch(&task("14"), &NoProgress).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_second_failure_returns_first_error() {
    let transport = MockTransport::new(|_, attempt| {
        if attempt == 0 {
            Err(FetcherError::Transport("connection reset".into()))
        } else {
            Err(FetcherError::Timeout("30s".into()))
        }
    });

    let outcome = fetcher(transport.clone()).fetch(&task("14"), &NoProgress).await;

    assert_eq!(
        outcome.error,
        Some(FetcherError::Transport("connection reset".into()))
    );
    assert_eq!(transport.call_count(), 2);
    assert!(outcome.records.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_no_retry_when_disabled() {
    let transport =
        MockTransport::new(|_, _| Err(FetcherError::Timeout("request timed out".into())));

    let outcome = fetcher(transport.clone())
        .with_retry(false)
        .fetch(&task("14"), &NoProgress)
        .await;

    assert!(matches!(outcome.error, Some(FetcherError::Timeout(_))));
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_tls_failure_not_retried() {
    let transport =
        MockTransport::new(|_, _| Err(FetcherError::Tls("handshake failure".into())));

    let outcome = fetcher(transport.clone()).fetch(&task("14"), &NoProgress).await;

    assert!(matches!(outcome.error, Some(FetcherError::Tls(_))));
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_server_error_retried_client_error_not() {
    let transport = MockTransport::new(|_, attempt| {
        if attempt == 0 {
            Ok(HttpResponse::new(500, "internal error"))
        } else {
            ids_page(&["a"], false)
        }
    });
    let outcome = fetcher(transport.clone()).fetch(&task("14"), &NoProgress).await;
    assert!(outcome.is_success());
    assert_eq!(transport.call_count(), 2);

    let transport = MockTransport::new(|_, _| Ok(HttpResponse::new(404, "not found")));
    let outcome = fetcher(transport.clone()).fetch(&task("14"), &NoProgress).await;
    assert!(matches!(
        outcome.error,
        Some(FetcherError::Http { status: 404, .. })
    ));
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_parse_error_keeps_earlier_pages() {
    let transport = MockTransport::new(|call, _| match call.page() {
        1 => ids_page(&["a", "b"], true),
        _ => Ok(HttpResponse::new(200, "<html>maintenance</html>")),
    });

    let outcome = fetcher(transport).fetch(&task("14"), &NoProgress).await;

    assert!(matches!(outcome.error, Some(FetcherError::Parse(_))));
    assert_eq!(outcome.pages_fetched, 1);
    assert_eq!(outcome.records.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_page_cap_stops_endless_pagination() {
    let transport = MockTransport::new(|call, _| {
        let id = format!("v{}", call.page());
        ids_page(&[id.as_str()], true)
    });

    let outcome = fetcher(transport.clone())
        .with_max_pages(2)
        .fetch(&task("14"), &NoProgress)
        .await;

    assert_eq!(outcome.error, Some(FetcherError::PageLimit(2)));
    assert_eq!(outcome.records.len(), 2);
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_year_filter_applied_after_fetch() {
    let transport = MockTransport::new(|_, _| {
        page(
            vec![
                vehicle("a", json!({"rok-produkcji": "2018"})),
                vehicle("b", json!({"rok-produkcji": "2020"})),
                vehicle("c", json!({"rok-produkcji": 2022})),
                vehicle("d", json!({"rok-produkcji": "brak"})),
            ],
            false,
        )
    });

    let filtered = SearchParams::new()
        .with_region("14")
        .with_date_range(date(2024, 1, 1), date(2024, 1, 31))
        .with_years(Some(2019), Some(2021))
        .single_task()
        .unwrap();
    let outcome = fetcher(transport.clone()).fetch(&filtered, &NoProgress).await;
    let ids: Vec<_> = outcome.records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["b"]);

    // Without bounds the non-numeric year survives
    let outcome = fetcher(transport).fetch(&task("14"), &NoProgress).await;
    assert_eq!(outcome.records.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_filters_sent_upper_cased() {
    let transport = MockTransport::new(|_, _| ids_page(&[], false));
    let task = SearchParams::new()
        .with_region("12")
        .with_date_range(date(2024, 1, 1), date(2024, 1, 31))
        .with_brand("toyota")
        .with_filter("rodzaj-paliwa", "benzyna")
        .single_task()
        .unwrap();

    fetcher(transport.clone()).fetch(&task, &NoProgress).await;

    let call = &transport.calls()[0];
    assert_eq!(call.param("filter[marka]"), Some("TOYOTA"));
    assert_eq!(call.param("filter[rodzaj-paliwa]"), Some("BENZYNA"));
}
