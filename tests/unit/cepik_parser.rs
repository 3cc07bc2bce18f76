//! Unit tests for CEPiK response parsing edge cases

use serde_json::json;

use registration_data_downloader::fetcher::cepik_parser::CepikParser;
use registration_data_downloader::fetcher::{FetcherError, HttpResponse};

#[test]
fn test_null_data_is_empty_last_page() {
    let page = CepikParser::parse_page(&json!({"data": null, "links": {}})).unwrap();
    assert!(page.records.is_empty());
    assert!(!page.has_next);
    assert_eq!(page.total_count, None);
}

#[test]
fn test_empty_next_link_ends_pagination() {
    for next in [json!(null), json!(""), json!("   ")] {
        let body = json!({"data": [], "links": {"next": next}});
        assert!(!CepikParser::parse_page(&body).unwrap().has_next);
    }
}

#[test]
fn test_unexpected_shapes_are_parse_errors() {
    assert!(matches!(
        CepikParser::parse_page(&json!([1, 2, 3])),
        Err(FetcherError::Parse(_))
    ));
    assert!(matches!(
        CepikParser::parse_page(&json!({"data": {"id": "1"}})),
        Err(FetcherError::Parse(_))
    ));
    assert!(matches!(
        HttpResponse::new(200, "<html></html>").json(),
        Err(FetcherError::Parse(_))
    ));
}

#[test]
fn test_missing_attributes_become_empty_map() {
    let page = CepikParser::parse_page(&json!({
        "data": [{"id": "x"}, {"id": "", "attributes": {}}, {"attributes": {"marka": "FIAT"}}]
    }))
    .unwrap();
    assert_eq!(page.records.len(), 1);
    assert_eq!(page.records[0].id, "x");
    assert!(page.records[0].attributes.is_empty());
}

#[test]
fn test_dictionary_index_and_missing_entries() {
    let names = CepikParser::parse_dictionary_index(&json!({
        "data": [{"id": "marka"}, {"id": ""}, {"type": "slowniki"}]
    }))
    .unwrap();
    assert_eq!(names, vec!["marka"]);

    assert!(CepikParser::parse_dictionary("marka", &json!({"data": {}})).is_err());
    assert!(CepikParser::parse_region_dictionary(&json!({
        "data": {"attributes": {"dostepne-rekordy-slownika": []}}
    }))
    .is_err());
}
