//! Scripted HTTP transport and response builders shared by the test suites

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use registration_data_downloader::fetcher::{FetcherResult, HttpResponse, HttpTransport};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// One request seen by the mock
#[derive(Debug, Clone)]
pub struct Call {
    pub url: String,
    pub params: BTreeMap<String, String>,
    pub at: Instant,
}

impl Call {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn region(&self) -> Option<&str> {
        self.param("wojewodztwo")
    }

    pub fn page(&self) -> u32 {
        self.param("page").and_then(|p| p.parse().ok()).unwrap_or(1)
    }
}

type Responder = dyn Fn(&Call, usize) -> FetcherResult<HttpResponse> + Send + Sync;

/// Transport answering from a closure
///
/// The closure receives the call and how many identical calls (same URL and
/// parameters) came before it, so "fail first, then succeed" scripts are easy.
pub struct MockTransport {
    calls: Mutex<Vec<Call>>,
    respond: Box<Responder>,
}

impl MockTransport {
    pub fn new(
        respond: impl Fn(&Call, usize) -> FetcherResult<HttpResponse> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for_region(&self, code: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.region() == Some(code))
            .collect()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn get(
        &self,
        url: &str,
        params: &[(String, String)],
        _timeout: Duration,
    ) -> FetcherResult<HttpResponse> {
        let call = Call {
            url: url.to_string(),
            params: params.iter().cloned().collect(),
            at: Instant::now(),
        };
        let repeats = {
            let mut calls = self.calls.lock().unwrap();
            let repeats = calls
                .iter()
                .filter(|c| c.url == call.url && c.params == call.params)
                .count();
            calls.push(call.clone());
            repeats
        };
        (self.respond)(&call, repeats)
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// A vehicle item as the API returns it
pub fn vehicle(id: &str, attributes: Value) -> Value {
    json!({ "id": id, "attributes": attributes })
}

/// A `/pojazdy` page body
pub fn page_body(items: Vec<Value>, count: Option<u64>, has_next: bool) -> String {
    let next = if has_next {
        json!("https://api.cepik.gov.pl/pojazdy?page=next")
    } else {
        Value::Null
    };
    json!({
        "data": items,
        "meta": { "count": count },
        "links": { "next": next },
    })
    .to_string()
}

/// 200 response carrying a page
pub fn page(items: Vec<Value>, has_next: bool) -> FetcherResult<HttpResponse> {
    Ok(HttpResponse::new(200, page_body(items, None, has_next)))
}

/// 200 response with vehicles `ids`, no attributes
pub fn ids_page(ids: &[&str], has_next: bool) -> FetcherResult<HttpResponse> {
    page(
        ids.iter().map(|id| vehicle(id, json!({}))).collect(),
        has_next,
    )
}

/// A dictionary body with the given entry keys
pub fn dictionary_body(keys: &[&str]) -> String {
    let entries: Vec<Value> = keys
        .iter()
        .map(|k| json!({ "klucz-slownika": k, "wartosc-slownika": k }))
        .collect();
    json!({
        "data": {
            "attributes": { "dostepne-rekordy-slownika": entries }
        }
    })
    .to_string()
}
