//! CEPiK response parsing
//!
//! Record pages look like `{data: [{id, attributes}], meta: {count}, links: {next}}`.
//! Dictionaries nest their entries under
//! `data.attributes["dostepne-rekordy-slownika"][*]["klucz-slownika"]`.

use serde_json::{Map, Value};

use crate::fetcher::cepik_config::PRODUCTION_METHOD_DICTIONARY;
use crate::fetcher::{FetcherError, FetcherResult};
use crate::Record;

const DICTIONARY_ENTRIES: &str = "dostepne-rekordy-slownika";
const DICTIONARY_KEY: &str = "klucz-slownika";
const DICTIONARY_VALUE: &str = "wartosc-slownika";

/// One parsed page of vehicle records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiPage {
    /// Records with a usable id, in response order
    pub records: Vec<Record>,
    /// `meta.count` when present
    pub total_count: Option<u64>,
    /// `links.next` is present, non-null and non-empty
    pub has_next: bool,
}

/// Parser for CEPiK JSON responses
pub struct CepikParser;

impl CepikParser {
    /// Parse a `/pojazdy` page
    ///
    /// A missing or null `data` is an empty page. Items without an id are
    /// skipped and a missing `attributes` becomes an empty map.
    ///
    /// # Errors
    /// Returns `Parse` if the body is not an object or `data` is not an array.
    pub fn parse_page(body: &Value) -> FetcherResult<ApiPage> {
        let root = body
            .as_object()
            .ok_or_else(|| FetcherError::Parse(format!("expected object, got {}", type_name(body))))?;

        let records = match root.get("data") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.iter().filter_map(Self::parse_record).collect(),
            Some(other) => {
                return Err(FetcherError::Parse(format!(
                    "expected 'data' array, got {}",
                    type_name(other)
                )))
            }
        };

        let total_count = root
            .get("meta")
            .and_then(|meta| meta.get("count"))
            .and_then(parse_count);

        let has_next = root
            .get("links")
            .and_then(|links| links.get("next"))
            .map(|next| match next {
                Value::Null => false,
                Value::String(s) => !s.trim().is_empty(),
                _ => true,
            })
            .unwrap_or(false);

        Ok(ApiPage {
            records,
            total_count,
            has_next,
        })
    }

    fn parse_record(item: &Value) -> Option<Record> {
        let id = match item.get("id")? {
            Value::String(s) if !s.trim().is_empty() => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let attributes = item
            .get("attributes")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_else(Map::new);
        Some(Record::new(id, attributes))
    }

    /// Parse the entry keys of a single dictionary
    ///
    /// Entries of `sposob-produkcji` that are purely numeric are dropped.
    pub fn parse_dictionary(name: &str, body: &Value) -> FetcherResult<Vec<String>> {
        let entries = Self::dictionary_entries(body)?;
        let drop_numeric = name == PRODUCTION_METHOD_DICTIONARY;

        Ok(entries
            .iter()
            .filter_map(|entry| entry.get(DICTIONARY_KEY).and_then(scalar_text))
            .filter(|key| !key.is_empty())
            .filter(|key| !(drop_numeric && key.chars().all(|c| c.is_ascii_digit())))
            .collect())
    }

    /// Parse the `(code, name)` pairs of the region dictionary
    pub fn parse_region_dictionary(body: &Value) -> FetcherResult<Vec<(String, String)>> {
        let entries = Self::dictionary_entries(body)?;
        let pairs: Vec<(String, String)> = entries
            .iter()
            .filter_map(|entry| {
                let code = entry.get(DICTIONARY_KEY).and_then(scalar_text)?;
                let name = entry.get(DICTIONARY_VALUE).and_then(scalar_text)?;
                (!code.is_empty() && !name.is_empty()).then_some((code, name))
            })
            .collect();

        if pairs.is_empty() {
            return Err(FetcherError::Parse("region dictionary has no entries".into()));
        }
        Ok(pairs)
    }

    /// Parse the dictionary names from the `/slowniki` listing
    pub fn parse_dictionary_index(body: &Value) -> FetcherResult<Vec<String>> {
        let items = body
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| FetcherError::Parse("dictionary index has no 'data' array".into()))?;

        Ok(items
            .iter()
            .filter_map(|item| item.get("id").and_then(scalar_text))
            .filter(|id| !id.is_empty())
            .collect())
    }

    fn dictionary_entries(body: &Value) -> FetcherResult<&Vec<Value>> {
        body.get("data")
            .and_then(|data| data.get("attributes"))
            .and_then(|attrs| attrs.get(DICTIONARY_ENTRIES))
            .and_then(Value::as_array)
            .ok_or_else(|| FetcherError::Parse(format!("missing '{DICTIONARY_ENTRIES}' array")))
    }
}

/// `meta.count` arrives as a number or a numeric string
fn parse_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
