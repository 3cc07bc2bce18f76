//! Cached dictionary lookups
//!
//! Dictionaries are the enumerated value lists behind `/slowniki` (brands,
//! fuel types, regions, ...). Successful lookups are memoized for the life of
//! the cache; failures degrade to empty results and are not cached, so a
//! later call tries again.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::fetcher::cepik_config::{
    DICTIONARIES_ENDPOINT, DICTIONARY_INDEX_LIMIT, METADATA_TIMEOUT, PARAM_LIMIT, PARAM_PAGE,
    REGIONS_DICTIONARY,
};
use crate::fetcher::cepik_parser::CepikParser;
use crate::fetcher::{status_error, FetcherResult, HttpTransport};
use crate::region::REGIONS;

/// Memoizing dictionary client
pub struct DictionaryCache {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    entries: Mutex<HashMap<String, Vec<String>>>,
}

impl DictionaryCache {
    /// Empty cache over `transport`
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<String>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Values of dictionary `name`, from cache or one request
    ///
    /// Returns an empty list when the request or parse fails.
    pub async fn get_dictionary(&self, name: &str) -> Vec<String> {
        if let Some(cached) = self.lock().get(name) {
            debug!(dictionary = name, "Dictionary cache hit");
            return cached.clone();
        }

        match self.fetch_dictionary(name).await {
            Ok(values) => {
                debug!(dictionary = name, entries = values.len(), "Dictionary fetched");
                self.lock().insert(name.to_string(), values.clone());
                values
            }
            Err(e) => {
                warn!(dictionary = name, error = %e, "Dictionary fetch failed");
                Vec::new()
            }
        }
    }

    async fn fetch_dictionary(&self, name: &str) -> FetcherResult<Vec<String>> {
        let body = self.get_json(&format!("/{name}"), &[]).await?;
        CepikParser::parse_dictionary(name, &body)
    }

    /// Every listed dictionary except regions, keyed by name
    ///
    /// Empty or failed dictionaries are left out. If the listing itself
    /// fails the map is empty.
    pub async fn get_all_dictionaries(&self) -> BTreeMap<String, Vec<String>> {
        let names = match self.list_dictionaries().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Dictionary listing failed");
                return BTreeMap::new();
            }
        };

        let mut all = BTreeMap::new();
        for name in names {
            if name == REGIONS_DICTIONARY {
                continue;
            }
            let values = self.get_dictionary(&name).await;
            if !values.is_empty() {
                all.insert(name, values);
            }
        }
        all
    }

    async fn list_dictionaries(&self) -> FetcherResult<Vec<String>> {
        let params = [
            (PARAM_LIMIT.to_string(), DICTIONARY_INDEX_LIMIT.to_string()),
            (PARAM_PAGE.to_string(), "1".to_string()),
        ];
        let body = self.get_json("", &params).await?;
        CepikParser::parse_dictionary_index(&body)
    }

    /// `(code, name)` pairs for every region
    ///
    /// Falls back to the built-in table when the API is unavailable or
    /// returns an unexpected shape.
    pub async fn get_regions(&self) -> Vec<(String, String)> {
        let fetched = match self.get_json(&format!("/{REGIONS_DICTIONARY}"), &[]).await {
            Ok(body) => CepikParser::parse_region_dictionary(&body),
            Err(e) => Err(e),
        };

        fetched.unwrap_or_else(|e| {
            warn!(error = %e, "Region dictionary unavailable, using built-in table");
            REGIONS
                .iter()
                .map(|(code, name)| (code.to_string(), name.to_string()))
                .collect()
        })
    }

    /// Names currently cached, sorted
    pub fn cached_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop every cached dictionary
    pub fn clear(&self) {
        self.lock().clear();
    }

    async fn get_json(
        &self,
        suffix: &str,
        params: &[(String, String)],
    ) -> FetcherResult<serde_json::Value> {
        let url = format!("{}{}{}", self.base_url, DICTIONARIES_ENDPOINT, suffix);
        let response = self.transport.get(&url, params, METADATA_TIMEOUT).await?;
        if !response.is_success() {
            return Err(status_error(&response));
        }
        response.json()
    }
}
