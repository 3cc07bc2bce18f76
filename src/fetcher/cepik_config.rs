//! CEPiK API configuration
//!
//! Endpoint paths, query parameter names, attribute keys and timeouts for the
//! public CEPiK REST API. Everything wire-specific lives here so the fetcher
//! and parser stay free of string literals.

use std::time::Duration;

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.cepik.gov.pl";

/// Environment variable overriding the base URL
pub const BASE_URL_ENV: &str = "CEPIK_API_URL";

/// Vehicle records endpoint
pub const VEHICLES_ENDPOINT: &str = "/pojazdy";

/// Dictionary index endpoint; `/{name}` is appended for a single dictionary
pub const DICTIONARIES_ENDPOINT: &str = "/slowniki";

/// Maximum page size accepted by the API
pub const PAGE_LIMIT: u32 = 500;

/// Page size used when listing dictionaries
pub const DICTIONARY_INDEX_LIMIT: u32 = 100;

/// Hard cap on pages per partition
pub const MAX_PAGES: u32 = 10_000;

/// Timeout for record page requests
pub const RECORDS_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for dictionary and other metadata requests
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Connect timeout shared by all requests
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Date format for `data-od` / `data-do`
pub const API_DATE_FORMAT: &str = "%Y%m%d";

/// Dictionary served through its own accessor
pub const REGIONS_DICTIONARY: &str = "wojewodztwa";

/// Dictionary whose purely numeric entries are dropped
pub const PRODUCTION_METHOD_DICTIONARY: &str = "sposob-produkcji";

/// Response header carrying the remaining request quota
pub const REMAINING_QUOTA_HEADER: &str = "x-ratelimit-remaining";

// Query parameters
/// Region code parameter
pub const PARAM_REGION: &str = "wojewodztwo";
/// Range start parameter
pub const PARAM_DATE_FROM: &str = "data-od";
/// Range end parameter
pub const PARAM_DATE_TO: &str = "data-do";
/// Page size parameter
pub const PARAM_LIMIT: &str = "limit";
/// Page number parameter
pub const PARAM_PAGE: &str = "page";

// Record attributes
/// Brand
pub const ATTR_BRAND: &str = "marka";
/// Model
pub const ATTR_MODEL: &str = "model";
/// Production year
pub const ATTR_PRODUCTION_YEAR: &str = "rok-produkcji";
/// Region code
pub const ATTR_REGION_CODE: &str = "wojewodztwo-kod";
/// Region display name, added by the normalizer
pub const ATTR_REGION_NAME: &str = "wojewodztwo";

/// Attributes coerced to numbers in tabular output
pub const NUMERIC_ATTRIBUTES: [&str; 7] = [
    "pojemnosc-skokowa-silnika",
    "masa-wlasna",
    ATTR_PRODUCTION_YEAR,
    "liczba-miejsc-siedzacych",
    "masa-calkowita",
    "dopuszczalna-ladownosc",
    "liczba-osi",
];

/// Placeholder the API uses for unknown brand/model values
pub const UNKNOWN_VALUE_PLACEHOLDER: &str = "---";

/// Build the `filter[<field>]` parameter name
pub fn filter_param(field: &str) -> String {
    format!("filter[{field}]")
}

/// Base URL from `CEPIK_API_URL`, falling back to [`DEFAULT_BASE_URL`]
pub fn base_url_from_env() -> String {
    std::env::var(BASE_URL_ENV)
        .ok()
        .map(|v| v.trim().trim_end_matches('/').to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}
