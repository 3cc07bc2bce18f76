//! Region (voivodeship) codes used to partition the registry
//!
//! The CEPiK API shards vehicle records by voivodeship. Each of the 16 regions
//! has a fixed two-digit code; the parallel downloader runs one partition per
//! code.

use std::fmt;

/// The 16 region codes with their display names, in API order.
pub const REGIONS: [(&str, &str); 16] = [
    ("02", "DOLNOŚLĄSKIE"),
    ("04", "KUJAWSKO-POMORSKIE"),
    ("06", "LUBELSKIE"),
    ("08", "LUBUSKIE"),
    ("10", "ŁÓDZKIE"),
    ("12", "MAŁOPOLSKIE"),
    ("14", "MAZOWIECKIE"),
    ("16", "OPOLSKIE"),
    ("18", "PODKARPACKIE"),
    ("20", "PODLASKIE"),
    ("22", "POMORSKIE"),
    ("24", "ŚLĄSKIE"),
    ("26", "ŚWIĘTOKRZYSKIE"),
    ("28", "WARMIŃSKO-MAZURSKIE"),
    ("30", "WIELKOPOLSKIE"),
    ("32", "ZACHODNIOPOMORSKIE"),
];

/// Validated region code (e.g. "12" for MAŁOPOLSKIE)
///
/// # Examples
///
/// ```
/// use registration_data_downloader::region::RegionCode;
///
/// let code = RegionCode::parse("12").unwrap();
/// assert_eq!(code.name(), "MAŁOPOLSKIE");
///
/// let by_name = RegionCode::from_name("małopolskie").unwrap();
/// assert_eq!(by_name, code);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionCode {
    code: &'static str,
    name: &'static str,
}

impl RegionCode {
    /// Parse a two-digit region code
    ///
    /// Single-digit input is zero-padded ("2" → "02").
    ///
    /// # Errors
    ///
    /// Returns an error if the code is empty or not one of the 16 known regions.
    pub fn parse(s: &str) -> Result<Self, RegionError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(RegionError::Empty);
        }

        let padded = if trimmed.len() == 1 {
            format!("0{trimmed}")
        } else {
            trimmed.to_string()
        };

        REGIONS
            .iter()
            .find(|(code, _)| *code == padded)
            .map(|&(code, name)| Self { code, name })
            .ok_or_else(|| RegionError::UnknownCode(trimmed.to_string()))
    }

    /// Look up a region by its display name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_uppercase();
        REGIONS
            .iter()
            .find(|(_, n)| *n == upper)
            .map(|&(code, name)| Self { code, name })
    }

    /// All 16 regions in API order
    pub fn all() -> Vec<Self> {
        REGIONS
            .iter()
            .map(|&(code, name)| Self { code, name })
            .collect()
    }

    /// Two-digit code sent as the `wojewodztwo` query parameter
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.code)
    }
}

/// Resolve a region code to its display name, passing unknown codes through.
pub fn region_name(code: &str) -> &str {
    REGIONS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
        .unwrap_or(code)
}

/// Errors that can occur during region code parsing
#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    /// No code given
    #[error("region code cannot be empty")]
    Empty,

    /// Code is not one of the known regions
    #[error("unknown region code: {0}")]
    UnknownCode(String),
}
