//! Flattening records into table rows
//!
//! Each record becomes one [`TableRow`]: its attributes plus `id` and, when
//! tagged, `batch`. Region codes gain a display-name column, models lose a
//! leading brand prefix and the known numeric attributes are coerced to
//! decimals (unparseable values become [`Cell::Missing`]).

use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::fetcher::cepik_config::{
    ATTR_BRAND, ATTR_MODEL, ATTR_REGION_CODE, ATTR_REGION_NAME, NUMERIC_ATTRIBUTES,
    UNKNOWN_VALUE_PLACEHOLDER,
};
use crate::region::region_name;
use crate::Record;

/// Record identifier column
pub const ID_COLUMN: &str = "id";

/// Batch tag column
pub const BATCH_COLUMN: &str = "batch";

/// One table cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    /// Text value
    Text(String),
    /// Coerced numeric value
    Number(Decimal),
    /// Null or unparseable
    Missing,
}

impl Cell {
    /// Numeric value, if any
    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Text value, if any
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{}", n.normalize()),
            Self::Missing => Ok(()),
        }
    }
}

/// One flattened record, columns in sorted order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRow {
    /// Cells by column name
    pub cells: BTreeMap<String, Cell>,
}

impl TableRow {
    /// Cell of `column`
    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.cells.get(column)
    }
}

/// Flatten records into rows
pub fn to_table(records: &[Record]) -> Vec<TableRow> {
    records.iter().map(to_row).collect()
}

fn to_row(record: &Record) -> TableRow {
    let mut cells: BTreeMap<String, Cell> = record
        .attributes
        .iter()
        .map(|(key, value)| (key.clone(), value_cell(value)))
        .collect();

    cells.insert(ID_COLUMN.to_string(), Cell::Text(record.id.clone()));
    if let Some(batch) = record.batch {
        cells.insert(BATCH_COLUMN.to_string(), Cell::Number(Decimal::from(batch)));
    }

    if let Some(code) = record.attribute_text(ATTR_REGION_CODE) {
        cells.insert(
            ATTR_REGION_NAME.to_string(),
            Cell::Text(region_name(&code).to_string()),
        );
    }

    if let (Some(brand), Some(model)) = (
        record.attribute_text(ATTR_BRAND),
        record.attribute_text(ATTR_MODEL),
    ) {
        cells.insert(
            ATTR_MODEL.to_string(),
            Cell::Text(normalize_model_name(&brand, &model)),
        );
    }

    for column in NUMERIC_ATTRIBUTES {
        if let Some(cell) = cells.get_mut(column) {
            *cell = coerce_numeric(cell);
        }
    }

    TableRow { cells }
}

fn value_cell(value: &Value) -> Cell {
    match value {
        Value::Null => Cell::Missing,
        Value::String(s) => Cell::Text(s.clone()),
        Value::Number(n) => Cell::Text(n.to_string()),
        Value::Bool(b) => Cell::Text(b.to_string()),
        nested => Cell::Text(nested.to_string()),
    }
}

fn coerce_numeric(cell: &Cell) -> Cell {
    match cell {
        Cell::Text(s) => parse_decimal(s).map_or(Cell::Missing, Cell::Number),
        other => other.clone(),
    }
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}

/// Strip a leading brand from a model name
///
/// The match is case-insensitive; dashes and spaces after the brand are
/// dropped too. If nothing would remain, the model is returned unchanged.
///
/// ```
/// use registration_data_downloader::output::table::normalize_model_name;
///
/// assert_eq!(normalize_model_name("TOYOTA", "TOYOTA COROLLA"), "COROLLA");
/// assert_eq!(normalize_model_name("TOYOTA", "TOYOTA"), "TOYOTA");
/// assert_eq!(normalize_model_name("fiat", "Fiat - 126p"), "126p");
/// ```
pub fn normalize_model_name(brand: &str, model: &str) -> String {
    let brand = brand.trim();
    let trimmed_model = model.trim();
    if brand.is_empty() || trimmed_model.is_empty() {
        return model.to_string();
    }
    if !trimmed_model.to_uppercase().starts_with(&brand.to_uppercase()) {
        return model.to_string();
    }

    let rest: String = trimmed_model.chars().skip(brand.chars().count()).collect();
    let stripped = rest.trim().trim_start_matches(['-', ' ']);
    if stripped.is_empty() {
        model.to_string()
    } else {
        stripped.to_string()
    }
}

/// Union of columns over `rows`: `id` first, `batch` last, the rest sorted
pub fn columns(rows: &[TableRow]) -> Vec<String> {
    let mut names: BTreeSet<&str> = BTreeSet::new();
    for row in rows {
        names.extend(row.cells.keys().map(String::as_str));
    }
    let has_batch = names.remove(BATCH_COLUMN);
    names.remove(ID_COLUMN);

    let mut ordered = vec![ID_COLUMN.to_string()];
    ordered.extend(names.into_iter().map(str::to_string));
    if has_batch {
        ordered.push(BATCH_COLUMN.to_string());
    }
    ordered
}

/// Distinct brands, sorted, without the `---` placeholder
pub fn brands_in(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.attribute_text(ATTR_BRAND))
        .filter(|b| !b.is_empty() && b != UNKNOWN_VALUE_PLACEHOLDER)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Distinct models, sorted, optionally limited to one brand (case-insensitive)
pub fn models_in(records: &[Record], brand: Option<&str>) -> Vec<String> {
    let brand = brand.map(str::to_uppercase);
    records
        .iter()
        .filter(|r| match &brand {
            Some(wanted) => r
                .attribute_text(ATTR_BRAND)
                .is_some_and(|b| b.to_uppercase() == *wanted),
            None => true,
        })
        .filter_map(|r| r.attribute_text(ATTR_MODEL))
        .filter(|m| !m.is_empty() && m != UNKNOWN_VALUE_PLACEHOLDER)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
