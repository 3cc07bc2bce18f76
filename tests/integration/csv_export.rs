//! Integration tests for table conversion and CSV export

use serde_json::{json, Value};
use tempfile::TempDir;

use registration_data_downloader::output::csv::write_table;
use registration_data_downloader::output::table::{columns, to_table, Cell};
use registration_data_downloader::Record;

fn record(id: &str, batch: u64, attrs: Value) -> Record {
    let mut record = Record::new(id, attrs.as_object().cloned().unwrap());
    record.batch = Some(batch);
    record
}

fn sample() -> Vec<Record> {
    vec![
        record(
            "1",
            1,
            json!({
                "marka": "TOYOTA",
                "model": "TOYOTA COROLLA",
                "wojewodztwo-kod": "14",
                "pojemnosc-skokowa-silnika": "1598.00",
                "masa-wlasna": "brak"
            }),
        ),
        record(
            "2",
            2,
            json!({
                "marka": "FIAT",
                "model": "PANDA",
                "wojewodztwo-kod": "12",
                "pojemnosc-skokowa-silnika": 1242
            }),
        ),
    ]
}

#[test]
fn test_rows_are_normalized() {
    let rows = to_table(&sample());

    assert_eq!(rows[0].get("model"), Some(&Cell::Text("COROLLA".into())));
    assert_eq!(
        rows[0].get("wojewodztwo"),
        Some(&Cell::Text("MAZOWIECKIE".into()))
    );
    assert_eq!(
        rows[0]
            .get("pojemnosc-skokowa-silnika")
            .and_then(Cell::as_number)
            .map(|n| n.normalize().to_string()),
        Some("1598".to_string())
    );
    assert_eq!(rows[0].get("masa-wlasna"), Some(&Cell::Missing));
    assert_eq!(
        rows[1]
            .get("pojemnosc-skokowa-silnika")
            .and_then(Cell::as_number)
            .map(|n| n.to_string()),
        Some("1242".to_string())
    );
}

#[test]
fn test_column_order_id_first_batch_last() {
    let cols = columns(&to_table(&sample()));
    assert_eq!(cols.first().map(String::as_str), Some("id"));
    assert_eq!(cols.last().map(String::as_str), Some("batch"));
    assert!(cols.contains(&"wojewodztwo".to_string()));
}

#[test]
fn test_write_table_to_nested_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("exports").join("cepik.csv");

    let written = write_table(&path, &to_table(&sample())).unwrap();
    assert_eq!(written, 2);

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let headers = reader.headers().unwrap().clone();
    assert_eq!(headers.get(0), Some("id"));
    assert_eq!(headers.get(headers.len() - 1), Some("batch"));

    let model = headers.iter().position(|h| h == "model").unwrap();
    let mass = headers.iter().position(|h| h == "masa-wlasna").unwrap();
    let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(&rows[0][model], "COROLLA");
    assert_eq!(&rows[0][mass], "");
    assert_eq!(&rows[1][mass], "");
    assert_eq!(&rows[1][headers.len() - 1], "2");
}

#[test]
fn test_empty_table_writes_id_header_only() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.csv");

    assert_eq!(write_table(&path, &[]).unwrap(), 0);
    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content, "id\n");
}
