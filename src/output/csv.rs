//! CSV export of normalized rows

use csv::Writer;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use super::table::{columns, TableRow};
use super::{OutputError, OutputResult, OutputWriter};

const DEFAULT_BUFFER_SIZE: usize = 8192; // 8KB buffer

/// Flush after this many rows
const FLUSH_EVERY: u64 = 1_000;

/// CSV writer with a fixed header
///
/// Cells missing from a row are written empty. Columns not in the header
/// are ignored.
pub struct CsvTableWriter<W: Write> {
    writer: Writer<W>,
    columns: Vec<String>,
    rows_written: u64,
}

impl CsvTableWriter<BufWriter<File>> {
    /// Create `path` (and its parent directories) and write the header
    pub fn create<P: AsRef<Path>>(path: P, columns: Vec<String>) -> OutputResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), columns = columns.len(), "Creating CSV writer");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    OutputError::IoError(format!("Failed to create directory: {e}"))
                })?;
            }
        }

        let file = File::create(path)
            .map_err(|e| OutputError::IoError(format!("Failed to create file: {e}")))?;
        Self::from_writer(BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file), columns)
    }
}

impl<W: Write> CsvTableWriter<W> {
    /// Wrap any writer and write the header
    pub fn from_writer(inner: W, columns: Vec<String>) -> OutputResult<Self> {
        let mut writer = Writer::from_writer(inner);
        writer
            .write_record(&columns)
            .map_err(|e| OutputError::CsvError(format!("Failed to write header: {e}")))?;
        Ok(Self {
            writer,
            columns,
            rows_written: 0,
        })
    }

    /// Write one row in header order
    pub fn write_row(&mut self, row: &TableRow) -> OutputResult<()> {
        let fields = self
            .columns
            .iter()
            .map(|column| row.get(column).map(|c| c.to_string()).unwrap_or_default());
        self.writer
            .write_record(fields)
            .map_err(|e| OutputError::CsvError(format!("Failed to write row: {e}")))?;

        self.rows_written += 1;
        if self.rows_written % FLUSH_EVERY == 0 {
            self.flush()?;
            debug!(rows = self.rows_written, "CSV progress");
        }
        Ok(())
    }

    /// Rows written so far
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Header columns
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl<W: Write> OutputWriter for CsvTableWriter<W> {
    fn flush(&mut self) -> OutputResult<()> {
        self.writer
            .flush()
            .map_err(|e| OutputError::FlushError(format!("Failed to flush: {e}")))
    }

    fn close(mut self) -> OutputResult<()> {
        self.flush()?;
        let mut inner = self
            .writer
            .into_inner()
            .map_err(|e| OutputError::IoError(format!("Failed to get inner writer: {e}")))?;
        inner
            .flush()
            .map_err(|e| OutputError::FlushError(format!("Failed to flush: {e}")))?;
        debug!(rows = self.rows_written, "CSV writer closed");
        Ok(())
    }
}

/// Write `rows` to `path` with the union of their columns as header
///
/// Returns the number of rows written.
pub fn write_table<P: AsRef<Path>>(path: P, rows: &[TableRow]) -> OutputResult<u64> {
    let mut writer = CsvTableWriter::create(path, columns(rows))?;
    for row in rows {
        writer.write_row(row)?;
    }
    let written = writer.rows_written();
    writer.close()?;
    Ok(written)
}
