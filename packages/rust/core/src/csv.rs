//! Tabular vocabulary data → ordered rows.

use std::fs::File;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use harvester_shared::{DataRow, HarvesterError, Result};
use tracing::{debug, instrument, warn};

/// A data row that could not be converted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    /// 1-based line the row starts on.
    pub line: u64,
    pub message: String,
}

/// Result of converting one data file.
#[derive(Debug, Clone, Default)]
pub struct CsvOutcome {
    /// Header names, trimmed, in file order.
    pub columns: Vec<String>,
    pub rows: Vec<DataRow>,
    /// Rows skipped because they did not match the header.
    pub errors: Vec<RowError>,
}

/// Reads delimited text with a header row.
#[derive(Debug, Clone, Copy)]
pub struct CsvParser {
    delimiter: u8,
}

impl Default for CsvParser {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl CsvParser {
    /// A parser for `delimiter`, which must be a single ASCII character.
    pub fn new(delimiter: char) -> Result<Self> {
        let delimiter = u8::try_from(delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                HarvesterError::config(format!("CSV delimiter '{delimiter}' is not ASCII"))
            })?;
        Ok(Self { delimiter })
    }

    /// Converts every data row into a header→value mapping.
    ///
    /// Rows whose field count differs from the header are recorded in
    /// [`CsvOutcome::errors`] and skipped. A missing or empty header fails
    /// the whole file.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn convert_csv_to_json(&self, path: &Path) -> Result<CsvOutcome> {
        let file = File::open(path).map_err(|e| HarvesterError::io(path, e))?;
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .flexible(true)
            .trim(Trim::Headers)
            .from_reader(file);

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| HarvesterError::parse(path, format!("unreadable header: {e}")))?
            .iter()
            .map(str::to_owned)
            .collect();
        if columns.iter().all(String::is_empty) {
            return Err(HarvesterError::parse(path, "missing or empty header row"));
        }

        let mut outcome = CsvOutcome {
            columns,
            ..CsvOutcome::default()
        };

        for record in reader.records() {
            match record {
                Ok(record) => match to_row(&outcome.columns, &record) {
                    Ok(row) => outcome.rows.push(row),
                    Err(message) => {
                        let line = record.position().map_or(0, |p| p.line());
                        warn!(line, %message, "skipping malformed row");
                        outcome.errors.push(RowError { line, message });
                    }
                },
                Err(e) => {
                    let line = e.position().map_or(0, |p| p.line());
                    warn!(line, error = %e, "skipping unreadable row");
                    outcome.errors.push(RowError {
                        line,
                        message: e.to_string(),
                    });
                }
            }
        }

        debug!(
            rows = outcome.rows.len(),
            errors = outcome.errors.len(),
            "converted data file"
        );
        Ok(outcome)
    }
}

fn to_row(columns: &[String], record: &StringRecord) -> std::result::Result<DataRow, String> {
    if record.len() != columns.len() {
        return Err(format!(
            "expected {} fields, found {}",
            columns.len(),
            record.len()
        ));
    }
    Ok(columns
        .iter()
        .map(String::as_str)
        .zip(record.iter())
        .collect())
}
