//! CSV recipient source.
//!
//! The header row names the fields; every following row becomes one [`Recipient`] in file
//! order. Short rows leave the missing trailing fields unset.

use domain_outreach::{ColumnMapping, OutreachError, OutreachResult, Recipient};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Rows loaded from a CSV file.
#[derive(Debug, Clone, Default)]
pub struct RecipientTable {
    pub headers: Vec<String>,
    pub rows: Vec<Recipient>,
}

impl RecipientTable {
    pub fn from_path(path: impl AsRef<Path>) -> OutreachResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            OutreachError::Source(format!("cannot open {}: {}", path.display(), e))
        })?;
        let table = Self::from_reader(file)?;
        debug!(path = %path.display(), rows = table.rows.len(), "Loaded recipients");
        Ok(table)
    }

    pub fn from_reader(reader: impl Read) -> OutreachResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut rows: Vec<Recipient> = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_error)?;
            rows.push(
                headers
                    .iter()
                    .zip(record.iter())
                    .map(|(h, v)| (h.clone(), v.to_string()))
                    .collect(),
            );
        }

        Ok(Self { headers, rows })
    }

    /// Every mapped column must be a header of the file.
    pub fn check_columns(&self, columns: &ColumnMapping) -> OutreachResult<()> {
        let mapped = std::iter::once(("address", Some(&columns.address)))
            .chain([("name", columns.name.as_ref()), ("company", columns.company.as_ref())]);

        for (role, column) in mapped {
            let Some(column) = column else { continue };
            if !self.headers.iter().any(|h| h == column) {
                return Err(OutreachError::configuration(format!(
                    "{} column '{}' not found; available columns: {}",
                    role,
                    column,
                    self.headers.join(", ")
                )));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn csv_error(e: csv::Error) -> OutreachError {
    match e.position() {
        Some(pos) => OutreachError::Source(format!("CSV error on line {}: {}", pos.line(), e)),
        None => OutreachError::Source(format!("CSV error: {}", e)),
    }
}
