use std::collections::HashSet;
use std::fs;
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::HighlighterConfig;
use crate::error::{RowError, TableError};

pub const ID_COLUMN: &str = "id";

/// A row as returned to clients: column name to raw string value, in
/// column order.
pub type Row = IndexMap<String, String>;

/// In-memory dataset, immutable once loaded. Every field is kept as the
/// raw string found in the file.
#[derive(Debug, Clone, Default)]
pub struct DatasetTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    id_column: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowLookup {
    pub row: Row,
    pub total_rows: usize,
}

impl DatasetTable {
    pub fn load(path: &Path, delimiter: u8) -> Result<Self, TableError> {
        let file = fs::File::open(path).map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(path, file, delimiter)
    }

    /// Loads the configured dataset, degrading to an empty table when the
    /// file is unreadable, malformed or lacks an `id` column.
    pub fn load_or_empty(config: &HighlighterConfig) -> Self {
        match Self::load(&config.dataset_path, config.delimiter_byte()) {
            Ok(table) => {
                info!(
                    path = %config.dataset_path.display(),
                    rows = table.total_rows(),
                    columns = ?table.columns,
                    "loaded dataset"
                );
                table
            }
            Err(err) => {
                error!(path = %config.dataset_path.display(), error = %err, "failed to load dataset");
                Self::default()
            }
        }
    }

    pub fn from_reader<R: Read>(path: &Path, reader: R, delimiter: u8) -> Result<Self, TableError> {
        let csv_err = |source| TableError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .from_reader(reader);
        let columns = reader
            .headers()
            .map(|h| h.iter().map(|cell| cell.to_string()).collect::<Vec<_>>())
            .map_err(csv_err)?;
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(TableError::DuplicateColumn(column.clone()));
            }
        }
        let id_column = columns
            .iter()
            .position(|c| c == ID_COLUMN)
            .ok_or(TableError::MissingIdColumn)?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_err)?;
            rows.push(record.iter().map(|cell| cell.to_string()).collect::<Vec<_>>());
        }

        let table = Self {
            columns,
            rows,
            id_column,
        };
        table.warn_duplicate_ids();
        Ok(table)
    }

    fn warn_duplicate_ids(&self) {
        let mut seen = HashSet::new();
        for (ordinal, row) in self.rows.iter().enumerate() {
            let id = &row[self.id_column];
            if !seen.insert(id.as_str()) {
                warn!(id = %id, ordinal, "duplicate row id; highlights for it will collide");
            }
        }
    }

    pub fn total_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// `id` of the row at `ordinal`, if it exists.
    pub fn row_id(&self, ordinal: usize) -> Option<&str> {
        self.rows
            .get(ordinal)
            .map(|row| row[self.id_column].as_str())
    }

    pub fn get_row(&self, index: i64) -> Result<RowLookup, RowError> {
        let total_rows = self.total_rows();
        let out_of_range = RowError::OutOfRange { index, total_rows };
        let ordinal = usize::try_from(index).map_err(|_| out_of_range)?;
        let values = self.rows.get(ordinal).ok_or(out_of_range)?;
        let row = self
            .columns
            .iter()
            .cloned()
            .zip(values.iter().cloned())
            .collect();
        Ok(RowLookup { row, total_rows })
    }
}
