use std::path::PathBuf;

use thiserror::Error;

/// Failure to load the dataset table. The table falls back to empty when
/// this happens, so these never reach a client directly.
#[derive(Error, Debug)]
pub enum TableError {
    #[error("io error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv error in {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("dataset must contain an 'id' column")]
    MissingIdColumn,
    #[error("duplicate column name {0:?}")]
    DuplicateColumn(String),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowError {
    #[error("Row index out of range")]
    OutOfRange { index: i64, total_rows: usize },
}

/// Rejections and failures of a highlight submission. The display strings
/// are the messages returned to clients.
#[derive(Error, Debug)]
pub enum HighlightError {
    #[error("No data provided.")]
    NoData,
    #[error("selected_column is missing.")]
    MissingColumn,
    #[error("highlights data is missing.")]
    MissingHighlights,
    #[error("highlights must be an object keyed by row index.")]
    InvalidHighlights,
    #[error("selected_column \"{0}\" does not exist in the CSV.")]
    InvalidColumn(String),
    #[error("Invalid data format for row {0}.")]
    MalformedEntry(String),
    #[error("Non-integer token index in row {0}.")]
    NonIntegerIndex(String),
    #[error("Negative token index in row {0}.")]
    NegativeIndex(String),
    #[error("Token indices must be even numbers in row {0}.")]
    OddIndex(String),
    #[error("Invalid row index {0}.")]
    InvalidRowKey(String),
    #[error("Row index {0} out of range.")]
    RowOutOfRange(u64),
    #[error("Failed to save highlights to JSON file.")]
    Persistence(#[source] StoreError),
}

impl HighlightError {
    /// HTTP status code the error maps to at the request boundary.
    pub fn status(&self) -> u16 {
        match self {
            HighlightError::Persistence(_) => 500,
            _ => 400,
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("store file {path:?} is not a valid highlight map: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("serde json error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path:?}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

pub type Result<T, E = HighlightError> = std::result::Result<T, E>;
