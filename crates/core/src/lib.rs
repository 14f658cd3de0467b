mod config;
mod error;
mod highlights;
mod store;
mod table;

pub use config::{
    HighlighterConfig, DEFAULT_BIND_ADDR, DEFAULT_CONFIG, DEFAULT_DATASET_PATH, DEFAULT_STORE_PATH,
};
pub use error::{ConfigError, HighlightError, Result, RowError, StoreError, TableError};
pub use highlights::{ingest, HighlightSubmission, StoredHighlights, SubmissionEntry};
pub use store::HighlightStore;
pub use table::{DatasetTable, Row, RowLookup, ID_COLUMN};
