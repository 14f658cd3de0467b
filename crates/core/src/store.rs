use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{error, info, warn};

use crate::error::{HighlightError, StoreError};
use crate::highlights::{ingest, StoredHighlights};
use crate::table::DatasetTable;

/// JSON file mapping row `id` to canonical token indices.
///
/// Every write reads the current file, merges the new entries over it and
/// replaces the file as a whole. Writers inside one process are serialized;
/// separate processes sharing the file are not coordinated.
#[derive(Debug)]
pub struct HighlightStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl HighlightStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current contents of the store; empty when the file does not exist.
    pub fn load(&self) -> Result<StoredHighlights, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(StoredHighlights::new())
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Merges `new_entries` into the file, overwriting only the keys they
    /// contain, and returns the merged map. On failure the previous file is
    /// left untouched.
    pub fn persist(&self, new_entries: &StoredHighlights) -> Result<StoredHighlights, StoreError> {
        let _guard = self.write_lock.lock();
        let mut merged = self.load()?;
        for (id, indices) in new_entries {
            merged.insert(id.clone(), indices.clone());
        }
        self.write_atomic(&merged)?;
        Ok(merged)
    }

    /// Writes through a temp file renamed over the target. The target is
    /// the file a symlinked store path points at, and an existing file's
    /// permissions carry over to the replacement.
    fn write_atomic(&self, contents: &StoredHighlights) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        let target = self.resolve_target().map_err(io_err)?;
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        match fs::metadata(&target) {
            Ok(meta) => tmp
                .as_file()
                .set_permissions(meta.permissions())
                .map_err(io_err)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(io_err(source)),
        }
        tmp.write_all(&to_pretty_json(contents)?).map_err(io_err)?;
        tmp.flush().map_err(io_err)?;
        tmp.persist(&target).map_err(|err| io_err(err.error))?;
        Ok(())
    }

    fn resolve_target(&self) -> io::Result<PathBuf> {
        match fs::canonicalize(&self.path) {
            Ok(path) => Ok(path),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                // Dangling symlink: create the file it names.
                match fs::symlink_metadata(&self.path) {
                    Ok(meta) if meta.file_type().is_symlink() => {
                        let link = fs::read_link(&self.path)?;
                        let base = self.path.parent().unwrap_or_else(|| Path::new("."));
                        Ok(base.join(link))
                    }
                    _ => Ok(self.path.clone()),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Validates a request body, reshapes it and persists the result.
    /// Returns the number of row ids written.
    pub fn submit(&self, body: &Value, table: &DatasetTable) -> Result<usize, HighlightError> {
        let entries = ingest(body, table).map_err(|err| {
            warn!(error = %err, "rejected highlight submission");
            err
        })?;
        self.persist(&entries).map_err(|err| {
            error!(path = %self.path.display(), error = %err, "failed to persist highlights");
            HighlightError::Persistence(err)
        })?;
        info!(path = %self.path.display(), entries = entries.len(), "highlights saved");
        Ok(entries.len())
    }
}

fn to_pretty_json(value: &impl Serialize) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut ser)?;
    Ok(buf)
}
