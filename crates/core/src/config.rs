use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_CONFIG: &str = "highlighter.toml";
pub const DEFAULT_DATASET_PATH: &str = "data.csv";
pub const DEFAULT_STORE_PATH: &str = "highlights.json";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5001";

/// Process-wide settings, resolved once at startup and handed to the
/// table, store and server constructors.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HighlighterConfig {
    pub dataset_path: PathBuf,
    pub store_path: PathBuf,
    pub bind_addr: SocketAddr,
    /// Field delimiter; inferred from the dataset extension when unset.
    pub delimiter: Option<char>,
}

impl Default for HighlighterConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from(DEFAULT_DATASET_PATH),
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            bind_addr: default_bind_addr(),
            delimiter: None,
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5001))
}

impl HighlighterConfig {
    /// Resolves the configuration from defaults, the TOML file and the
    /// environment, in that order of precedence.
    ///
    /// `explicit` (or `HIGHLIGHTER_CONFIG`) must point at an existing file;
    /// the implicit `highlighter.toml` is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let named = explicit
            .map(Path::to_path_buf)
            .or_else(|| env::var_os("HIGHLIGHTER_CONFIG").map(PathBuf::from));
        let mut config = match named {
            Some(path) => Self::from_file(&path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG);
                if path.exists() {
                    Self::from_file(path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `HIGHLIGHTER_DATASET`, `HIGHLIGHTER_STORE` and `BIND_ADDR`
    /// as resolved by `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dataset) = lookup("HIGHLIGHTER_DATASET") {
            self.dataset_path = PathBuf::from(dataset);
        }
        if let Some(store) = lookup("HIGHLIGHTER_STORE") {
            self.store_path = PathBuf::from(store);
        }
        if let Some(addr) = lookup("BIND_ADDR") {
            self.bind_addr = addr.parse().map_err(|_| ConfigError::InvalidValue {
                key: "BIND_ADDR",
                value: addr.clone(),
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self.delimiter {
            Some(c) if !c.is_ascii() => Err(ConfigError::InvalidValue {
                key: "delimiter",
                value: c.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Delimiter byte handed to the CSV reader.
    pub fn delimiter_byte(&self) -> u8 {
        match self.delimiter {
            Some(c) if c.is_ascii() => c as u8,
            _ => infer_delimiter(&self.dataset_path),
        }
    }
}

fn infer_delimiter(path: &Path) -> u8 {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
        _ => b',',
    }
}
