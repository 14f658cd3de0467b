use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use highlighter_core::{DatasetTable, HighlightStore, HighlighterConfig};

#[derive(Parser, Debug)]
#[command(name = "highlighter", version, about = "Offline access to the highlight annotation store")]
struct Cli {
    /// TOML config file; defaults to ./highlighter.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    dataset: Option<PathBuf>,
    #[arg(long, global = true)]
    store: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the dataset's column names.
    Columns,
    /// Print one row by zero-based ordinal.
    Row { index: i64 },
    /// Validate a submission body and merge it into the store.
    Submit {
        /// JSON file with `selected_column` and `highlights`, or `-` for stdin.
        payload: PathBuf,
    },
    /// Print the accumulated store.
    Show,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    debug!(?config, "resolved config");
    let output = run(cli.command, &config)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<HighlighterConfig> {
    let mut config = HighlighterConfig::load(cli.config.as_deref())?;
    if let Some(dataset) = &cli.dataset {
        config.dataset_path = dataset.clone();
    }
    if let Some(store) = &cli.store {
        config.store_path = store.clone();
    }
    Ok(config)
}

fn run(command: Commands, config: &HighlighterConfig) -> Result<Value> {
    match command {
        Commands::Columns => {
            let table = load_table(config)?;
            Ok(json!({ "columns": table.columns() }))
        }
        Commands::Row { index } => {
            let table = load_table(config)?;
            let lookup = table.get_row(index)?;
            Ok(serde_json::to_value(lookup)?)
        }
        Commands::Submit { payload } => {
            let table = load_table(config)?;
            let body = read_payload(&payload)?;
            let store = HighlightStore::new(&config.store_path);
            let written = store.submit(&body, &table)?;
            Ok(json!({
                "message": format!(
                    "Highlights saved to {} successfully.",
                    store.path().display()
                ),
                "rows": written,
            }))
        }
        Commands::Show => {
            let store = HighlightStore::new(&config.store_path);
            Ok(serde_json::to_value(store.load()?)?)
        }
    }
}

/// Unlike the server, the CLI refuses to run against a dataset that failed
/// to load.
fn load_table(config: &HighlighterConfig) -> Result<DatasetTable> {
    DatasetTable::load(&config.dataset_path, config.delimiter_byte())
        .with_context(|| format!("failed to load dataset {}", config.dataset_path.display()))
}

fn read_payload(path: &Path) -> Result<Value> {
    let text = if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(path)
            .with_context(|| format!("failed to read payload {}", path.display()))?
    };
    serde_json::from_str(&text).map_err(|err| anyhow!("payload is not valid JSON: {err}"))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}
