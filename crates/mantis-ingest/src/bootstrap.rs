use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use mantis_core::settings::Settings;
use mantis_data::aggregator::SessionAggregator;
use mantis_data::cleaner::CsvCleaner;
use mantis_runtime::pipeline::IngestionPipeline;
use mantis_store::{ConnectionConfig, SessionStore};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Directory bootstrap ────────────────────────────────────────────────────────

/// Create the database's parent directory and the scratch directory.
pub fn ensure_directories(settings: &Settings) -> anyhow::Result<()> {
    if let Some(parent) = settings.database_path().parent() {
        create_dir(parent)?;
    }
    create_dir(&settings.scratch_path())?;
    Ok(())
}

fn create_dir(path: &Path) -> anyhow::Result<()> {
    if path.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(path).with_context(|| format!("creating {}", path.display()))
}

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map the CLI level names onto `EnvFilter` directives. `RUST_LOG`, when
/// set, wins over the CLI level.
fn filter_directive(log_level: &str) -> &'static str {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug",
        "WARNING" => "warn",
        "ERROR" | "CRITICAL" => "error",
        _ => "info",
    }
}

/// Initialise the global `tracing` subscriber: stderr always, plus an
/// append-mode plain-text copy when `log_file` is given.
pub fn setup_logging(log_level: &str, log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(log_level)));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .with(file_layer)
        .try_init()?;

    Ok(())
}

// ── Pipeline bootstrap ─────────────────────────────────────────────────────────

/// Open the store and wire up the ingestion pipeline from `settings`.
pub fn build_pipeline(settings: &Settings) -> anyhow::Result<IngestionPipeline> {
    let config = ConnectionConfig {
        pool_size: settings.pool_size,
        ..ConnectionConfig::default()
    };
    let store = SessionStore::open(&settings.database_path(), &config)?;

    Ok(IngestionPipeline::new(
        Arc::new(store),
        CsvCleaner::new(settings.scratch_path()),
        SessionAggregator::new(settings.user_id, settings.session_length_secs()),
    ))
}

// ── Tests ──────────────────────────────────────────────────────────────────────
