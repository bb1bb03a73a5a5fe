mod bootstrap;
mod server;

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use mantis_core::models::SessionIdSource;
use mantis_core::settings::{Command, Settings};
use mantis_runtime::pipeline::{IngestReport, IngestionPipeline};
use mantis_store::LinkTarget;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load();

    bootstrap::ensure_directories(&settings)?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;

    tracing::info!("MANTIS ingest v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Database: {}, scratch: {}",
        settings.database_path().display(),
        settings.scratch_path().display()
    );

    let pipeline = Arc::new(bootstrap::build_pipeline(&settings)?);

    match settings.command() {
        Command::Serve => server::serve(&settings.bind, pipeline).await?,

        Command::Import {
            mantis,
            heart,
            device_ids,
        } => {
            let id_source = if device_ids {
                SessionIdSource::DeviceAssigned
            } else {
                SessionIdSource::Surrogate
            };
            let report = tokio::task::spawn_blocking(move || {
                import_mantis(&pipeline, &mantis, heart.as_deref(), id_source)
            })
            .await??;
            print_report(&report)?;
        }

        Command::ImportHeart { file, session_id } => {
            let report = tokio::task::spawn_blocking(move || {
                import_heart_rate(&pipeline, &file, LinkTarget::from(session_id))
            })
            .await??;
            print_report(&report)?;
        }
    }

    Ok(())
}

fn open(path: &Path) -> Result<File> {
    File::open(path).with_context(|| format!("opening {}", path.display()))
}

fn import_mantis(
    pipeline: &IngestionPipeline,
    mantis: &Path,
    heart: Option<&Path>,
    id_source: SessionIdSource,
) -> Result<IngestReport> {
    let heart = heart.map(open).transpose()?;
    let report = pipeline
        .ingest_mantis(open(mantis)?, heart, id_source)
        .with_context(|| format!("importing {}", mantis.display()))?;
    Ok(report)
}

fn import_heart_rate(
    pipeline: &IngestionPipeline,
    file: &Path,
    target: LinkTarget,
) -> Result<IngestReport> {
    let report = pipeline
        .ingest_heart_rate(open(file)?, target)
        .with_context(|| format!("importing {}", file.display()))?;
    Ok(report)
}

fn print_report(report: &IngestReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
