//! One-upload-at-a-time ingestion pipeline.
//!
//! Stage order for a MANTIS upload:
//!
//! 1. clean the banner into a scratch file,
//! 2. parse and aggregate the shots (and the attached heart-rate file, if
//!    any) so every validation error surfaces before the store is touched,
//! 3. replace the stored sessions,
//! 4. append the heart-rate rows linked to the new session,
//! 5. delete the scratch file, whether or not 1-4 succeeded.

use std::io::Read;
use std::sync::Arc;

use mantis_core::error::Result;
use mantis_core::models::SessionIdSource;
use mantis_data::aggregator::{HeartRateAggregate, SessionAggregate, SessionAggregator};
use mantis_data::cleaner::{CleanedCsv, CsvCleaner};
use mantis_data::reader::CsvRecordParser;
use mantis_store::{LinkTarget, SessionLinker, SessionStore};
use serde::Serialize;
use tracing::{debug, info, warn};

// ── IngestReport ──────────────────────────────────────────────────────────────

/// Outcome of a successful upload, returned to HTTP and CLI callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub message: String,
    pub session_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_shots: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_score: Option<f64>,
    pub heart_rate_rows: usize,
    /// Rows where a numeric field fell back to `0`.
    pub defaulted_rows: usize,
}

// ── IngestionPipeline ─────────────────────────────────────────────────────────

pub struct IngestionPipeline {
    store: Arc<SessionStore>,
    cleaner: CsvCleaner,
    aggregator: SessionAggregator,
}

impl IngestionPipeline {
    pub fn new(store: Arc<SessionStore>, cleaner: CsvCleaner, aggregator: SessionAggregator) -> Self {
        Self {
            store,
            cleaner,
            aggregator,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Ingest a raw MANTIS export in replace mode, optionally with the
    /// heart-rate export recorded alongside it.
    pub fn ingest_mantis<R, H>(
        &self,
        mantis: R,
        heart: Option<H>,
        id_source: SessionIdSource,
    ) -> Result<IngestReport>
    where
        R: Read,
        H: Read,
    {
        let cleaned = self.cleaner.clean(mantis)?;
        let result = self.ingest_cleaned(&cleaned, heart, id_source);
        // The ingest outcome takes precedence over a failed scratch removal.
        if let Err(err) = cleaned.close() {
            debug!("Ignoring scratch cleanup failure after ingest: {}", err);
        }
        result
    }

    fn ingest_cleaned<H: Read>(
        &self,
        cleaned: &CleanedCsv,
        heart: Option<H>,
        id_source: SessionIdSource,
    ) -> Result<IngestReport> {
        let rows = CsvRecordParser::read_shot_rows(cleaned.open()?)?;
        let SessionAggregate {
            session,
            shots,
            defaulted_rows,
        } = self.aggregator.aggregate_shots(&rows, id_source)?;

        let heart = match heart {
            Some(source) => Some(self.aggregate_heart(source)?),
            None => None,
        };

        let session_id = self.store.replace_with_session(&session, &shots)?;

        let (heart_rate_rows, heart_defaulted) = match heart {
            Some(mut hr) => {
                hr.link_to(session_id);
                (self.store.append_heart_rates(&hr.records)?, hr.defaulted_rows)
            }
            None => (0, 0),
        };

        info!(
            "Stored MANTIS session {}: {} shots, avg score {:.3}, {} heart-rate rows",
            session_id, session.total_shots, session.avg_score, heart_rate_rows
        );

        Ok(IngestReport {
            message: "MANTIS data uploaded successfully".to_string(),
            session_id,
            total_shots: Some(session.total_shots),
            avg_score: Some(session.avg_score),
            heart_rate_rows,
            defaulted_rows: defaulted_rows + heart_defaulted,
        })
    }

    /// Ingest a heart-rate export in append mode, linked to `target`.
    pub fn ingest_heart_rate<R: Read>(&self, source: R, target: LinkTarget) -> Result<IngestReport> {
        let mut heart = self.aggregate_heart(source)?;
        let session_id = SessionLinker::new(&self.store).resolve(target)?;
        heart.link_to(session_id);

        let heart_rate_rows = self.store.append_heart_rates(&heart.records)?;
        info!(
            "Appended {} heart-rate rows to session {}",
            heart_rate_rows, session_id
        );

        Ok(IngestReport {
            message: "Heart rate data uploaded successfully".to_string(),
            session_id,
            total_shots: None,
            avg_score: None,
            heart_rate_rows,
            defaulted_rows: heart.defaulted_rows,
        })
    }

    fn aggregate_heart<R: Read>(&self, source: R) -> Result<HeartRateAggregate> {
        let batch = CsvRecordParser::read_heart_rate_batch(source)?;
        let aggregate = self.aggregator.aggregate_heart_rate(&batch, None)?;
        if aggregate.defaulted_rows > 0 {
            warn!(
                "{} heart-rate rows ({}) stored with defaulted values",
                aggregate.defaulted_rows,
                batch.schema()
            );
        }
        Ok(aggregate)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
