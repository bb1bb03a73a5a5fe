//! Session-level reduction of parsed MANTIS and heart-rate batches.
//!
//! Numeric cells that fail to parse were already defaulted to `0` by the
//! reader. The aggregator keeps that lossy policy and counts the affected
//! rows in `defaulted_rows` so callers can report them.

use chrono::{DateTime, Utc};
use mantis_core::data_processors::{FieldParser, TimestampProcessor};
use mantis_core::error::{IngestError, Result};
use mantis_core::models::{
    CsvSchema, HeartRateRecord, HeartRateSample, HeartRateSummaryRow, NewShot, SessionIdSource,
    ShotRow, ShotSessionRecord, DEFAULT_SESSION_LENGTH_SECS, DEFAULT_USER_ID,
};
use tracing::warn;

use crate::reader::HeartRateBatch;

// ── Aggregates ────────────────────────────────────────────────────────────────

/// One MANTIS batch reduced to its session row plus the shots to attach.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionAggregate {
    pub session: ShotSessionRecord,
    pub shots: Vec<NewShot>,
    /// Rows whose score fell back to `0`.
    pub defaulted_rows: usize,
}

/// Heart-rate rows ready to append.
#[derive(Debug, Clone, PartialEq)]
pub struct HeartRateAggregate {
    pub records: Vec<HeartRateRecord>,
    /// Input rows with at least one defaulted numeric field.
    pub defaulted_rows: usize,
}

impl HeartRateAggregate {
    /// Point every record at `session_id`.
    pub fn link_to(&mut self, session_id: i64) {
        for record in &mut self.records {
            record.session_id = Some(session_id);
        }
    }
}

// ── SessionAggregator ─────────────────────────────────────────────────────────

/// Reduces parsed batches into records the store can write.
#[derive(Debug, Clone)]
pub struct SessionAggregator {
    user_id: i64,
    placeholder_length_secs: i64,
}

impl Default for SessionAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_USER_ID, DEFAULT_SESSION_LENGTH_SECS)
    }
}

impl SessionAggregator {
    pub fn new(user_id: i64, placeholder_length_secs: i64) -> Self {
        Self {
            user_id,
            placeholder_length_secs,
        }
    }

    /// Reduce a MANTIS batch into one session.
    ///
    /// * `Surrogate` – the store assigns the id; length is the placeholder.
    /// * `DeviceAssigned` – the first row's `ID` becomes the session id and
    ///   the length is the span between the first and last `Date`.
    pub fn aggregate_shots(
        &self,
        rows: &[ShotRow],
        id_source: SessionIdSource,
    ) -> Result<SessionAggregate> {
        let (first, last) = match (rows.first(), rows.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return Err(IngestError::NoValidRows {
                    schema: CsvSchema::Mantis,
                })
            }
        };

        let total_shots = u32::try_from(rows.len())
            .map_err(|_| IngestError::Inconsistent(format!("{} shots in one batch", rows.len())))?;
        let avg_score = mean(rows.iter().map(|r| r.score));
        let time_started = parse_required_timestamp(&first.date, "first row Date")?;

        let (session_id, session_length_secs) = match id_source {
            SessionIdSource::Surrogate => (None, self.placeholder_length_secs),
            SessionIdSource::DeviceAssigned => {
                let id = FieldParser::int(Some(&first.device_id));
                if id.defaulted || id.value <= 0 {
                    return Err(IngestError::Inconsistent(format!(
                        "device session ID '{}' is not a positive integer",
                        first.device_id
                    )));
                }
                let ended = parse_required_timestamp(&last.date, "last row Date")?;
                (Some(id.value), session_length(time_started, ended)?)
            }
        };

        let defaulted_rows = rows.iter().filter(|r| r.defaulted).count();
        if defaulted_rows > 0 {
            warn!(
                "{} of {} MANTIS rows had a non-numeric Score; counted as 0",
                defaulted_rows, total_shots
            );
        }

        Ok(SessionAggregate {
            session: ShotSessionRecord {
                session_id,
                user_id: self.user_id,
                total_shots,
                avg_score,
                time_started,
                session_length_secs,
            },
            shots: rows
                .iter()
                .map(|r| NewShot {
                    split: r.split.clone(),
                    score: r.score,
                })
                .collect(),
            defaulted_rows,
        })
    }

    /// Reduce per-sample heart-rate rows into a single record.
    pub fn aggregate_heart_samples(
        &self,
        samples: &[HeartRateSample],
        session_id: Option<i64>,
    ) -> Result<HeartRateAggregate> {
        let (first, last) = match (samples.first(), samples.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return Err(IngestError::NoValidRows {
                    schema: CsvSchema::HeartRateSamples,
                })
            }
        };

        let time_started = parse_required_timestamp(&first.timestamp, "first sample timestamp")?;
        let ended = parse_required_timestamp(&last.timestamp, "last sample timestamp")?;
        let session_length_secs = session_length(time_started, ended)?;

        let max_rate = samples.iter().map(|s| s.rate).fold(f64::MIN, f64::max);
        let min_rate = samples.iter().map(|s| s.rate).fold(f64::MAX, f64::min);
        // Float rounding in the mean must not break min <= avg <= max.
        let avg_rate = mean(samples.iter().map(|s| s.rate)).clamp(min_rate, max_rate);

        let defaulted_rows = samples.iter().filter(|s| s.defaulted).count();
        if defaulted_rows > 0 {
            warn!(
                "{} of {} heart-rate samples had a non-numeric rate; counted as 0",
                defaulted_rows,
                samples.len()
            );
        }

        Ok(HeartRateAggregate {
            records: vec![HeartRateRecord {
                session_id,
                user_id: self.user_id,
                time_started,
                avg_rate,
                max_rate,
                min_rate,
                session_length_secs,
            }],
            defaulted_rows,
        })
    }

    /// Convert pre-aggregated rows one-to-one into records.
    pub fn summarize_heart_rows(
        &self,
        rows: &[HeartRateSummaryRow],
        session_id: Option<i64>,
    ) -> Result<HeartRateAggregate> {
        if rows.is_empty() {
            return Err(IngestError::NoValidRows {
                schema: CsvSchema::HeartRateSummary,
            });
        }

        let mut records = Vec::with_capacity(rows.len());
        for (idx, row) in rows.iter().enumerate() {
            if row.session_length_secs < 0 {
                return Err(IngestError::Inconsistent(format!(
                    "heart-rate row {} has negative session_length {}",
                    idx + 1,
                    row.session_length_secs
                )));
            }
            let record = HeartRateRecord {
                session_id,
                user_id: row.user_id,
                time_started: parse_required_timestamp(
                    &row.time_started,
                    &format!("heart-rate row {} time_started", idx + 1),
                )?,
                avg_rate: row.avg_rate,
                max_rate: row.max_rate,
                min_rate: row.min_rate,
                session_length_secs: row.session_length_secs,
            };
            // A defaulted rate cell becomes 0 and usually lands here.
            if !record.rates_ordered() {
                return Err(IngestError::Inconsistent(format!(
                    "heart-rate row {} has min_rate {} / avg_rate {} / max_rate {}; \
                     expected min <= avg <= max",
                    idx + 1,
                    row.min_rate,
                    row.avg_rate,
                    row.max_rate
                )));
            }
            records.push(record);
        }

        let defaulted_rows = rows.iter().filter(|r| r.defaulted).count();
        if defaulted_rows > 0 {
            warn!(
                "{} of {} heart-rate summary rows had defaulted fields",
                defaulted_rows,
                rows.len()
            );
        }

        Ok(HeartRateAggregate {
            records,
            defaulted_rows,
        })
    }

    /// Dispatch on the batch layout.
    pub fn aggregate_heart_rate(
        &self,
        batch: &HeartRateBatch,
        session_id: Option<i64>,
    ) -> Result<HeartRateAggregate> {
        match batch {
            HeartRateBatch::Samples(samples) => self.aggregate_heart_samples(samples, session_id),
            HeartRateBatch::Summaries(rows) => self.summarize_heart_rows(rows, session_id),
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Arithmetic mean; `0.0` for an empty input.
pub fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .fold((0.0f64, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Seconds from `started` to `ended`; negative spans are rejected.
pub fn session_length(started: DateTime<Utc>, ended: DateTime<Utc>) -> Result<i64> {
    let secs = (ended - started).num_seconds();
    if secs < 0 {
        return Err(IngestError::Inconsistent(format!(
            "session ends {}s before it starts; timestamps are out of order",
            -secs
        )));
    }
    Ok(secs)
}

fn parse_required_timestamp(raw: &str, what: &str) -> Result<DateTime<Utc>> {
    TimestampProcessor::parse(raw).ok_or_else(|| {
        IngestError::Inconsistent(format!("{} '{}' is not a recognised timestamp", what, raw))
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
