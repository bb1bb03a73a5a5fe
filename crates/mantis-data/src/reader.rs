//! CSV record parsing for cleaned MANTIS and heart-rate exports.
//!
//! [`CsvRecordParser`] reads the header eagerly and then yields one
//! [`RawCsvRow`] per record that carries every required column of its
//! schema. Rows missing a required value are dropped silently: device
//! exports routinely contain half-written trailer rows, and those must not
//! fail the whole upload.

use std::io::Read;

use mantis_core::data_processors::FieldParser;
use mantis_core::error::{IngestError, Result};
use mantis_core::models::{CsvSchema, HeartRateSample, HeartRateSummaryRow, RawCsvRow, ShotRow};
use tracing::debug;

// ── CsvRecords ────────────────────────────────────────────────────────────────

/// Lazy, single-pass iterator over the accepted rows of one upload.
pub struct CsvRecords<R: Read> {
    records: csv::ByteRecordsIntoIter<R>,
    headers: Vec<String>,
    schema: CsvSchema,
    read: usize,
    dropped: usize,
}

impl<R: Read> CsvRecords<R> {
    pub fn schema(&self) -> CsvSchema {
        self.schema
    }

    /// Trimmed header names in source order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Records pulled from the source so far (accepted + dropped).
    pub fn rows_read(&self) -> usize {
        self.read
    }

    /// Records rejected by the required-column filter so far.
    pub fn rows_dropped(&self) -> usize {
        self.dropped
    }

    fn build_row(&self, record: &csv::ByteRecord) -> RawCsvRow {
        let mut row = RawCsvRow::new();
        for (idx, header) in self.headers.iter().enumerate() {
            let value = record
                .get(idx)
                .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
                .unwrap_or_default();
            row.push(header.clone(), value);
        }
        row
    }
}

impl<R: Read> Iterator for CsvRecords<R> {
    type Item = Result<RawCsvRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.records.next()? {
                Ok(record) => record,
                Err(e) if e.is_io_error() => {
                    return Some(Err(IngestError::Io(std::io::Error::other(e))));
                }
                Err(e) => {
                    self.read += 1;
                    self.dropped += 1;
                    debug!("Dropping undecodable {} record: {}", self.schema, e);
                    continue;
                }
            };

            self.read += 1;
            let row = self.build_row(&record);
            if row.has_values(self.schema.required_columns()) {
                return Some(Ok(row));
            }

            self.dropped += 1;
            debug!(
                "Dropping {} row {}: missing one of {:?}",
                self.schema,
                self.read,
                self.schema.required_columns()
            );
        }
    }
}

// ── CsvRecordParser ───────────────────────────────────────────────────────────

/// Entry points for turning a cleaned CSV stream into typed rows.
pub struct CsvRecordParser;

impl CsvRecordParser {
    /// Start reading `source` as `schema`. The first line is the header.
    pub fn records<R: Read>(source: R, schema: CsvSchema) -> Result<CsvRecords<R>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(source);

        let headers = read_headers(&mut reader)?;

        Ok(CsvRecords {
            records: reader.into_byte_records(),
            headers,
            schema,
            read: 0,
            dropped: 0,
        })
    }

    /// Read a heart-rate upload, picking per-sample or summary layout from
    /// the header.
    ///
    /// An empty upload reports "no valid rows"; a header that matches
    /// neither layout is inconsistent input.
    pub fn heart_rate_records<R: Read>(source: R) -> Result<CsvRecords<R>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(source);

        let headers = read_headers(&mut reader)?;
        if headers.iter().all(|h| h.is_empty()) {
            return Err(IngestError::NoValidRows {
                schema: CsvSchema::HeartRateSamples,
            });
        }

        let schema = CsvSchema::detect_heart_rate(headers.iter().map(String::as_str))
            .ok_or_else(|| {
                IngestError::Inconsistent(format!(
                    "unrecognised heart-rate header [{}]; expected rate,timestamp or \
                     time_started,user_id,avg_rate,max_rate,min_rate",
                    headers.join(",")
                ))
            })?;

        Ok(CsvRecords {
            records: reader.into_byte_records(),
            headers,
            schema,
            read: 0,
            dropped: 0,
        })
    }

    /// Read every accepted MANTIS row, failing when none survive.
    pub fn read_shot_rows<R: Read>(source: R) -> Result<Vec<ShotRow>> {
        let mut records = Self::records(source, CsvSchema::Mantis)?;
        let mut rows = Vec::new();
        for row in records.by_ref() {
            rows.push(shot_row(&row?, rows.len() + 1));
        }

        debug!(
            "MANTIS upload: {} rows read, {} dropped, {} kept",
            records.rows_read(),
            records.rows_dropped(),
            rows.len()
        );

        if rows.is_empty() {
            return Err(IngestError::NoValidRows {
                schema: CsvSchema::Mantis,
            });
        }
        Ok(rows)
    }

    /// Read every accepted heart-rate row, failing when none survive.
    pub fn read_heart_rate_batch<R: Read>(source: R) -> Result<HeartRateBatch> {
        let mut records = Self::heart_rate_records(source)?;
        let schema = records.schema();

        let batch = match schema {
            CsvSchema::HeartRateSummary => HeartRateBatch::Summaries(
                records
                    .by_ref()
                    .map(|row| row.map(|r| heart_rate_summary(&r)))
                    .collect::<Result<Vec<_>>>()?,
            ),
            _ => HeartRateBatch::Samples(
                records
                    .by_ref()
                    .map(|row| row.map(|r| heart_rate_sample(&r)))
                    .collect::<Result<Vec<_>>>()?,
            ),
        };

        debug!(
            "{} upload: {} rows read, {} dropped, {} kept",
            schema,
            records.rows_read(),
            records.rows_dropped(),
            batch.len()
        );

        if batch.is_empty() {
            return Err(IngestError::NoValidRows { schema });
        }
        Ok(batch)
    }
}

/// Header names with surrounding whitespace and any UTF-8 BOM removed.
fn read_headers<R: Read>(reader: &mut csv::Reader<R>) -> Result<Vec<String>> {
    let headers = reader.byte_headers().map_err(|e| {
        if e.is_io_error() {
            IngestError::Io(std::io::Error::other(e))
        } else {
            IngestError::Inconsistent(format!("unreadable CSV header: {}", e))
        }
    })?;

    Ok(headers
        .iter()
        .map(|h| {
            String::from_utf8_lossy(h)
                .trim_start_matches('\u{feff}')
                .trim()
                .to_string()
        })
        .collect())
}

// ── HeartRateBatch ────────────────────────────────────────────────────────────

/// A parsed heart-rate upload in whichever layout the device produced.
#[derive(Debug, Clone, PartialEq)]
pub enum HeartRateBatch {
    Samples(Vec<HeartRateSample>),
    Summaries(Vec<HeartRateSummaryRow>),
}

impl HeartRateBatch {
    pub fn len(&self) -> usize {
        match self {
            HeartRateBatch::Samples(rows) => rows.len(),
            HeartRateBatch::Summaries(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn schema(&self) -> CsvSchema {
        match self {
            HeartRateBatch::Samples(_) => CsvSchema::HeartRateSamples,
            HeartRateBatch::Summaries(_) => CsvSchema::HeartRateSummary,
        }
    }
}

// ── Typed row mapping ─────────────────────────────────────────────────────────

/// Map an accepted MANTIS row. `ordinal` is the 1-based position among
/// accepted rows and labels the shot when the export has no split column.
pub fn shot_row(row: &RawCsvRow, ordinal: usize) -> ShotRow {
    let score = FieldParser::float(row.get("Score"));
    let split = row
        .non_empty("Split")
        .or_else(|| row.non_empty("Shot Count"))
        .map(str::to_string)
        .unwrap_or_else(|| ordinal.to_string());

    ShotRow {
        device_id: row.get("ID").unwrap_or_default().to_string(),
        split,
        score: score.value,
        date: row.get("Date").unwrap_or_default().to_string(),
        defaulted: score.defaulted,
    }
}

pub fn heart_rate_sample(row: &RawCsvRow) -> HeartRateSample {
    let rate = FieldParser::float(row.get("rate"));
    HeartRateSample {
        rate: rate.value,
        timestamp: row.get("timestamp").unwrap_or_default().to_string(),
        defaulted: rate.defaulted,
    }
}

/// Map a pre-aggregated row. `session_length` is optional; when the column
/// is absent the length is zero and not counted as defaulted.
pub fn heart_rate_summary(row: &RawCsvRow) -> HeartRateSummaryRow {
    let user_id = FieldParser::int(row.get("user_id"));
    let avg = FieldParser::float(row.get("avg_rate"));
    let max = FieldParser::float(row.get("max_rate"));
    let min = FieldParser::float(row.get("min_rate"));
    let (length, length_defaulted) = match row.non_empty("session_length") {
        Some(raw) => {
            let parsed = FieldParser::int(Some(raw));
            (parsed.value, parsed.defaulted)
        }
        None => (0, false),
    };

    HeartRateSummaryRow {
        time_started: row.get("time_started").unwrap_or_default().to_string(),
        user_id: user_id.value,
        avg_rate: avg.value,
        max_rate: max.value,
        min_rate: min.value,
        session_length_secs: length,
        defaulted: user_id.defaulted
            || avg.defaulted
            || max.defaulted
            || min.defaulted
            || length_defaulted,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const MANTIS_CSV: &str = "ID,Score,Shot Count,Date\n\
        41,8.0,1,03/01/2024 10:00:00\n\
        41,9.5,2,03/01/2024 10:01:00\n\
        41,7.0,3,03/01/2024 10:02:30\n";

    // ── records ───────────────────────────────────────────────────────────────

    #[test]
    fn test_records_uses_first_line_as_header() {
        let records = CsvRecordParser::records(MANTIS_CSV.as_bytes(), CsvSchema::Mantis).unwrap();
        assert_eq!(records.headers(), &["ID", "Score", "Shot Count", "Date"]);

        let rows: Vec<RawCsvRow> = records.map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].get("Score"), Some("9.5"));
    }

    #[test]
    fn test_records_drop_rows_missing_required_values() {
        let csv = "ID,Score,Shot Count,Date\n\
            1,8.0,1,03/01/2024 10:00:00\n\
            ,9.0,2,03/01/2024 10:01:00\n\
            1,,3,03/01/2024 10:02:00\n\
            1,7.5\n";
        let mut records = CsvRecordParser::records(csv.as_bytes(), CsvSchema::Mantis).unwrap();
        let kept: Vec<RawCsvRow> = records.by_ref().map(|r| r.unwrap()).collect();

        assert_eq!(kept.len(), 2);
        assert_eq!(records.rows_read(), 4);
        assert_eq!(records.rows_dropped(), 2);
        // Ragged row keeps its parsed cells and blanks the rest.
        assert_eq!(kept[1].get("Score"), Some("7.5"));
        assert_eq!(kept[1].get("Date"), Some(""));
    }

    #[test]
    fn test_records_trim_headers_and_values() {
        let csv = "\u{feff} ID , Score \n 3 , 9.0 \n";
        let rows: Vec<RawCsvRow> = CsvRecordParser::records(csv.as_bytes(), CsvSchema::Mantis)
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(rows[0].get("ID"), Some("3"));
        assert_eq!(rows[0].get("Score"), Some("9.0"));
    }

    #[test]
    fn test_records_missing_column_drops_every_row() {
        let csv = "ID,Points\n1,9\n2,8\n";
        let rows: Vec<_> = CsvRecordParser::records(csv.as_bytes(), CsvSchema::Mantis)
            .unwrap()
            .collect();
        assert!(rows.is_empty());
    }

    // ── read_shot_rows ────────────────────────────────────────────────────────

    #[test]
    fn test_read_shot_rows_maps_fields() {
        let rows = CsvRecordParser::read_shot_rows(MANTIS_CSV.as_bytes()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].device_id, "41");
        assert_eq!(rows[0].split, "1");
        assert_eq!(rows[2].score, 7.0);
        assert_eq!(rows[2].date, "03/01/2024 10:02:30");
        assert!(rows.iter().all(|r| !r.defaulted));
    }

    #[test]
    fn test_read_shot_rows_flags_non_numeric_score() {
        let csv = "ID,Score,Date\n1,n/a,03/01/2024 10:00:00\n";
        let rows = CsvRecordParser::read_shot_rows(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].score, 0.0);
        assert!(rows[0].defaulted);
    }

    #[test]
    fn test_read_shot_rows_split_column_preferred() {
        let csv = "ID,Score,Split,Shot Count,Date\n1,9,Lap 2,7,x\n1,9,,8,x\n1,9,,,x\n";
        let rows = CsvRecordParser::read_shot_rows(csv.as_bytes()).unwrap();
        let splits: Vec<&str> = rows.iter().map(|r| r.split.as_str()).collect();
        assert_eq!(splits, vec!["Lap 2", "8", "3"]);
    }

    #[test]
    fn test_read_shot_rows_all_dropped_is_no_valid_rows() {
        let csv = "ID,Score,Date\n,9,x\n4,,x\n";
        let err = CsvRecordParser::read_shot_rows(csv.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            IngestError::NoValidRows {
                schema: CsvSchema::Mantis
            }
        ));
    }

    #[test]
    fn test_read_shot_rows_empty_input_is_no_valid_rows() {
        let err = CsvRecordParser::read_shot_rows("".as_bytes()).unwrap_err();
        assert!(matches!(err, IngestError::NoValidRows { .. }));
    }

    // ── read_heart_rate_batch ─────────────────────────────────────────────────

    #[test]
    fn test_heart_rate_samples_detected() {
        let csv = "timestamp,rate\n2024-03-01T10:00:00Z,100\n2024-03-01T10:00:05Z,140\n";
        let batch = CsvRecordParser::read_heart_rate_batch(csv.as_bytes()).unwrap();
        assert_eq!(batch.schema(), CsvSchema::HeartRateSamples);
        match batch {
            HeartRateBatch::Samples(samples) => {
                assert_eq!(samples.len(), 2);
                assert_eq!(samples[1].rate, 140.0);
            }
            other => panic!("expected samples, got {:?}", other),
        }
    }

    #[test]
    fn test_heart_rate_summary_detected() {
        let csv = "time_started,user_id,avg_rate,max_rate,min_rate,session_length\n\
            2024-03-01T10:00:00Z,1,120,150,95,600\n\
            2024-03-01T11:00:00Z,1,,150,95,600\n\
            2024-03-01T12:00:00Z,1,118,130,oops,\n";
        let batch = CsvRecordParser::read_heart_rate_batch(csv.as_bytes()).unwrap();
        match batch {
            HeartRateBatch::Summaries(rows) => {
                // Row with a blank avg_rate is dropped.
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[0].session_length_secs, 600);
                assert!(!rows[0].defaulted);
                assert_eq!(rows[1].max_rate, 130.0);
                assert_eq!(rows[1].min_rate, 0.0);
                assert_eq!(rows[1].session_length_secs, 0);
                assert!(rows[1].defaulted);
            }
            other => panic!("expected summaries, got {:?}", other),
        }
    }

    #[test]
    fn test_heart_rate_unknown_header_is_inconsistent() {
        let csv = "bpm,when\n100,now\n";
        let err = CsvRecordParser::read_heart_rate_batch(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, IngestError::Inconsistent(_)));
    }

    #[test]
    fn test_heart_rate_header_only_is_no_valid_rows() {
        let csv = "timestamp,rate\n";
        let err = CsvRecordParser::read_heart_rate_batch(csv.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            IngestError::NoValidRows {
                schema: CsvSchema::HeartRateSamples
            }
        ));
    }

    #[test]
    fn test_heart_rate_empty_upload_is_no_valid_rows() {
        let err = CsvRecordParser::read_heart_rate_batch("".as_bytes()).unwrap_err();
        assert!(matches!(err, IngestError::NoValidRows { .. }));
    }
}
