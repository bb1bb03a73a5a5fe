use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of firmware banner lines a MANTIS export carries before its header.
pub const MANTIS_PREAMBLE_LINES: usize = 5;

/// Placeholder user id until real multi-user support exists.
pub const DEFAULT_USER_ID: i64 = 1;

/// Placeholder session length (5 minutes) for the surrogate-key ingestion path.
pub const DEFAULT_SESSION_LENGTH_SECS: i64 = 5 * 60;

// ── RawCsvRow ─────────────────────────────────────────────────────────────────

/// One CSV record as column-name → value pairs, in source column order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCsvRow {
    columns: Vec<(String, String)>,
}

impl RawCsvRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row from `(column, value)` pairs, keeping their order.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            columns: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.columns.push((column.into(), value.into()));
    }

    /// Value of `column`, or `None` if the column is absent.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Value of `column` when present and not blank.
    pub fn non_empty(&self, column: &str) -> Option<&str> {
        self.get(column).filter(|v| !v.trim().is_empty())
    }

    /// `true` when every column in `required` is present and non-blank.
    pub fn has_values(&self, required: &[&str]) -> bool {
        required.iter().all(|c| self.non_empty(c).is_some())
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

// ── CsvSchema ─────────────────────────────────────────────────────────────────

/// The tabular layouts the pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CsvSchema {
    /// MANTIS shot export (after the banner is stripped).
    Mantis,
    /// Heart-rate export with one row per sample.
    HeartRateSamples,
    /// Heart-rate export that is already aggregated per session.
    HeartRateSummary,
}

impl CsvSchema {
    /// Columns that must be non-empty for a row to be kept.
    pub fn required_columns(self) -> &'static [&'static str] {
        match self {
            CsvSchema::Mantis => &["ID", "Score"],
            CsvSchema::HeartRateSamples => &["rate", "timestamp"],
            CsvSchema::HeartRateSummary => &["time_started", "user_id", "avg_rate"],
        }
    }

    /// Pick the heart-rate layout from a header row.
    ///
    /// Per-sample wins when both layouts' key columns are present.
    pub fn detect_heart_rate<'a>(headers: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        let headers: Vec<&str> = headers.into_iter().collect();
        let has = |name: &str| headers.iter().any(|h| *h == name);
        if has("rate") && has("timestamp") {
            Some(CsvSchema::HeartRateSamples)
        } else if has("avg_rate") && has("time_started") {
            Some(CsvSchema::HeartRateSummary)
        } else {
            None
        }
    }
}

impl std::fmt::Display for CsvSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CsvSchema::Mantis => "MANTIS",
            CsvSchema::HeartRateSamples => "heart-rate sample",
            CsvSchema::HeartRateSummary => "heart-rate summary",
        };
        f.write_str(name)
    }
}

// ── Ingestion options ─────────────────────────────────────────────────────────

/// Where a MANTIS session gets its primary key from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionIdSource {
    /// The store assigns the id; session length is the fixed placeholder.
    #[default]
    Surrogate,
    /// The device `ID` column is the id; session length is derived from `Date`.
    DeviceAssigned,
}

// ── Typed rows ────────────────────────────────────────────────────────────────

/// A MANTIS shot row after schema filtering and field parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct ShotRow {
    /// Device session id exactly as exported.
    pub device_id: String,
    /// Lap / segment label.
    pub split: String,
    /// Shot score; `0.0` when the cell was not numeric.
    pub score: f64,
    /// Raw `Date` cell, parsed later by the aggregator.
    pub date: String,
    /// `true` when any numeric field fell back to its default.
    pub defaulted: bool,
}

/// One heart-rate sample.
#[derive(Debug, Clone, PartialEq)]
pub struct HeartRateSample {
    pub rate: f64,
    pub timestamp: String,
    pub defaulted: bool,
}

/// One pre-aggregated heart-rate row.
#[derive(Debug, Clone, PartialEq)]
pub struct HeartRateSummaryRow {
    pub time_started: String,
    pub user_id: i64,
    pub avg_rate: f64,
    pub max_rate: f64,
    pub min_rate: f64,
    pub session_length_secs: i64,
    pub defaulted: bool,
}

// ── Persisted records ─────────────────────────────────────────────────────────

/// A training session derived from one MANTIS batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotSessionRecord {
    /// `None` until the store assigns a surrogate key.
    pub session_id: Option<i64>,
    pub user_id: i64,
    pub total_shots: u32,
    pub avg_score: f64,
    pub time_started: DateTime<Utc>,
    pub session_length_secs: i64,
}

/// A shot waiting to be attached to a freshly written session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewShot {
    pub split: String,
    pub score: f64,
}

/// A stored shot row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotRecord {
    pub shot_id: i64,
    pub session_id: i64,
    pub split: String,
    pub score: f64,
}

/// Heart-rate data for one session, either batch-derived or supplied
/// pre-aggregated by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartRateRecord {
    /// `None` while the row is not linked to a session.
    pub session_id: Option<i64>,
    pub user_id: i64,
    pub time_started: DateTime<Utc>,
    pub avg_rate: f64,
    pub max_rate: f64,
    pub min_rate: f64,
    pub session_length_secs: i64,
}

impl HeartRateRecord {
    /// `min_rate <= avg_rate <= max_rate`.
    pub fn rates_ordered(&self) -> bool {
        self.min_rate <= self.avg_rate && self.avg_rate <= self.max_rate
    }
}

/// A user account row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub created_at: String,
}

/// Payload for creating a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_row_preserves_column_order() {
        let row = RawCsvRow::from_pairs([("ID", "7"), ("Score", "9.5"), ("Date", "x")]);
        let names: Vec<&str> = row.columns().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["ID", "Score", "Date"]);
        assert_eq!(row.len(), 3);
    }

    #[test]
    fn test_raw_row_non_empty_treats_blank_as_missing() {
        let mut row = RawCsvRow::new();
        row.push("ID", "12");
        row.push("Score", "   ");
        assert_eq!(row.non_empty("ID"), Some("12"));
        assert_eq!(row.get("Score"), Some("   "));
        assert!(row.non_empty("Score").is_none());
        assert!(row.non_empty("Date").is_none());
        assert!(!row.has_values(CsvSchema::Mantis.required_columns()));
    }

    #[test]
    fn test_detect_heart_rate_samples() {
        let schema = CsvSchema::detect_heart_rate(["timestamp", "rate"]);
        assert_eq!(schema, Some(CsvSchema::HeartRateSamples));
    }

    #[test]
    fn test_detect_heart_rate_summary() {
        let schema = CsvSchema::detect_heart_rate([
            "time_started",
            "user_id",
            "avg_rate",
            "max_rate",
            "min_rate",
        ]);
        assert_eq!(schema, Some(CsvSchema::HeartRateSummary));
    }

    #[test]
    fn test_detect_heart_rate_unknown_header() {
        assert!(CsvSchema::detect_heart_rate(["bpm", "when"]).is_none());
    }

    #[test]
    fn test_rates_ordered() {
        let mut rec = HeartRateRecord {
            session_id: None,
            user_id: DEFAULT_USER_ID,
            time_started: Utc::now(),
            avg_rate: 120.0,
            max_rate: 140.0,
            min_rate: 100.0,
            session_length_secs: 60,
        };
        assert!(rec.rates_ordered());
        rec.avg_rate = 150.0;
        assert!(!rec.rates_ordered());
    }

    #[test]
    fn test_session_record_serializes_camel_case() {
        let rec = ShotSessionRecord {
            session_id: Some(3),
            user_id: 1,
            total_shots: 2,
            avg_score: 8.5,
            time_started: DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            session_length_secs: DEFAULT_SESSION_LENGTH_SECS,
        };
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["sessionId"], 3);
        assert_eq!(json["totalShots"], 2);
        assert_eq!(json["sessionLengthSecs"], 300);
    }
}
