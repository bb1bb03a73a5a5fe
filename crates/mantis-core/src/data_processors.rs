use chrono::{DateTime, TimeZone, Utc};
use tracing::warn;

// ── TimestampProcessor ────────────────────────────────────────────────────────

/// Parses the timestamp spellings found in MANTIS and heart-rate exports.
pub struct TimestampProcessor;

impl TimestampProcessor {
    /// Epoch values above this are taken to be milliseconds.
    const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

    /// Attempt to parse a CSV cell into a UTC [`DateTime`].
    ///
    /// Handles:
    /// * RFC 3339 / ISO 8601, with or without a `Z` suffix or offset.
    /// * RFC 2822.
    /// * Naive date-times (device local time is treated as UTC), including
    ///   the US `month/day/year` layouts the MANTIS app writes, with 24-hour
    ///   or AM/PM clocks.
    /// * Bare integers as Unix epoch seconds (or milliseconds when large).
    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let s = raw.trim();
        if s.is_empty() {
            return None;
        }

        if s.bytes().all(|b| b.is_ascii_digit()) {
            let n: i64 = s.parse().ok()?;
            return if n >= Self::EPOCH_MILLIS_THRESHOLD {
                DateTime::from_timestamp_millis(n)
            } else {
                DateTime::from_timestamp(n, 0)
            };
        }

        let normalised = if let Some(stripped) = s.strip_suffix('Z') {
            format!("{}+00:00", stripped)
        } else {
            s.to_string()
        };

        if let Ok(dt) = DateTime::parse_from_rfc3339(&normalised) {
            return Some(dt.with_timezone(&Utc));
        }

        if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
            return Some(dt.with_timezone(&Utc));
        }

        const DATETIME_FORMATS: &[&str] = &[
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y-%m-%d %H:%M:%S",
            "%Y-%m-%d %H:%M",
            "%m/%d/%Y %H:%M:%S",
            "%m/%d/%Y %H:%M",
            "%m/%d/%Y %I:%M:%S %p",
            "%m/%d/%Y %I:%M %p",
            "%m/%d/%y %H:%M:%S",
            "%m/%d/%y %I:%M %p",
        ];
        for fmt in DATETIME_FORMATS {
            if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
                return Some(Utc.from_utc_datetime(&naive));
            }
        }

        const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y"];
        for fmt in DATE_FORMATS {
            if let Ok(date) = chrono::NaiveDate::parse_from_str(s, fmt) {
                let naive = date.and_hms_opt(0, 0, 0)?;
                return Some(Utc.from_utc_datetime(&naive));
            }
        }

        warn!("TimestampProcessor: could not parse timestamp \"{}\"", s);
        None
    }
}

// ── FieldParser ───────────────────────────────────────────────────────────────

/// A numeric cell together with whether it had to be defaulted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedField<T> {
    pub value: T,
    pub defaulted: bool,
}

impl<T> ParsedField<T> {
    fn parsed(value: T) -> Self {
        Self {
            value,
            defaulted: false,
        }
    }

    fn fallback(value: T) -> Self {
        Self {
            value,
            defaulted: true,
        }
    }
}

/// Lenient numeric parsing for noisy device exports.
///
/// Unparseable or missing cells become `0` and are flagged as defaulted
/// instead of failing the batch.
pub struct FieldParser;

impl FieldParser {
    /// Parse a float cell. Non-finite values (`NaN`, `inf`) count as failures.
    pub fn float(raw: Option<&str>) -> ParsedField<f64> {
        match raw.map(str::trim).and_then(|s| s.parse::<f64>().ok()) {
            Some(v) if v.is_finite() => ParsedField::parsed(v),
            _ => ParsedField::fallback(0.0),
        }
    }

    /// Parse an integer cell. Accepts integral floats such as `"3.0"`;
    /// floats outside the `i64` range are defaulted rather than saturated.
    pub fn int(raw: Option<&str>) -> ParsedField<i64> {
        // 2^63, exactly representable; `i64::MAX as f64` rounds up to it.
        const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

        let Some(s) = raw.map(str::trim) else {
            return ParsedField::fallback(0);
        };
        if let Ok(v) = s.parse::<i64>() {
            return ParsedField::parsed(v);
        }
        match s.parse::<f64>() {
            Ok(f) if f.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(&f) => {
                ParsedField::parsed(f as i64)
            }
            _ => ParsedField::fallback(0),
        }
    }
}
