//! Heart-rate repository: append-only rows in `heart_data`.

use mantis_core::models::HeartRateRecord;
use rusqlite::{params, Connection, Row};

use super::{encode_timestamp, timestamp_column};
use crate::error::Result;

const COLUMNS: &str =
    "session_id, user_id, time_started, avg_rate, max_rate, min_rate, session_length_secs";

fn from_row(row: &Row<'_>) -> rusqlite::Result<HeartRateRecord> {
    Ok(HeartRateRecord {
        session_id: row.get(0)?,
        user_id: row.get(1)?,
        time_started: timestamp_column(row, 2)?,
        avg_rate: row.get(3)?,
        max_rate: row.get(4)?,
        min_rate: row.get(5)?,
        session_length_secs: row.get(6)?,
    })
}

pub struct HeartRateRepo;

impl HeartRateRepo {
    pub fn insert_many(conn: &Connection, records: &[HeartRateRecord]) -> Result<usize> {
        let mut stmt = conn.prepare_cached(&format!(
            "INSERT INTO heart_data ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
        ))?;
        for rec in records {
            stmt.execute(params![
                rec.session_id,
                rec.user_id,
                encode_timestamp(&rec.time_started),
                rec.avg_rate,
                rec.max_rate,
                rec.min_rate,
                rec.session_length_secs,
            ])?;
        }
        Ok(records.len())
    }

    pub fn for_session(conn: &Connection, session_id: i64) -> Result<Vec<HeartRateRecord>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM heart_data WHERE session_id = ?1 ORDER BY heart_id"
        ))?;
        let rows = stmt
            .query_map(params![session_id], from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Rows whose session was replaced away (or never linked).
    pub fn unlinked(conn: &Connection) -> Result<Vec<HeartRateRecord>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM heart_data WHERE session_id IS NULL ORDER BY heart_id"
        ))?;
        let rows = stmt
            .query_map([], from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count(conn: &Connection) -> Result<u64> {
        Ok(conn.query_row("SELECT COUNT(*) FROM heart_data", [], |row| row.get(0))?)
    }
}
