//! Session repository: CRUD for the `sessions` table.

use chrono::Utc;
use mantis_core::models::ShotSessionRecord;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{encode_timestamp, timestamp_column};
use crate::error::Result;

const COLUMNS: &str =
    "session_id, user_id, total_shots, avg_score, time_started, session_length_secs";

fn from_row(row: &Row<'_>) -> rusqlite::Result<ShotSessionRecord> {
    Ok(ShotSessionRecord {
        session_id: Some(row.get(0)?),
        user_id: row.get(1)?,
        total_shots: row.get(2)?,
        avg_score: row.get(3)?,
        time_started: timestamp_column(row, 4)?,
        session_length_secs: row.get(5)?,
    })
}

pub struct SessionRepo;

impl SessionRepo {
    /// Insert a session. An explicit `session_id` is used as-is; otherwise
    /// SQLite assigns the next surrogate key. Returns the stored id.
    pub fn insert(conn: &Connection, session: &ShotSessionRecord) -> Result<i64> {
        conn.execute(
            "INSERT INTO sessions
               (session_id, user_id, total_shots, avg_score, time_started, session_length_secs, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session.session_id,
                session.user_id,
                session.total_shots,
                session.avg_score,
                encode_timestamp(&session.time_started),
                session.session_length_secs,
                encode_timestamp(&Utc::now()),
            ],
        )?;
        Ok(session
            .session_id
            .unwrap_or_else(|| conn.last_insert_rowid()))
    }

    /// Delete every session. Shots cascade; heart-rate links are nulled.
    pub fn delete_all(conn: &Connection) -> Result<usize> {
        Ok(conn.execute("DELETE FROM sessions", [])?)
    }

    pub fn get(conn: &Connection, session_id: i64) -> Result<Option<ShotSessionRecord>> {
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM sessions WHERE session_id = ?1"),
                params![session_id],
                from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn exists(conn: &Connection, session_id: i64) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM sessions WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Numerically highest stored session id.
    pub fn latest_id(conn: &Connection) -> Result<Option<i64>> {
        Ok(conn.query_row("SELECT MAX(session_id) FROM sessions", [], |row| row.get(0))?)
    }

    /// All sessions, highest id first.
    pub fn list(conn: &Connection) -> Result<Vec<ShotSessionRecord>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM sessions ORDER BY session_id DESC"
        ))?;
        let rows = stmt
            .query_map([], from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count(conn: &Connection) -> Result<u64> {
        Ok(conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?)
    }
}
