use mantis_core::models::{NewShot, ShotRecord};
use rusqlite::{params, Connection};

use crate::error::Result;

pub struct ShotRepo;

impl ShotRepo {
    /// Insert `shots` under `session_id`, preserving input order.
    pub fn insert_many(conn: &Connection, session_id: i64, shots: &[NewShot]) -> Result<usize> {
        let mut stmt =
            conn.prepare_cached("INSERT INTO shots (session_id, split, score) VALUES (?1, ?2, ?3)")?;
        for shot in shots {
            stmt.execute(params![session_id, shot.split, shot.score])?;
        }
        Ok(shots.len())
    }

    pub fn for_session(conn: &Connection, session_id: i64) -> Result<Vec<ShotRecord>> {
        let mut stmt = conn.prepare(
            "SELECT shot_id, session_id, split, score FROM shots
             WHERE session_id = ?1 ORDER BY shot_id",
        )?;
        let rows = stmt
            .query_map(params![session_id], |row| {
                Ok(ShotRecord {
                    shot_id: row.get(0)?,
                    session_id: row.get(1)?,
                    split: row.get(2)?,
                    score: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count(conn: &Connection) -> Result<u64> {
        Ok(conn.query_row("SELECT COUNT(*) FROM shots", [], |row| row.get(0))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::migrations::run_migrations;
    use crate::sqlite::repositories::session::SessionRepo;
    use chrono::Utc;
    use mantis_core::models::ShotSessionRecord;

    fn setup_with_session() -> (Connection, i64) {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();
        let id = SessionRepo::insert(
            &conn,
            &ShotSessionRecord {
                session_id: None,
                user_id: 1,
                total_shots: 2,
                avg_score: 9.0,
                time_started: Utc::now(),
                session_length_secs: 300,
            },
        )
        .unwrap();
        (conn, id)
    }

    fn shots() -> Vec<NewShot> {
        vec![
            NewShot {
                split: "1".into(),
                score: 8.5,
            },
            NewShot {
                split: "2".into(),
                score: 9.5,
            },
        ]
    }

    #[test]
    fn test_insert_many_preserves_order() {
        let (conn, id) = setup_with_session();
        assert_eq!(ShotRepo::insert_many(&conn, id, &shots()).unwrap(), 2);

        let stored = ShotRepo::for_session(&conn, id).unwrap();
        let splits: Vec<_> = stored.iter().map(|s| s.split.as_str()).collect();
        assert_eq!(splits, ["1", "2"]);
        assert!(stored.iter().all(|s| s.session_id == id));
    }

    #[test]
    fn test_shots_cascade_with_session() {
        let (conn, id) = setup_with_session();
        ShotRepo::insert_many(&conn, id, &shots()).unwrap();

        SessionRepo::delete_all(&conn).unwrap();

        assert_eq!(ShotRepo::count(&conn).unwrap(), 0);
    }

    #[test]
    fn test_orphan_shot_rejected() {
        let (conn, id) = setup_with_session();
        assert!(ShotRepo::insert_many(&conn, id + 100, &shots()).is_err());
    }
}
