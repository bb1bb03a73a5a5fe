use chrono::Utc;
use mantis_core::models::{NewUser, UserRecord};
use rusqlite::{params, Connection};

use super::encode_timestamp;
use crate::error::Result;

pub struct UserRepo;

impl UserRepo {
    pub fn create(conn: &Connection, user: &NewUser) -> Result<UserRecord> {
        let created_at = encode_timestamp(&Utc::now());
        conn.execute(
            "INSERT INTO users (username, email, created_at) VALUES (?1, ?2, ?3)",
            params![user.username, user.email, created_at],
        )?;
        Ok(UserRecord {
            id: conn.last_insert_rowid(),
            username: user.username.clone(),
            email: user.email.clone(),
            created_at,
        })
    }

    pub fn list(conn: &Connection) -> Result<Vec<UserRecord>> {
        let mut stmt =
            conn.prepare("SELECT id, username, email, created_at FROM users ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(UserRecord {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    email: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
