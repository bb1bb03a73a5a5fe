//! Transactional session store.
//!
//! Composes the repositories into the two write modes the ingestion
//! pipeline needs:
//!
//! * **replace** – wipe every session (shots cascade) and write one new
//!   session with its shots. Runs in one transaction and is serialised by
//!   an in-process lock so two uploads cannot interleave their deletes and
//!   inserts.
//! * **append** – add heart-rate rows without touching anything else. Not
//!   serialised beyond what SQLite itself does.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use mantis_core::models::{
    HeartRateRecord, NewShot, NewUser, ShotRecord, ShotSessionRecord, UserRecord,
};
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::sqlite::connection::{self, ConnectionConfig, ConnectionPool, PooledConnection};
use crate::sqlite::migrations::run_migrations;
use crate::sqlite::repositories::heart_rate::HeartRateRepo;
use crate::sqlite::repositories::session::SessionRepo;
use crate::sqlite::repositories::shot::ShotRepo;
use crate::sqlite::repositories::user::UserRepo;

pub struct SessionStore {
    pool: ConnectionPool,
    replace_lock: Mutex<()>,
}

impl SessionStore {
    /// Wrap `pool` and bring its schema up to date.
    pub fn new(pool: ConnectionPool) -> Result<Self> {
        {
            let conn = pool.get()?;
            let applied = run_migrations(&conn)?;
            debug!("Session store ready ({} migrations applied)", applied);
        }
        Ok(Self {
            pool,
            replace_lock: Mutex::new(()),
        })
    }

    /// Open (or create) a file-backed store.
    pub fn open(path: &Path, config: &ConnectionConfig) -> Result<Self> {
        info!("Opening session store at {}", path.display());
        Self::new(connection::new_file(path, config)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(connection::new_in_memory(&ConnectionConfig::default())?)
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    // ── Writes ────────────────────────────────────────────────────────────────

    /// Insert a session and its shots without deleting anything.
    pub fn create_session(&self, session: &ShotSessionRecord, shots: &[NewShot]) -> Result<i64> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let id = SessionRepo::insert(&tx, session)?;
        ShotRepo::insert_many(&tx, id, shots)?;
        tx.commit()?;
        Ok(id)
    }

    /// Delete every stored session and its shots. Returns the number removed.
    pub fn replace_all_sessions(&self) -> Result<usize> {
        let _guard = self
            .replace_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let conn = self.conn()?;
        let removed = SessionRepo::delete_all(&conn)?;
        info!("Removed {} stored sessions", removed);
        Ok(removed)
    }

    /// Replace all stored sessions with `session` and its `shots`.
    ///
    /// Either the old sessions are gone and the new one is fully written,
    /// or the transaction rolls back. Any failure is reported as
    /// [`StoreError::Replace`].
    pub fn replace_with_session(
        &self,
        session: &ShotSessionRecord,
        shots: &[NewShot],
    ) -> Result<i64> {
        let _guard = self
            .replace_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.replace_locked(session, shots)
            .map_err(StoreError::replace)
    }

    fn replace_locked(&self, session: &ShotSessionRecord, shots: &[NewShot]) -> Result<i64> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let removed = SessionRepo::delete_all(&tx)?;
        let id = SessionRepo::insert(&tx, session)?;
        ShotRepo::insert_many(&tx, id, shots)?;
        tx.commit()?;
        info!(
            "Replaced {} sessions with session {} ({} shots)",
            removed,
            id,
            shots.len()
        );
        Ok(id)
    }

    /// Attach more shots to an existing session.
    pub fn insert_shots(&self, session_id: i64, shots: &[NewShot]) -> Result<usize> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let n = ShotRepo::insert_many(&tx, session_id, shots)?;
        tx.commit()?;
        Ok(n)
    }

    /// Append heart-rate rows. The batch is written atomically.
    pub fn append_heart_rates(&self, records: &[HeartRateRecord]) -> Result<usize> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let n = HeartRateRepo::insert_many(&tx, records)?;
        tx.commit()?;
        debug!("Appended {} heart-rate rows", n);
        Ok(n)
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    pub fn latest_session_id(&self) -> Result<Option<i64>> {
        SessionRepo::latest_id(&*self.conn()?)
    }

    pub fn session_exists(&self, session_id: i64) -> Result<bool> {
        SessionRepo::exists(&*self.conn()?, session_id)
    }

    pub fn get_session(&self, session_id: i64) -> Result<Option<ShotSessionRecord>> {
        SessionRepo::get(&*self.conn()?, session_id)
    }

    pub fn list_sessions(&self) -> Result<Vec<ShotSessionRecord>> {
        SessionRepo::list(&*self.conn()?)
    }

    pub fn shots_for_session(&self, session_id: i64) -> Result<Vec<ShotRecord>> {
        ShotRepo::for_session(&*self.conn()?, session_id)
    }

    pub fn heart_rates_for_session(&self, session_id: i64) -> Result<Vec<HeartRateRecord>> {
        HeartRateRepo::for_session(&*self.conn()?, session_id)
    }

    pub fn unlinked_heart_rates(&self) -> Result<Vec<HeartRateRecord>> {
        HeartRateRepo::unlinked(&*self.conn()?)
    }

    pub fn count_sessions(&self) -> Result<u64> {
        SessionRepo::count(&*self.conn()?)
    }

    pub fn count_shots(&self) -> Result<u64> {
        ShotRepo::count(&*self.conn()?)
    }

    pub fn count_heart_rates(&self) -> Result<u64> {
        HeartRateRepo::count(&*self.conn()?)
    }

    // ── Users ─────────────────────────────────────────────────────────────────

    pub fn list_users(&self) -> Result<Vec<UserRecord>> {
        UserRepo::list(&*self.conn()?)
    }

    pub fn create_user(&self, user: &NewUser) -> Result<UserRecord> {
        UserRepo::create(&*self.conn()?, user)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
