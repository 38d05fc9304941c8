//! SQLite-backed session store with TTL expiry and chunk leases

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use ulid::Ulid;

use super::{schema, ImportSession, SessionPhase, StoreError};
use crate::core::identity::SessionId;

/// The import session store
///
/// Every write pushes the session's expiry out by the TTL; a read that finds
/// an expired row deletes it and reports the session as missing.
pub struct SessionStore {
    conn: Mutex<Connection>,
    ttl: Duration,
}

/// Exclusive right to advance one session, granted by [`SessionStore::lease`]
#[derive(Debug)]
pub struct SessionLease {
    token: String,
    /// Snapshot taken when the lease was granted
    pub session: ImportSession,
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

impl SessionStore {
    /// Open or create the store at `path`
    pub fn open(path: &Path, ttl: Duration) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        // WAL lets status reads proceed while a chunk holds the write lock
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(Duration::from_secs(5))?;

        Self::with_connection(conn, ttl)
    }

    /// A store that lives only as long as the process
    pub fn open_in_memory(ttl: Duration) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, ttl)
    }

    fn with_connection(conn: Connection, ttl: Duration) -> Result<Self, StoreError> {
        schema::prepare(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            ttl,
        })
    }

    fn expiry(&self) -> i64 {
        now_millis().saturating_add(millis(self.ttl))
    }

    /// Store a new session
    pub fn insert(&self, session: &ImportSession) -> Result<(), StoreError> {
        let data = serde_json::to_string(session)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO import_sessions (id, data, row_offset, source_file, phase, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session.id.to_string(),
                data,
                session.row_offset as i64,
                session.source_file.to_string_lossy(),
                session.phase.as_str(),
                self.expiry(),
            ],
        )?;
        info!(session = %session.id, file = %session.source_name, "session created");
        Ok(())
    }

    /// Fetch a live session
    pub fn get(&self, id: &SessionId) -> Result<ImportSession, StoreError> {
        let key = id.to_string();
        let conn = self.conn.lock();
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT data, expires_at FROM import_sessions WHERE id = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((data, expires_at)) if expires_at > now_millis() => Ok(serde_json::from_str(&data)?),
            Some(_) => {
                conn.execute("DELETE FROM import_sessions WHERE id = ?1", params![key])?;
                debug!(session = %key, "dropped expired session");
                Err(StoreError::NotFound(key))
            }
            None => Err(StoreError::NotFound(key)),
        }
    }

    /// Overwrite a live session that no chunk currently holds
    pub fn save(&self, session: &ImportSession) -> Result<(), StoreError> {
        let key = session.id.to_string();
        let data = serde_json::to_string(session)?;
        let now = now_millis();
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        Self::check_available(&tx, &key, now)?;
        tx.execute(
            "UPDATE import_sessions
             SET data = ?2, row_offset = ?3, phase = ?4, expires_at = ?5
             WHERE id = ?1",
            params![
                key,
                data,
                session.row_offset as i64,
                session.phase.as_str(),
                self.expiry(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Take the chunk lease on a session
    ///
    /// The lease lapses after `hold` so a crashed holder cannot wedge the
    /// session forever.
    pub fn lease(&self, id: &SessionId, hold: Duration) -> Result<SessionLease, StoreError> {
        let key = id.to_string();
        let now = now_millis();
        let token = Ulid::new().to_string();
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let data = Self::check_available(&tx, &key, now)?;
        let session: ImportSession = serde_json::from_str(&data)?;
        tx.execute(
            "UPDATE import_sessions SET lease_token = ?2, lease_expires = ?3 WHERE id = ?1",
            params![key, token, now.saturating_add(millis(hold))],
        )?;
        tx.commit()?;

        debug!(session = %key, offset = session.row_offset, "lease taken");
        Ok(SessionLease { token, session })
    }

    /// Commit a chunk and release its lease
    ///
    /// Succeeds only if the lease is still ours and the stored offset is
    /// still the one the chunk started from.
    pub fn commit(&self, lease: SessionLease, updated: &ImportSession) -> Result<(), StoreError> {
        let key = updated.id.to_string();
        let data = serde_json::to_string(updated)?;
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE import_sessions
             SET data = ?2, row_offset = ?3, phase = ?4, expires_at = ?5,
                 lease_token = NULL, lease_expires = NULL
             WHERE id = ?1 AND lease_token = ?6 AND row_offset = ?7",
            params![
                key,
                data,
                updated.row_offset as i64,
                updated.phase.as_str(),
                self.expiry(),
                lease.token,
                lease.session.row_offset as i64,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::Conflict(key));
        }
        Ok(())
    }

    /// Give a lease back without changing the session
    pub fn release(&self, lease: SessionLease) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE import_sessions SET lease_token = NULL, lease_expires = NULL
             WHERE id = ?1 AND lease_token = ?2",
            params![lease.session.id.to_string(), lease.token],
        )?;
        Ok(())
    }

    /// Remove a session, returning it if it existed
    pub fn delete(&self, id: &SessionId) -> Result<Option<ImportSession>, StoreError> {
        let key = id.to_string();
        let conn = self.conn.lock();
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM import_sessions WHERE id = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        let Some(data) = data else {
            return Ok(None);
        };
        conn.execute("DELETE FROM import_sessions WHERE id = ?1", params![key])?;
        info!(session = %key, "session removed");
        Ok(Some(serde_json::from_str(&data)?))
    }

    /// Staged files still needed by an unexpired, unfinished session
    pub fn live_source_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT source_file FROM import_sessions WHERE expires_at > ?1 AND phase != ?2",
        )?;
        let files = stmt
            .query_map(params![now_millis(), SessionPhase::Completed.as_str()], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(files.into_iter().map(PathBuf::from).collect())
    }

    /// Drop every expired session, returning how many were removed
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM import_sessions WHERE expires_at <= ?1",
            params![now_millis()],
        )?;
        if removed > 0 {
            debug!(removed, "purged expired sessions");
        }
        Ok(removed)
    }

    /// Load a session row for writing, failing if it is missing, expired or leased
    fn check_available(conn: &Connection, key: &str, now: i64) -> Result<String, StoreError> {
        let row: Option<(String, i64, Option<String>, Option<i64>)> = conn
            .query_row(
                "SELECT data, expires_at, lease_token, lease_expires
                 FROM import_sessions WHERE id = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let Some((data, expires_at, lease_token, lease_expires)) = row else {
            return Err(StoreError::NotFound(key.to_string()));
        };
        if expires_at <= now {
            return Err(StoreError::NotFound(key.to_string()));
        }
        if lease_token.is_some() && lease_expires.unwrap_or(0) > now {
            return Err(StoreError::Busy(key.to_string()));
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(30 * 60);
    const HOLD: Duration = Duration::from_secs(60);

    fn session() -> ImportSession {
        ImportSession::new("item", PathBuf::from("/tmp/a.csv"), "a.csv")
    }

    #[test]
    fn test_insert_and_get() {
        let store = SessionStore::open_in_memory(TTL).unwrap();
        let s = session();
        store.insert(&s).unwrap();
        assert_eq!(store.get(&s.id).unwrap(), s);
    }

    #[test]
    fn test_unknown_session_is_not_found() {
        let store = SessionStore::open_in_memory(TTL).unwrap();
        let err = store.get(&SessionId::new()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_expired_session_is_not_found() {
        let store = SessionStore::open_in_memory(Duration::ZERO).unwrap();
        let s = session();
        store.insert(&s).unwrap();
        assert!(matches!(store.get(&s.id), Err(StoreError::NotFound(_))));
        assert!(store.live_source_files().unwrap().is_empty());
    }

    #[test]
    fn test_second_lease_is_busy() {
        let store = SessionStore::open_in_memory(TTL).unwrap();
        let s = session();
        store.insert(&s).unwrap();

        let lease = store.lease(&s.id, HOLD).unwrap();
        assert!(matches!(store.lease(&s.id, HOLD), Err(StoreError::Busy(_))));
        assert!(matches!(store.save(&s), Err(StoreError::Busy(_))));

        store.release(lease).unwrap();
        assert!(store.lease(&s.id, HOLD).is_ok());
    }

    #[test]
    fn test_lapsed_lease_can_be_taken_over() {
        let store = SessionStore::open_in_memory(TTL).unwrap();
        let s = session();
        store.insert(&s).unwrap();

        let _stale = store.lease(&s.id, Duration::ZERO).unwrap();
        assert!(store.lease(&s.id, HOLD).is_ok());
    }

    #[test]
    fn test_commit_advances_and_releases() {
        let store = SessionStore::open_in_memory(TTL).unwrap();
        let s = session();
        store.insert(&s).unwrap();

        let lease = store.lease(&s.id, HOLD).unwrap();
        let mut next = lease.session.clone();
        next.row_offset = 4;
        store.commit(lease, &next).unwrap();

        assert_eq!(store.get(&s.id).unwrap().row_offset, 4);
        assert!(store.lease(&s.id, HOLD).is_ok());
    }

    #[test]
    fn test_commit_with_stale_lease_conflicts() {
        let store = SessionStore::open_in_memory(TTL).unwrap();
        let s = session();
        store.insert(&s).unwrap();

        let stale = store.lease(&s.id, Duration::ZERO).unwrap();
        let fresh = store.lease(&s.id, HOLD).unwrap();
        let mut next = fresh.session.clone();
        next.row_offset = 2;
        store.commit(fresh, &next).unwrap();

        let mut late = stale.session.clone();
        late.row_offset = 3;
        assert!(matches!(store.commit(stale, &late), Err(StoreError::Conflict(_))));
        assert_eq!(store.get(&s.id).unwrap().row_offset, 2);
    }

    #[test]
    fn test_delete_returns_session() {
        let store = SessionStore::open_in_memory(TTL).unwrap();
        let s = session();
        store.insert(&s).unwrap();
        assert_eq!(store.delete(&s.id).unwrap(), Some(s.clone()));
        assert_eq!(store.delete(&s.id).unwrap(), None);
    }

    #[test]
    fn test_live_source_files_skip_completed() {
        let store = SessionStore::open_in_memory(TTL).unwrap();
        let live = session();
        let mut done = ImportSession::new("item", PathBuf::from("/tmp/b.csv"), "b.csv");
        done.phase = SessionPhase::Completed;
        store.insert(&live).unwrap();
        store.insert(&done).unwrap();

        assert_eq!(
            store.live_source_files().unwrap(),
            vec![PathBuf::from("/tmp/a.csv")]
        );
    }

    #[test]
    fn test_file_store_persists_across_opens() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sessions.db");
        let s = session();
        SessionStore::open(&path, TTL).unwrap().insert(&s).unwrap();

        let reopened = SessionStore::open(&path, TTL).unwrap();
        assert_eq!(reopened.get(&s.id).unwrap().source_name, "a.csv");
    }
}
