///
/// Database connections.
///
/// A `Connection` owns one engine session. The session lives behind an
/// `Arc<Mutex<Session>>`; statements prepared on it hold only a `Weak`
/// reference, so they never keep the session alive and can tell when it has
/// gone away.
///
/// The session also owns the native cursor of every live statement, keyed by
/// statement id. Closing the session finalizes those cursors first, which is
/// what lets the engine handle close cleanly while statements are still
/// outstanding.
///

use std::collections::HashMap;
use std::ffi::{c_char, c_int, CStr};
use std::ptr::{self, NonNull};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::ffi;
use tracing::{debug, error, warn};

use crate::config::ConnectionConfig;
use crate::errors::{engine_failure, Error, Result};
use crate::statement::Statement;

/// A prepared native cursor. Only ever touched while the owning session's
/// mutex is held.
pub(crate) struct RawStatement(NonNull<ffi::sqlite3_stmt>);

unsafe impl Send for RawStatement {}

impl RawStatement {
    pub(crate) fn as_ptr(&self) -> *mut ffi::sqlite3_stmt {
        self.0.as_ptr()
    }

    fn finalize(self) {
        // the return code repeats the last step's error; the cursor is released either way
        unsafe {
            ffi::sqlite3_finalize(self.0.as_ptr());
        }
    }
}

pub(crate) struct Session {
    db: Option<rusqlite::Connection>,
    statements: HashMap<u64, RawStatement>,
    next_statement_id: u64,
    path: String,
}

impl Session {
    fn new(db: rusqlite::Connection, path: &str) -> Self {
        Self {
            db: Some(db),
            statements: HashMap::new(),
            next_statement_id: 1,
            path: path.to_string(),
        }
    }

    pub(crate) fn db(&self) -> Result<&rusqlite::Connection> {
        self.db.as_ref().ok_or(Error::ConnectionClosed)
    }

    pub(crate) fn statement(&self, id: u64) -> Option<&RawStatement> {
        self.statements.get(&id)
    }

    fn register(&mut self, stmt: RawStatement) -> u64 {
        let id = self.next_statement_id;
        self.next_statement_id += 1;
        self.statements.insert(id, stmt);
        id
    }

    /// Finalize one statement. Returns false if it was already gone.
    pub(crate) fn finalize_statement(&mut self, id: u64) -> bool {
        match self.statements.remove(&id) {
            Some(stmt) => {
                stmt.finalize();
                true
            }
            None => false,
        }
    }

    fn close(&mut self) -> Result<()> {
        let db = self.db.take().ok_or(Error::ConnectionClosed)?;
        if !self.statements.is_empty() {
            warn!(
                path = %self.path,
                statements = self.statements.len(),
                "closing database with live statements; finalizing them"
            );
        }
        for (_, stmt) in self.statements.drain() {
            stmt.finalize();
        }
        match db.close() {
            Ok(()) => {
                debug!(path = %self.path, "database closed");
                Ok(())
            }
            Err((db, e)) => {
                let (code, message) = engine_failure(&e);
                error!(path = %self.path, code, "failed to close database: {message}");
                self.db = Some(db);
                Err(Error::Close { code, message })
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.db.is_some() && self.close().is_err() {
            // rusqlite panics when dropping a connection it cannot close
            if let Some(db) = self.db.take() {
                std::mem::forget(db);
            }
        }
    }
}

pub(crate) fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Extended result code and message of the most recent failure on `db`.
///
/// # Safety
/// `db` must be an open engine handle.
pub(crate) unsafe fn engine_message(db: *mut ffi::sqlite3) -> (i32, String) {
    unsafe {
        let code = ffi::sqlite3_extended_errcode(db);
        let message = ffi::sqlite3_errmsg(db);
        let message = if message.is_null() {
            String::from("unknown error")
        } else {
            CStr::from_ptr(message).to_string_lossy().into_owned()
        };
        (code, message)
    }
}

/// Compile and step every statement in `sql` until it reports done, so a
/// runtime error on any row is surfaced.
fn run_batch(db: &rusqlite::Connection, sql: &str) -> rusqlite::Result<()> {
    let mut batch = rusqlite::Batch::new(db, sql);
    while let Some(mut stmt) = batch.next()? {
        let mut rows = stmt.raw_query();
        while rows.next()?.is_some() {}
    }
    Ok(())
}

pub struct Connection {
    session: Arc<Mutex<Session>>,
    path: String,
    config: ConnectionConfig,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Connection {
    pub(crate) fn open(path: &str, config: &ConnectionConfig) -> Result<Self> {
        let db = rusqlite::Connection::open_with_flags(path, config.open_flags()).map_err(|e| {
            let (code, message) = engine_failure(&e);
            error!(path, code, "Cannot open database: {message}");
            Error::Open {
                path: path.to_string(),
                code,
                message,
            }
        })?;

        if let Some(ms) = config.busy_timeout_ms {
            // dropping `db` on this path closes the half-configured handle
            db.busy_timeout(Duration::from_millis(ms)).map_err(|e| {
                let (code, message) = engine_failure(&e);
                error!(path, code, "Cannot configure database: {message}");
                Error::Open {
                    path: path.to_string(),
                    code,
                    message,
                }
            })?;
        }

        debug!(path, read_only = config.read_only, "database opened");
        Ok(Self {
            session: Arc::new(Mutex::new(Session::new(db, path))),
            path: path.to_string(),
            config: config.clone(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.session).db.is_none()
    }

    /// Run one or more `;`-separated statements to completion, discarding any
    /// rows they produce.
    ///
    /// On failure the connection stays open unless the connection was opened
    /// with `close_on_execute_error`, in which case it is closed before the
    /// error is returned.
    pub fn execute(&self, sql: &str) -> Result<()> {
        let mut session = lock(&self.session);
        let Err(e) = run_batch(session.db()?, sql) else {
            return Ok(());
        };

        let (code, message) = engine_failure(&e);
        error!(path = %self.path, code, "SQL error: {message}");
        if self.config.close_on_execute_error {
            warn!(path = %self.path, "closing connection after failed execute");
            if let Err(close_err) = session.close() {
                error!(path = %self.path, "close after failed execute also failed: {close_err}");
            }
        }
        Err(Error::Execute { code, message })
    }

    /// Compile the first statement in `sql`. Text after it is ignored.
    pub fn prepare(&self, sql: &str) -> Result<Statement> {
        let mut session = lock(&self.session);
        let db = unsafe { session.db()?.handle() };
        let len = c_int::try_from(sql.len()).map_err(|_| Error::Prepare {
            code: ffi::SQLITE_TOOBIG,
            message: String::from("SQL text is too long"),
        })?;

        let mut raw = ptr::null_mut();
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(db, sql.as_ptr() as *const c_char, len, &mut raw, ptr::null_mut())
        };
        if rc != ffi::SQLITE_OK {
            let (code, message) = unsafe { engine_message(db) };
            debug!(path = %self.path, code, "prepare failed: {message}");
            return Err(Error::Prepare { code, message });
        }
        let raw = NonNull::new(raw).ok_or(Error::EmptyStatement)?;

        let id = session.register(RawStatement(raw));
        debug!(path = %self.path, statement = id, "statement prepared");
        Ok(Statement::new(id, sql, Arc::downgrade(&self.session)))
    }

    /// Finalize every statement still open on this connection, then release
    /// the engine handle. Fails with `ConnectionClosed` if already closed.
    pub fn close(&mut self) -> Result<()> {
        lock(&self.session).close()
    }

    /// Rows modified by the most recent INSERT, UPDATE, or DELETE.
    pub fn changes(&self) -> Result<u64> {
        Ok(lock(&self.session).db()?.changes() as u64)
    }

    pub fn last_insert_rowid(&self) -> Result<i64> {
        Ok(lock(&self.session).db()?.last_insert_rowid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Connection {
        Connection::open(":memory:", &ConnectionConfig::default()).expect("open in-memory database")
    }

    #[test]
    fn test_execute_and_changes() {
        let conn = memory();
        conn.execute("CREATE TABLE t(a INTEGER); INSERT INTO t VALUES (1), (2), (3);")
            .expect("batch");
        assert_eq!(conn.changes().unwrap(), 3);
        assert_eq!(conn.last_insert_rowid().unwrap(), 3);
    }

    #[test]
    fn test_execute_error_keeps_connection_by_default() {
        let conn = memory();
        let err = conn.execute("SELEKT 1").unwrap_err();
        assert!(matches!(err, Error::Execute { .. }));
        assert!(err.to_string().contains("SELEKT"));
        assert!(!conn.is_closed());
        conn.execute("CREATE TABLE ok(a)").expect("still usable");
    }

    #[test]
    fn test_execute_runs_rows_to_completion() {
        let conn = memory();
        conn.execute("CREATE TABLE n(a INTEGER); INSERT INTO n VALUES (1), (0);")
            .unwrap();
        let err = conn
            .execute("SELECT CASE WHEN a = 0 THEN abs(-9223372036854775807 - 1) ELSE a END FROM n ORDER BY rowid")
            .unwrap_err();
        match err {
            Error::Execute { message, .. } => assert!(message.contains("overflow")),
            other => panic!("expected execute error, got {other:?}"),
        }
        assert!(!conn.is_closed());
    }

    #[test]
    fn test_execute_error_in_later_statement() {
        let conn = memory();
        let err = conn
            .execute("CREATE TABLE u(a UNIQUE); INSERT INTO u VALUES (1); INSERT INTO u VALUES (1);")
            .unwrap_err();
        assert!(matches!(err, Error::Execute { .. }));
        let mut stmt = conn.prepare("SELECT count(*) FROM u").unwrap();
        let row = stmt.fetch_one().unwrap().expect("count row");
        assert_eq!(row.get(1), Some(&crate::value::Value::Integer(1)));
    }

    #[test]
    fn test_execute_error_closes_when_configured() {
        let config = ConnectionConfig {
            close_on_execute_error: true,
            ..ConnectionConfig::default()
        };
        let conn = Connection::open(":memory:", &config).unwrap();
        assert!(conn.execute("SELEKT 1").is_err());
        assert!(conn.is_closed());
        assert!(matches!(conn.execute("SELECT 1"), Err(Error::ConnectionClosed)));
        assert!(matches!(conn.prepare("SELECT 1"), Err(Error::ConnectionClosed)));
    }

    #[test]
    fn test_prepare_failure_reports_engine_message() {
        let conn = memory();
        let err = conn.prepare("SELECT * FROM missing").unwrap_err();
        match err {
            Error::Prepare { code, message } => {
                assert_eq!(code & 0xff, ffi::SQLITE_ERROR);
                assert!(message.contains("missing"));
            }
            other => panic!("expected prepare error, got {other:?}"),
        }
    }

    #[test]
    fn test_prepare_empty_sql() {
        let conn = memory();
        assert!(matches!(conn.prepare(""), Err(Error::EmptyStatement)));
        assert!(matches!(conn.prepare("  -- nothing\n"), Err(Error::EmptyStatement)));
    }

    #[test]
    fn test_close_twice() {
        let mut conn = memory();
        conn.close().expect("first close");
        assert!(conn.is_closed());
        assert!(matches!(conn.close(), Err(Error::ConnectionClosed)));
        assert!(matches!(conn.changes(), Err(Error::ConnectionClosed)));
    }

    #[test]
    fn test_close_finalizes_live_statements() {
        let mut conn = memory();
        let stmt = conn.prepare("SELECT 1").unwrap();
        assert_eq!(lock(&conn.session).statements.len(), 1);
        conn.close().expect("close with live statement");
        assert!(lock(&conn.session).statements.is_empty());
        drop(stmt);
    }

    #[test]
    fn test_debug_output() {
        let conn = memory();
        let shown = format!("{conn:?}");
        assert!(shown.contains(":memory:"));
        assert!(shown.contains("closed: false"));
    }
}
