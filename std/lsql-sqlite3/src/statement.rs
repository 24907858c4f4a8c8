///
/// Prepared statements.
///
/// A `Statement` is an id into its connection's session plus a weak
/// reference to that session. Every operation locks the session, looks the
/// native cursor up, and works on it under the lock.
///
/// Once a step reports the end of the result set the statement stays
/// exhausted: further fetches return nothing instead of letting the engine
/// silently restart the query. A failed step leaves it failed in the same way,
/// and further fetches repeat that failure. `reset` rewinds either state.
///

use std::ffi::CStr;
use std::sync::{Mutex, Weak};

use rusqlite::ffi;
use tracing::debug;

use crate::connection::{engine_message, lock, Session};
use crate::errors::{Error, Result};
use crate::row::{materialize, Row};

/// Where the cursor stands between fetches.
#[derive(Debug, Clone, PartialEq)]
enum CursorState {
    Active,
    Exhausted,
    Failed { code: i32, message: String },
}

pub struct Statement {
    id: u64,
    sql: String,
    session: Weak<Mutex<Session>>,
    state: CursorState,
    finalized: bool,
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("id", &self.id)
            .field("sql", &self.sql)
            .field("state", &self.state)
            .field("finalized", &self.finalized)
            .finish()
    }
}

/// Advance the cursor once.
///
/// # Safety
/// `db` must be the open handle `stmt` was prepared on, and the caller must
/// hold the session lock.
unsafe fn step(db: *mut ffi::sqlite3, stmt: *mut ffi::sqlite3_stmt) -> Result<Option<Row>> {
    match unsafe { ffi::sqlite3_step(stmt) } {
        ffi::SQLITE_ROW => Ok(Some(unsafe { materialize(stmt) })),
        ffi::SQLITE_DONE => Ok(None),
        _ => {
            let (code, message) = unsafe { engine_message(db) };
            Err(Error::Step { code, message })
        }
    }
}

impl Statement {
    pub(crate) fn new(id: u64, sql: &str, session: Weak<Mutex<Session>>) -> Self {
        Self {
            id,
            sql: sql.to_string(),
            session,
            state: CursorState::Active,
            finalized: false,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn is_closed(&self) -> bool {
        self.finalized
    }

    fn with_cursor<T>(
        &self,
        f: impl FnOnce(*mut ffi::sqlite3, *mut ffi::sqlite3_stmt) -> Result<T>,
    ) -> Result<T> {
        if self.finalized {
            return Err(Error::StatementFinalized);
        }
        let session = self.session.upgrade().ok_or(Error::ConnectionClosed)?;
        let session = lock(&session);
        let db = unsafe { session.db()?.handle() };
        let stmt = session.statement(self.id).ok_or(Error::StatementFinalized)?;
        f(db, stmt.as_ptr())
    }

    /// `Some(result)` when the cursor is past its last step. Still reports a
    /// closed statement or connection first.
    fn settled<T>(&self, done: T) -> Option<Result<T>> {
        match &self.state {
            CursorState::Active => None,
            CursorState::Exhausted => Some(self.with_cursor(|_, _| Ok(done))),
            CursorState::Failed { code, message } => Some(self.with_cursor(|_, _| {
                Err(Error::Step {
                    code: *code,
                    message: message.clone(),
                })
            })),
        }
    }

    /// Move the cursor state on after a fetch. Errors other than a failed
    /// step are not about the cursor and leave it untouched.
    fn record<T>(&mut self, result: &Result<T>, done: impl FnOnce(&T) -> bool) {
        match result {
            Ok(value) => {
                if done(value) {
                    self.state = CursorState::Exhausted;
                }
            }
            Err(Error::Step { code, message }) => {
                debug!(statement = self.id, code, "statement failed: {message}");
                self.state = CursorState::Failed {
                    code: *code,
                    message: message.clone(),
                };
            }
            Err(_) => {}
        }
    }

    /// Step once. `None` once the result set is exhausted.
    pub fn fetch_one(&mut self) -> Result<Option<Row>> {
        if let Some(settled) = self.settled(None) {
            return settled;
        }
        let row = self.with_cursor(|db, stmt| unsafe { step(db, stmt) });
        self.record(&row, Option::is_none);
        row
    }

    /// Step until exhausted, returning the remaining rows in order. On a
    /// failed step the rows collected so far are discarded.
    pub fn fetch_all(&mut self) -> Result<Vec<Row>> {
        if let Some(settled) = self.settled(Vec::new()) {
            return settled;
        }
        let rows = self.with_cursor(|db, stmt| {
            let mut rows = Vec::new();
            while let Some(row) = unsafe { step(db, stmt)? } {
                rows.push(row);
            }
            Ok(rows)
        });
        self.record(&rows, |_| true);
        rows
    }

    /// Rewind to before the first row so the query runs again.
    pub fn reset(&mut self) -> Result<()> {
        self.with_cursor(|_, stmt| {
            // a non-OK code here repeats the last step's error, already reported
            unsafe {
                ffi::sqlite3_reset(stmt);
            }
            Ok(())
        })?;
        self.state = CursorState::Active;
        Ok(())
    }

    pub fn column_count(&self) -> Result<usize> {
        self.with_cursor(|_, stmt| Ok(unsafe { ffi::sqlite3_column_count(stmt) }.max(0) as usize))
    }

    pub fn column_names(&self) -> Result<Vec<String>> {
        self.with_cursor(|_, stmt| {
            let count = unsafe { ffi::sqlite3_column_count(stmt) };
            let names = (0..count)
                .map(|i| {
                    let name = unsafe { ffi::sqlite3_column_name(stmt, i) };
                    if name.is_null() {
                        String::new()
                    } else {
                        unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned()
                    }
                })
                .collect();
            Ok(names)
        })
    }

    /// Finalize the native cursor.
    ///
    /// Closing a statement whose connection is already closed succeeds: the
    /// connection finalized the cursor when it closed. Closing twice fails
    /// with `StatementFinalized`.
    pub fn close(&mut self) -> Result<()> {
        if self.finalized {
            return Err(Error::StatementFinalized);
        }
        self.finalized = true;
        if let Some(session) = self.session.upgrade() {
            if lock(&session).finalize_statement(self.id) {
                debug!(statement = self.id, "statement finalized");
            }
        }
        Ok(())
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        if !self.finalized {
            let _ = self.close();
        }
    }
}
