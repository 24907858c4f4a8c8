///
/// Host C ABI.
///
/// Uses three handle registries:
/// - CONN_REGISTRY: maps i64 handle → Connection
/// - STMT_REGISTRY: maps i64 handle → Statement
/// - ROWS_REGISTRY: maps i64 handle → materialized result set (Vec<Row>)
///
/// Handle ids start at 1 and are never reused, so an id that was issued but
/// is no longer registered is known to be closed. Such ids report
/// `ConnectionClosed` / `StatementFinalized`; ids that were never issued
/// report `InvalidHandle`.
///
/// Result-set accessors take 1-based row and column indices. `fetchone`
/// yields a set of zero or one rows, `fetchall` a set of N rows keyed 1..N.
///
/// Error handling follows the exception pattern:
/// - On success: return value normally
/// - On failure: raise a `DbError` (EXCEPTION_TYPE_DB_ERROR) and return a
///   sentinel (-1, 0, 0.0, or null)
///

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};

use lsql_core::{
    lsql_bytes_from_slice, lsql_exception_set_typed, lsql_string_decref, lsql_string_from_bytes,
    lsql_string_from_str,
    LsqlBytes, LsqlString, EXCEPTION_TYPE_DB_ERROR,
};

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::errors::{Error, Result};
use crate::row::Row;
use crate::statement::Statement;
use crate::value::Value;

/// Exception payload raised for every failure.
#[repr(C)]
pub struct DbError {
    pub message: *mut LsqlString,
    pub code: i64,
    pub kind: i64,
}

/// `kind` of a `DbError` built by host code rather than by this layer.
pub const DB_ERROR_KIND_HOST: i64 = 0;

fn throw_db_error(err: &Error) {
    let payload = Box::new(DbError {
        message: lsql_string_from_str(&err.to_string()),
        code: err.code(),
        kind: err.kind() as i64,
    });
    lsql_exception_set_typed(Box::into_raw(payload) as *mut u8, EXCEPTION_TYPE_DB_ERROR);
}

fn report<T>(result: Result<T>, sentinel: T) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            throw_db_error(&e);
            sentinel
        }
    }
}

fn string_from_host(s: *const LsqlString) -> String {
    if s.is_null() {
        return String::new();
    }
    unsafe { (*s).to_string_lossy() }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleKind {
    Connection,
    Statement,
    Rows,
}

impl HandleKind {
    fn name(self) -> &'static str {
        match self {
            HandleKind::Connection => "connection",
            HandleKind::Statement => "statement",
            HandleKind::Rows => "result set",
        }
    }
}

struct HandleRegistry<T> {
    kind: HandleKind,
    entries: HashMap<i64, T>,
    next_id: i64,
}

impl<T> HandleRegistry<T> {
    fn new(kind: HandleKind) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
            next_id: 1,
        }
    }

    fn insert(&mut self, entry: T) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, entry);
        id
    }

    fn missing(&self, handle: i64) -> Error {
        let issued = handle > 0 && handle < self.next_id;
        match self.kind {
            HandleKind::Connection if issued => Error::ConnectionClosed,
            HandleKind::Statement if issued => Error::StatementFinalized,
            kind => Error::InvalidHandle {
                kind: kind.name(),
                handle,
            },
        }
    }

    fn get(&self, handle: i64) -> Result<&T> {
        self.entries.get(&handle).ok_or_else(|| self.missing(handle))
    }

    fn get_mut(&mut self, handle: i64) -> Result<&mut T> {
        if !self.entries.contains_key(&handle) {
            return Err(self.missing(handle));
        }
        Ok(self.entries.get_mut(&handle).expect("entry present"))
    }

    fn remove(&mut self, handle: i64) -> Result<T> {
        match self.entries.remove(&handle) {
            Some(entry) => Ok(entry),
            None => Err(self.missing(handle)),
        }
    }
}

static CONN_REGISTRY: LazyLock<Mutex<HandleRegistry<Connection>>> =
    LazyLock::new(|| Mutex::new(HandleRegistry::new(HandleKind::Connection)));

static STMT_REGISTRY: LazyLock<Mutex<HandleRegistry<Statement>>> =
    LazyLock::new(|| Mutex::new(HandleRegistry::new(HandleKind::Statement)));

static ROWS_REGISTRY: LazyLock<Mutex<HandleRegistry<Vec<Row>>>> =
    LazyLock::new(|| Mutex::new(HandleRegistry::new(HandleKind::Rows)));

fn registry<T>(reg: &Mutex<HandleRegistry<T>>) -> MutexGuard<'_, HandleRegistry<T>> {
    reg.lock().unwrap_or_else(PoisonError::into_inner)
}

fn store_connection(result: Result<Connection>) -> i64 {
    report(result.map(|conn| registry(&CONN_REGISTRY).insert(conn)), -1)
}

fn store_rows(result: Result<Vec<Row>>) -> i64 {
    report(result.map(|rows| registry(&ROWS_REGISTRY).insert(rows)), -1)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_sqlite_open(path: *const LsqlString) -> i64 {
    let path = string_from_host(path);
    store_connection(crate::open(&path))
}

/// Open with a TOML configuration document (see `ConnectionConfig`).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_sqlite_open_with(
    path: *const LsqlString,
    config: *const LsqlString,
) -> i64 {
    let path = string_from_host(path);
    let config = ConnectionConfig::from_toml_str(&string_from_host(config));
    store_connection(config.and_then(|config| crate::open_with(&path, &config)))
}

/// Close a connection and free its handle. A connection that already closed
/// itself after a failed execute is released without error.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_sqlite_close(handle: i64) {
    let removed = registry(&CONN_REGISTRY).remove(handle);
    let result = removed.and_then(|mut conn| match conn.close() {
        Err(Error::ConnectionClosed) => Ok(()),
        other => other,
    });
    report(result, ())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_sqlite_execute(handle: i64, sql: *const LsqlString) {
    let sql = string_from_host(sql);
    let reg = registry(&CONN_REGISTRY);
    report(reg.get(handle).and_then(|conn| conn.execute(&sql)), ())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_sqlite_prepare(handle: i64, sql: *const LsqlString) -> i64 {
    let sql = string_from_host(sql);
    let reg = registry(&CONN_REGISTRY);
    let stmt = reg.get(handle).and_then(|conn| conn.prepare(&sql));
    report(stmt.map(|stmt| registry(&STMT_REGISTRY).insert(stmt)), -1)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_sqlite_changes(handle: i64) -> i64 {
    let reg = registry(&CONN_REGISTRY);
    report(reg.get(handle).and_then(|conn| conn.changes()).map(|n| n as i64), -1)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_sqlite_last_insert_id(handle: i64) -> i64 {
    let reg = registry(&CONN_REGISTRY);
    report(reg.get(handle).and_then(|conn| conn.last_insert_rowid()), -1)
}

/// Step once; returns a result-set handle holding zero or one rows.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_sqlite_fetchone(stmt_handle: i64) -> i64 {
    let mut reg = registry(&STMT_REGISTRY);
    let row = reg.get_mut(stmt_handle).and_then(|stmt| stmt.fetch_one());
    store_rows(row.map(|row| row.into_iter().collect()))
}

/// Step until exhausted; returns a result-set handle holding every row.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_sqlite_fetchall(stmt_handle: i64) -> i64 {
    let mut reg = registry(&STMT_REGISTRY);
    store_rows(reg.get_mut(stmt_handle).and_then(|stmt| stmt.fetch_all()))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_sqlite_stmt_reset(stmt_handle: i64) {
    let mut reg = registry(&STMT_REGISTRY);
    report(reg.get_mut(stmt_handle).and_then(|stmt| stmt.reset()), ())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_sqlite_stmt_column_count(stmt_handle: i64) -> i64 {
    let reg = registry(&STMT_REGISTRY);
    report(reg.get(stmt_handle).and_then(|stmt| stmt.column_count()).map(|n| n as i64), -1)
}

/// Finalize a statement and free its handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_sqlite_stmt_close(stmt_handle: i64) {
    let removed = registry(&STMT_REGISTRY).remove(stmt_handle);
    report(removed.and_then(|mut stmt| stmt.close()), ())
}

fn with_value<T>(rows_handle: i64, row: i64, col: i64, f: impl FnOnce(&Value) -> T) -> Result<T> {
    let reg = registry(&ROWS_REGISTRY);
    let rows = reg.get(rows_handle)?;
    let value = usize::try_from(row)
        .ok()
        .and_then(|r| r.checked_sub(1))
        .and_then(|r| rows.get(r))
        .and_then(|r| usize::try_from(col).ok().and_then(|c| r.get(c)))
        .ok_or(Error::IndexOutOfRange { row, column: col })?;
    Ok(f(value))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_sqlite_rows_len(rows_handle: i64) -> i64 {
    let reg = registry(&ROWS_REGISTRY);
    report(reg.get(rows_handle).map(|rows| rows.len() as i64), -1)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_sqlite_rows_column_count(rows_handle: i64, row: i64) -> i64 {
    let reg = registry(&ROWS_REGISTRY);
    let count = reg.get(rows_handle).and_then(|rows| {
        usize::try_from(row)
            .ok()
            .and_then(|r| r.checked_sub(1))
            .and_then(|r| rows.get(r))
            .map(|r| r.len() as i64)
            .ok_or(Error::IndexOutOfRange { row, column: 0 })
    });
    report(count, -1)
}

/// One of the `LSQL_TYPE_*` tags.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_sqlite_value_type(rows_handle: i64, row: i64, col: i64) -> i64 {
    report(with_value(rows_handle, row, col, Value::type_tag), -1)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_sqlite_get_int(rows_handle: i64, row: i64, col: i64) -> i64 {
    let value = with_value(rows_handle, row, col, |val| match val {
        Value::Integer(i) => *i,
        Value::Float(f) => *f as i64,
        Value::Text(_) => val.as_text().and_then(|s| s.trim().parse::<i64>().ok()).unwrap_or(0),
        Value::Null | Value::Blob(_) => 0,
    });
    report(value, 0)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_sqlite_get_float(rows_handle: i64, row: i64, col: i64) -> f64 {
    let value = with_value(rows_handle, row, col, |val| match val {
        Value::Float(f) => *f,
        Value::Integer(i) => *i as f64,
        Value::Text(_) => val.as_text().and_then(|s| s.trim().parse::<f64>().ok()).unwrap_or(0.0),
        Value::Null | Value::Blob(_) => 0.0,
    });
    report(value, 0.0)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_sqlite_get_string(
    rows_handle: i64,
    row: i64,
    col: i64,
) -> *mut LsqlString {
    let value = with_value(rows_handle, row, col, |val| match val {
        Value::Text(b) => lsql_string_from_bytes(b),
        Value::Integer(i) => lsql_string_from_str(&i.to_string()),
        Value::Float(f) => lsql_string_from_str(&f.to_string()),
        Value::Null => lsql_string_from_str(""),
        Value::Blob(b) => lsql_string_from_str(&format!("<blob {} bytes>", b.len())),
    });
    report(value, std::ptr::null_mut())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_sqlite_get_bytes(
    rows_handle: i64,
    row: i64,
    col: i64,
) -> *mut LsqlBytes {
    let value = with_value(rows_handle, row, col, |val| match val {
        Value::Blob(b) => lsql_bytes_from_slice(b),
        Value::Text(b) => lsql_bytes_from_slice(b),
        _ => lsql_bytes_from_slice(&[]),
    });
    report(value, std::ptr::null_mut())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_sqlite_rows_free(rows_handle: i64) {
    report(registry(&ROWS_REGISTRY).remove(rows_handle).map(drop), ())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_sqlite_engine_version() -> *mut LsqlString {
    lsql_string_from_str(crate::engine_version())
}

/// Build a `DbError` from host code, e.g. to rethrow. Takes a reference on
/// `message`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_sqlite_error_new(message: *mut LsqlString, code: i64) -> *mut DbError {
    unsafe { lsql_core::lsql_string_incref(message) };
    Box::into_raw(Box::new(DbError {
        message,
        code,
        kind: DB_ERROR_KIND_HOST,
    }))
}

/// Release a `DbError` taken from the exception slot or built by
/// `lsql_sqlite_error_new`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_sqlite_error_free(err: *mut DbError) {
    if err.is_null() {
        return;
    }
    unsafe {
        let err = Box::from_raw(err);
        lsql_string_decref(err.message);
    }
}
