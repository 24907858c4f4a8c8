///
/// lsql SQLite3 Database Support
///
/// Opens SQLite databases, runs SQL directly, and pulls rows from prepared
/// statements one at a time or all at once. Uses rusqlite with bundled SQLite
/// for zero system dependency.
///
/// Architecture:
/// - `open` / `open_with` return a `Connection` owning one engine session.
/// - `Connection::prepare` returns a `Statement` holding a weak reference to
///   that session; the session owns the native cursor and finalizes it when
///   either side closes.
/// - Each step materializes a `Row` of `Value`s (null, integer, float, text,
///   blob), addressed from column 1.
/// - Native resources are released by explicit `close` calls or on `Drop`.
/// - `host` exposes the same operations as a C ABI for scripting hosts:
///   handles are i64 ids kept in thread-safe registries, and failures raise
///   a `DbError` through lsql-core's exception slot.
///
/// Functions:
/// - Entry: open, open_with
/// - Connection: execute, prepare, close, changes, last_insert_rowid
/// - Statement: fetch_one, fetch_all, reset, column_count, column_names, close
///

pub mod config;
pub mod connection;
pub mod errors;
pub mod host;
pub mod row;
pub mod statement;
pub mod value;

pub use config::ConnectionConfig;
pub use connection::Connection;
pub use errors::{Error, ErrorKind, Result};
pub use row::Row;
pub use statement::Statement;
pub use value::Value;

/// Path that selects a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// Open `path` (or `":memory:"`) with the default configuration.
pub fn open(path: &str) -> Result<Connection> {
    open_with(path, &ConnectionConfig::default())
}

/// Open `path` with an explicit configuration. On failure the engine message
/// is logged and returned; no connection exists afterwards.
pub fn open_with(path: &str, config: &ConnectionConfig) -> Result<Connection> {
    Connection::open(path, config)
}

/// Version string of the bundled SQLite engine.
pub fn engine_version() -> &'static str {
    rusqlite::version()
}
