///
/// SQLite layer error types.
///
/// Every failure the layer can report: engine failures while opening,
/// executing, compiling, or stepping; use of a handle after it was closed;
/// configuration problems; and lookups through the host ABI.
///
/// Engine failures carry the extended SQLite result code and the engine's own
/// message text.
///

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Cannot open database '{path}': {message}")]
    Open {
        path: String,
        code: i32,
        message: String,
    },

    #[error("SQL error: {message}")]
    Execute { code: i32, message: String },

    #[error("Statement compilation failed: {message}")]
    Prepare { code: i32, message: String },

    #[error("SQL text contains no statement")]
    EmptyStatement,

    #[error("Step failed: {message}")]
    Step { code: i32, message: String },

    #[error("Failed to close database: {message}")]
    Close { code: i32, message: String },

    #[error("Database connection is closed")]
    ConnectionClosed,

    #[error("Statement is finalized")]
    StatementFinalized,

    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid {kind} handle {handle}")]
    InvalidHandle { kind: &'static str, handle: i64 },

    #[error("No value at row {row}, column {column}")]
    IndexOutOfRange { row: i64, column: i64 },
}

/// Stable numeric tags for each error class, shared with the host through the
/// `kind` field of a raised `DbError`.
#[repr(i64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Open = 1,
    Execute = 2,
    Prepare = 3,
    EmptyStatement = 4,
    Step = 5,
    Close = 6,
    ConnectionClosed = 7,
    StatementFinalized = 8,
    Config = 9,
    Io = 10,
    InvalidHandle = 11,
    IndexOutOfRange = 12,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Open { .. } => ErrorKind::Open,
            Error::Execute { .. } => ErrorKind::Execute,
            Error::Prepare { .. } => ErrorKind::Prepare,
            Error::EmptyStatement => ErrorKind::EmptyStatement,
            Error::Step { .. } => ErrorKind::Step,
            Error::Close { .. } => ErrorKind::Close,
            Error::ConnectionClosed => ErrorKind::ConnectionClosed,
            Error::StatementFinalized => ErrorKind::StatementFinalized,
            Error::Config(_) => ErrorKind::Config,
            Error::Io(_) => ErrorKind::Io,
            Error::InvalidHandle { .. } => ErrorKind::InvalidHandle,
            Error::IndexOutOfRange { .. } => ErrorKind::IndexOutOfRange,
        }
    }

    /// Extended SQLite result code, or -1 when the engine was not involved.
    pub fn code(&self) -> i64 {
        match self {
            Error::Open { code, .. }
            | Error::Execute { code, .. }
            | Error::Prepare { code, .. }
            | Error::Step { code, .. }
            | Error::Close { code, .. } => *code as i64,
            _ => -1,
        }
    }
}

/// Split a rusqlite error into the extended result code and message text.
pub(crate) fn engine_failure(e: &rusqlite::Error) -> (i32, String) {
    match e {
        rusqlite::Error::SqliteFailure(err, Some(message)) => (err.extended_code, message.clone()),
        rusqlite::Error::SqliteFailure(err, None) => (err.extended_code, err.to_string()),
        _ => (-1, e.to_string()),
    }
}
