///
/// lsql Runtime Library
///
/// The library a scripting host loads. Re-exports every `lsql_*` function
/// from the lsql crates and adds the library entry point and module metadata.
///
/// A host calls `lsql_open_library()` once after loading, then binds:
/// - `lsql_sqlite_open` / `lsql_sqlite_open_with` as the module's `connect`
/// - the connection, statement, and result-set functions as methods
/// - `lsql_module_name` / `lsql_module_version` as `_NAME` / `_VERSION`
///
/// Diagnostics (failed opens, failed executes, lifecycle events) go to stderr
/// through `tracing`. The level comes from `LSQL_LOG` (default `warn`).
///

pub use lsql_core::*;
pub use lsql_sqlite3::host::*;
pub use lsql_sqlite3::value::{
    LSQL_TYPE_BLOB, LSQL_TYPE_FLOAT, LSQL_TYPE_INTEGER, LSQL_TYPE_NULL, LSQL_TYPE_TEXT,
};

use tracing_subscriber::EnvFilter;

pub const MODULE_NAME: &str = "lsql SQLite3";
pub const MODULE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable holding the tracing filter directive.
pub const LOG_ENV: &str = "LSQL_LOG";

/// Install the stderr diagnostics subscriber. Safe to call more than once,
/// and a no-op when the host process already installed a subscriber.
/// Returns 1 if this call installed it, 0 otherwise.
#[unsafe(no_mangle)]
pub extern "C" fn lsql_open_library() -> i64 {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!(module = MODULE_NAME, version = MODULE_VERSION, "library loaded");
    }
    if installed { 1 } else { 0 }
}

#[unsafe(no_mangle)]
pub extern "C" fn lsql_module_name() -> *mut LsqlString {
    lsql_string_from_str(MODULE_NAME)
}

#[unsafe(no_mangle)]
pub extern "C" fn lsql_module_version() -> *mut LsqlString {
    lsql_string_from_str(MODULE_VERSION)
}
