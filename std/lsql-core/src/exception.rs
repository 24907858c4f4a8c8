//!
//! Exception Handling Primitives
//!
//! Thread-local exception storage. A failing host call stores an exception
//! pointer plus a type id here and returns a sentinel; the host checks
//! `lsql_exception_check()` after every call and turns a pending exception into
//! its own error value.
//!
//! Exception Type IDs:
//! - 0: Unknown/host-defined exception
//! - 1: DBError (payload layout owned by lsql-sqlite3)
//!

use std::cell::Cell;

thread_local! {
    static CURRENT_EXCEPTION: Cell<*mut u8> = const { Cell::new(std::ptr::null_mut()) };
    static CURRENT_EXCEPTION_TYPE_ID: Cell<i64> = const { Cell::new(0) };
}

/// Exception type IDs for built-in exceptions
pub const EXCEPTION_TYPE_UNKNOWN: i64 = 0;
pub const EXCEPTION_TYPE_DB_ERROR: i64 = 1;

/// Set the current exception
#[unsafe(no_mangle)]
pub extern "C" fn lsql_exception_set(exception_ptr: *mut u8) {
    CURRENT_EXCEPTION.with(|ex| ex.set(exception_ptr));
    CURRENT_EXCEPTION_TYPE_ID.with(|id| id.set(EXCEPTION_TYPE_UNKNOWN));
}

/// Set the current exception with type ID
#[unsafe(no_mangle)]
pub extern "C" fn lsql_exception_set_typed(exception_ptr: *mut u8, type_id: i64) {
    CURRENT_EXCEPTION.with(|ex| ex.set(exception_ptr));
    CURRENT_EXCEPTION_TYPE_ID.with(|id| id.set(type_id));
}

/// Get the current exception type ID
#[unsafe(no_mangle)]
pub extern "C" fn lsql_exception_get_type_id() -> i64 {
    CURRENT_EXCEPTION_TYPE_ID.with(|id| id.get())
}

/// Check if current exception matches the given type ID
#[unsafe(no_mangle)]
pub extern "C" fn lsql_exception_is_type(type_id: i64) -> i64 {
    let current = CURRENT_EXCEPTION_TYPE_ID.with(|id| id.get());
    if current == type_id { 1 } else { 0 }
}

/// Get the current exception pointer (null if none)
#[unsafe(no_mangle)]
pub extern "C" fn lsql_exception_get() -> *mut u8 {
    CURRENT_EXCEPTION.with(|ex| ex.get())
}

/// Clear the current exception. Ownership of the payload stays with whoever
/// fetched it through `lsql_exception_get`.
#[unsafe(no_mangle)]
pub extern "C" fn lsql_exception_clear() {
    CURRENT_EXCEPTION.with(|ex| ex.set(std::ptr::null_mut()));
    CURRENT_EXCEPTION_TYPE_ID.with(|id| id.set(EXCEPTION_TYPE_UNKNOWN));
}

/// Check if there's a pending exception
#[unsafe(no_mangle)]
pub extern "C" fn lsql_exception_check() -> i64 {
    CURRENT_EXCEPTION.with(|ex| if ex.get().is_null() { 0 } else { 1 })
}
