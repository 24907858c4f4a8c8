///
/// Column value marshaling.
///
/// Converts one engine-typed column into a `Value`. Every storage class the
/// engine reports has a variant, so a row never has a gap where a NULL or a
/// blob sat. Text keeps the exact bytes the engine reported, whether or not
/// they are valid UTF-8.
///
/// Host type tags (returned by `lsql_sqlite_value_type`):
/// - 0: null
/// - 1: integer
/// - 2: float
/// - 3: text
/// - 4: blob
///

use std::ffi::c_int;

use rusqlite::ffi;

pub const LSQL_TYPE_NULL: i64 = 0;
pub const LSQL_TYPE_INTEGER: i64 = 1;
pub const LSQL_TYPE_FLOAT: i64 = 2;
pub const LSQL_TYPE_TEXT: i64 = 3;
pub const LSQL_TYPE_BLOB: i64 = 4;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(Vec<u8>),
    Blob(Vec<u8>),
}

impl Value {
    pub fn type_tag(&self) -> i64 {
        match self {
            Value::Null => LSQL_TYPE_NULL,
            Value::Integer(_) => LSQL_TYPE_INTEGER,
            Value::Float(_) => LSQL_TYPE_FLOAT,
            Value::Text(_) => LSQL_TYPE_TEXT,
            Value::Blob(_) => LSQL_TYPE_BLOB,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Text as `&str`, or `None` if this is not text or not valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        self.as_text_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_text_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Text(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s.into_bytes())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Blob(b)
    }
}

/// Raw column content as the engine reports it, borrowed from the cursor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ColumnContent<'a> {
    Null,
    Integer(i64),
    Float(f64),
    Text(&'a [u8]),
    Blob(&'a [u8]),
}

pub(crate) fn marshal(content: ColumnContent<'_>) -> Value {
    match content {
        ColumnContent::Null => Value::Null,
        ColumnContent::Integer(i) => Value::Integer(i),
        ColumnContent::Float(f) => Value::Float(f),
        ColumnContent::Text(bytes) => Value::Text(bytes.to_vec()),
        ColumnContent::Blob(bytes) => Value::Blob(bytes.to_vec()),
    }
}

/// Read column `index` (0-based) of the row the cursor is positioned on.
///
/// # Safety
/// `stmt` must be a live statement whose last step returned `SQLITE_ROW`, and
/// `index` must be below its column count. The returned slices are only valid
/// until the cursor is stepped, reset, or finalized.
pub(crate) unsafe fn read_column<'a>(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> ColumnContent<'a> {
    unsafe {
        match ffi::sqlite3_column_type(stmt, index) {
            ffi::SQLITE_INTEGER => ColumnContent::Integer(ffi::sqlite3_column_int64(stmt, index)),
            ffi::SQLITE_FLOAT => ColumnContent::Float(ffi::sqlite3_column_double(stmt, index)),
            ffi::SQLITE_TEXT => {
                // text pointer first, then the byte count of that representation
                let data = ffi::sqlite3_column_text(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                ColumnContent::Text(raw_slice(data, len))
            }
            ffi::SQLITE_BLOB => {
                let data = ffi::sqlite3_column_blob(stmt, index) as *const u8;
                let len = ffi::sqlite3_column_bytes(stmt, index);
                ColumnContent::Blob(raw_slice(data, len))
            }
            _ => ColumnContent::Null,
        }
    }
}

unsafe fn raw_slice<'a>(data: *const u8, len: c_int) -> &'a [u8] {
    if data.is_null() || len <= 0 {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(data, len as usize) }
    }
}
