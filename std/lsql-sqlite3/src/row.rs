///
/// Row materialization.
///
/// A `Row` is built fresh from the cursor after every successful step and
/// owns its values, so it stays valid after the statement moves on or is
/// finalized. Column positions are 1-based to match the host's indexing.
///

use rusqlite::ffi;

use crate::value::{marshal, read_column, Value};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Value at 1-based `column`, or `None` outside `1..=len()`.
    pub fn get(&self, column: usize) -> Option<&Value> {
        column.checked_sub(1).and_then(|i| self.values.get(i))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// `(position, value)` pairs with positions starting at 1.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Value)> {
        self.values.iter().enumerate().map(|(i, v)| (i + 1, v))
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

/// Materialize the row the cursor is positioned on.
///
/// The column count is read from the cursor on every call rather than cached
/// on the statement.
///
/// # Safety
/// `stmt` must be a live statement whose last step returned `SQLITE_ROW`.
pub(crate) unsafe fn materialize(stmt: *mut ffi::sqlite3_stmt) -> Row {
    let count = unsafe { ffi::sqlite3_column_count(stmt) };
    let values = (0..count)
        .map(|index| marshal(unsafe { read_column(stmt, index) }))
        .collect();
    Row::new(values)
}
