///
/// # Connection Configuration
///
/// Options a host can supply when opening a database, either built in code or
/// parsed from TOML:
///
/// ```toml
/// read_only = false
/// create = true
/// uri = false
/// busy_timeout_ms = 5000
/// close_on_execute_error = false
/// ```
///
/// Every key is optional; missing keys take the defaults below. Unknown keys
/// are rejected so a misspelled option does not silently fall back to its
/// default.
///
/// `close_on_execute_error` restores the old "a failed execute closes the
/// connection" contract for hosts that depend on it. It is off by default:
/// a failed `execute` reports the error and leaves the connection usable.
///

use std::path::Path;

use rusqlite::OpenFlags;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionConfig {
    pub read_only: bool,
    pub create: bool,
    pub uri: bool,
    pub busy_timeout_ms: Option<u64>,
    pub close_on_execute_error: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_only: false,
            create: true,
            uri: false,
            busy_timeout_ms: None,
            close_on_execute_error: false,
        }
    }
}

impl ConnectionConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Engine open flags. Access to each connection is serialized by the
    /// connection's own mutex, so the engine's per-connection mutex is off.
    pub(crate) fn open_flags(&self) -> OpenFlags {
        let mut flags = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else if self.create {
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };
        if self.uri {
            flags |= OpenFlags::SQLITE_OPEN_URI;
        }
        flags | OpenFlags::SQLITE_OPEN_NO_MUTEX
    }
}
