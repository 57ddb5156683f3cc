//! SQLite storage bootstrap and schema management entry points.
//!
//! # Responsibility
//! - Open and configure SQLite connections.
//! - Ensure entity tables exist before any mutation or query runs.
//! - Classify SQLite failures into store-level errors.
//!
//! # Invariants
//! - Core code must not read/write entity data before `ensure_schema`
//!   succeeds on the connection.
//! - Unique index violations surface as `StoreError::UniqueViolation`.

use rusqlite::ffi;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod open;
pub mod schema;

pub use open::open_db;
pub use schema::{ensure_schema, SchemaError};

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection options for the embedded store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Database file. `None` opens a private in-memory database.
    pub path: Option<PathBuf>,
    /// Enables `PRAGMA foreign_keys`.
    pub foreign_keys: bool,
    /// How long a statement waits on a locked database before failing.
    pub busy_timeout: Duration,
    /// Opens the connection with SQLite's shared cache. For in-memory
    /// stores this selects the one process-wide shared database instead of
    /// a private one.
    pub shared_cache: bool,
}

impl StoreConfig {
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            ..Self::in_memory()
        }
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            foreign_keys: true,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            shared_cache: false,
        }
    }

    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn shared_cache(mut self, enabled: bool) -> Self {
        self.shared_cache = enabled;
        self
    }

    pub(crate) fn mode(&self) -> &'static str {
        if self.path.is_some() {
            "file"
        } else {
            "memory"
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Failure surfaced by the embedded store.
#[derive(Debug)]
pub enum StoreError {
    /// A unique index rejected the write.
    UniqueViolation { table: String, column: String },
    /// Any other SQLite or I/O failure.
    Other(rusqlite::Error),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UniqueViolation { table, column } => {
                write!(f, "unique constraint violated on {table}.{column}")
            }
            Self::Other(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::UniqueViolation { .. } => None,
            Self::Other(err) => Some(err),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, Some(message)) = &value {
            if code.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE {
                if let Some((table, column)) = parse_unique_target(message) {
                    return Self::UniqueViolation { table, column };
                }
            }
        }
        Self::Other(value)
    }
}

/// Extracts `table.column` from `UNIQUE constraint failed: users.email`.
///
/// Composite indexes report several targets; the first one is kept.
fn parse_unique_target(message: &str) -> Option<(String, String)> {
    let (_, targets) = message.split_once("failed: ")?;
    let first = targets.split(',').next()?.trim();
    let (table, column) = first.split_once('.')?;
    Some((table.to_string(), column.to_string()))
}
