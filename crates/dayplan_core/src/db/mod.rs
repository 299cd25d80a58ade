//! SQLite storage bootstrap and schema migration entry points.
//!
//! # Responsibility
//! - Open and configure the single on-device SQLite connection.
//! - Apply schema migrations in deterministic order.
//! - Share the bootstrapped connection through `StoreHandle`.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Core code must not read/write schedule data before migrations succeed.

use crate::model::schedule::ScheduleMode;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;
mod store;

pub use migrations::ensure_schema;
pub use open::{open_db, open_db_in_memory};
pub use store::StoreHandle;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    ScheduleModeMismatch {
        stored: ScheduleMode,
        requested: ScheduleMode,
    },
    UnknownScheduleMode(String),
    /// Another thread panicked while holding the shared connection.
    Poisoned,
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::ScheduleModeMismatch { stored, requested } => write!(
                f,
                "database stores {stored} schedules; refusing to open it for {requested}"
            ),
            Self::UnknownScheduleMode(value) => {
                write!(f, "database has unknown schedule mode `{value}`")
            }
            Self::Poisoned => write!(f, "shared database connection is poisoned"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. }
            | Self::ScheduleModeMismatch { .. }
            | Self::UnknownScheduleMode(_)
            | Self::Poisoned => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
