//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for days and schedules.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository writes must enforce `DailySchedule::validate()` first.
//! - Read paths reject invalid persisted rows instead of masking them.

use crate::db::DbError;
use crate::model::schedule::ScheduleValidationError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod day_repo;
pub mod schedule_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for day and schedule persistence.
#[derive(Debug)]
pub enum RepoError {
    Validation(ScheduleValidationError),
    Db(DbError),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted schedule data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<ScheduleValidationError> for RepoError {
    fn from(value: ScheduleValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
