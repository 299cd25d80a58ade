//! Day repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Map calendar dates to stable `DayId` values.
//! - Create day rows lazily on first reference.
//!
//! # Invariants
//! - One `days` row per date; re-resolving returns the same id.
//! - Creation goes through the unique constraint, never check-then-insert.
//! - Day rows are never deleted here.

use crate::model::schedule::{format_date, parse_date, DayId};
use crate::repo::{RepoError, RepoResult};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};

/// Persisted day row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayRecord {
    pub day_id: DayId,
    pub date: NaiveDate,
}

/// Repository interface for day identity.
pub trait DayRepository {
    /// Returns the id for `date`, inserting a row when none exists.
    fn resolve_day_id(&self, date: NaiveDate) -> RepoResult<DayId>;
    /// Returns the id for `date` without creating it.
    fn find_day_id(&self, date: NaiveDate) -> RepoResult<Option<DayId>>;
    /// Lists every known day ordered by date.
    fn list_days(&self) -> RepoResult<Vec<DayRecord>>;
}

/// SQLite-backed day repository.
///
/// Accepts a plain connection or a `Transaction` (through deref), so the
/// schedule writer resolves ids inside its own transaction scope.
pub struct SqliteDayRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDayRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl DayRepository for SqliteDayRepository<'_> {
    fn resolve_day_id(&self, date: NaiveDate) -> RepoResult<DayId> {
        let date_text = format_date(date);
        self.conn.execute(
            "INSERT INTO days (date) VALUES (?1)
             ON CONFLICT(date) DO NOTHING;",
            [date_text.as_str()],
        )?;

        let day_id: i64 = self.conn.query_row(
            "SELECT day_id FROM days WHERE date = ?1;",
            [date_text.as_str()],
            |row| row.get(0),
        )?;
        Ok(DayId(day_id))
    }

    fn find_day_id(&self, date: NaiveDate) -> RepoResult<Option<DayId>> {
        let day_id: Option<i64> = self
            .conn
            .query_row(
                "SELECT day_id FROM days WHERE date = ?1;",
                [format_date(date)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(day_id.map(DayId))
    }

    fn list_days(&self) -> RepoResult<Vec<DayRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT day_id, date FROM days ORDER BY date ASC;")?;
        let mut rows = stmt.query([])?;
        let mut days = Vec::new();
        while let Some(row) = rows.next()? {
            let date_text: String = row.get("date")?;
            let date = parse_date(&date_text).map_err(|_| {
                RepoError::InvalidData(format!("invalid date value `{date_text}` in days.date"))
            })?;
            days.push(DayRecord {
                day_id: DayId(row.get("day_id")?),
                date,
            });
        }
        Ok(days)
    }
}
