//! Schedule repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Replace all persisted rows of one day in a single transaction.
//! - Rebuild complete `DailySchedule` values from persisted rows.
//!
//! # Invariants
//! - `save_schedule` is all-or-nothing; a failed save leaves the previous
//!   snapshot untouched.
//! - Activity rows of a day are deleted before the new set is inserted.
//! - Reads always return a complete shape (24 slots or a possibly empty
//!   interval list, plus a sleep window).

use crate::db::migrations::stored_schedule_mode;
use crate::db::DbError;
use crate::model::schedule::{
    empty_slots, DailySchedule, DayActivities, DayId, HourSlot, IntervalEntry, ScheduleMode,
    ScheduleValidationError, SleepWindow, TimeOfDay,
};
use crate::repo::day_repo::{DayRepository, SqliteDayRepository};
use crate::repo::{RepoError, RepoResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::collections::BTreeMap;

/// Repository interface for whole-day schedule persistence.
pub trait ScheduleRepository {
    /// Atomically replaces the persisted snapshot of `schedule.date`.
    fn save_schedule(&mut self, schedule: &DailySchedule) -> RepoResult<DayId>;
    /// Loads one day, default-filling anything not persisted.
    fn load_schedule(&self, date: NaiveDate) -> RepoResult<DailySchedule>;
    /// Loads every persisted day keyed by date.
    fn load_all(&self) -> RepoResult<BTreeMap<NaiveDate, DailySchedule>>;
}

/// SQLite-backed schedule repository.
pub struct SqliteScheduleRepository<'conn> {
    conn: &'conn mut Connection,
    mode: ScheduleMode,
}

impl<'conn> SqliteScheduleRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    ///
    /// # Errors
    /// - `Db(ScheduleModeMismatch)` when the store was created for another mode.
    pub fn try_new(conn: &'conn mut Connection, mode: ScheduleMode) -> RepoResult<Self> {
        match stored_schedule_mode(conn)? {
            Some(stored) if stored == mode => Ok(Self { conn, mode }),
            Some(stored) => Err(RepoError::Db(DbError::ScheduleModeMismatch {
                stored,
                requested: mode,
            })),
            None => Err(RepoError::Db(DbError::UnknownScheduleMode(String::new()))),
        }
    }

    pub fn mode(&self) -> ScheduleMode {
        self.mode
    }
}

impl ScheduleRepository for SqliteScheduleRepository<'_> {
    fn save_schedule(&mut self, schedule: &DailySchedule) -> RepoResult<DayId> {
        schedule.validate()?;
        if schedule.mode() != self.mode {
            return Err(RepoError::Validation(ScheduleValidationError::ModeMismatch {
                expected: self.mode,
                actual: schedule.mode(),
            }));
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let day_id = SqliteDayRepository::new(&tx).resolve_day_id(schedule.date)?;
        upsert_sleep_window(&tx, day_id, &schedule.sleep_window)?;
        tx.execute("DELETE FROM activities WHERE day_id = ?1;", [day_id.0])?;
        insert_activities(&tx, day_id, &schedule.activities)?;
        tx.commit()?;

        Ok(day_id)
    }

    fn load_schedule(&self, date: NaiveDate) -> RepoResult<DailySchedule> {
        match SqliteDayRepository::new(self.conn).find_day_id(date)? {
            Some(day_id) => load_day(self.conn, self.mode, day_id, date),
            None => Ok(DailySchedule::empty(date, self.mode)),
        }
    }

    fn load_all(&self) -> RepoResult<BTreeMap<NaiveDate, DailySchedule>> {
        let days = SqliteDayRepository::new(self.conn).list_days()?;
        let mut schedules = BTreeMap::new();
        for day in days {
            let schedule = load_day(self.conn, self.mode, day.day_id, day.date)?;
            schedules.insert(day.date, schedule);
        }
        Ok(schedules)
    }
}

fn upsert_sleep_window(tx: &Transaction<'_>, day_id: DayId, window: &SleepWindow) -> RepoResult<()> {
    tx.execute(
        "INSERT INTO sleep_windows (day_id, start_time, end_time)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(day_id) DO UPDATE SET
            start_time = excluded.start_time,
            end_time = excluded.end_time;",
        params![day_id.0, window.start.to_string(), window.end.to_string()],
    )?;
    Ok(())
}

fn insert_activities(
    tx: &Transaction<'_>,
    day_id: DayId,
    activities: &DayActivities,
) -> RepoResult<()> {
    match activities {
        DayActivities::Slots(slots) => {
            let mut stmt = tx.prepare(
                "INSERT INTO activities (day_id, hour, activity) VALUES (?1, ?2, ?3);",
            )?;
            for slot in slots.iter().filter(|slot| slot.is_set()) {
                stmt.execute(params![day_id.0, slot.hour, slot.activity.as_str()])?;
            }
        }
        DayActivities::Intervals(entries) => {
            let mut stmt = tx.prepare(
                "INSERT INTO activities (day_id, start_time, end_time, activity, category)
                 VALUES (?1, ?2, ?3, ?4, ?5);",
            )?;
            for entry in entries {
                stmt.execute(params![
                    day_id.0,
                    entry.start_time.to_string(),
                    entry.end_time.to_string(),
                    entry.activity.as_str(),
                    entry.category.as_str(),
                ])?;
            }
        }
    }
    Ok(())
}

fn load_day(
    conn: &Connection,
    mode: ScheduleMode,
    day_id: DayId,
    date: NaiveDate,
) -> RepoResult<DailySchedule> {
    let mut schedule = DailySchedule::empty(date, mode);
    if let Some(window) = load_sleep_window(conn, day_id)? {
        schedule.sleep_window = window;
    }
    schedule.activities = match mode {
        ScheduleMode::Slots => DayActivities::Slots(load_slots(conn, day_id)?),
        ScheduleMode::Intervals => DayActivities::Intervals(load_intervals(conn, day_id)?),
    };
    Ok(schedule)
}

fn load_sleep_window(conn: &Connection, day_id: DayId) -> RepoResult<Option<SleepWindow>> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT start_time, end_time FROM sleep_windows WHERE day_id = ?1;",
            [day_id.0],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match row {
        Some((start, end)) => Ok(Some(SleepWindow::new(
            parse_time_column(&start, "sleep_windows.start_time")?,
            parse_time_column(&end, "sleep_windows.end_time")?,
        ))),
        None => Ok(None),
    }
}

fn load_slots(conn: &Connection, day_id: DayId) -> RepoResult<Vec<HourSlot>> {
    let mut slots = empty_slots();

    let mut stmt = conn.prepare(
        "SELECT hour, activity FROM activities WHERE day_id = ?1 ORDER BY hour ASC;",
    )?;
    let mut rows = stmt.query([day_id.0])?;
    while let Some(row) = rows.next()? {
        let hour: i64 = row.get("hour")?;
        let slot = usize::try_from(hour)
            .ok()
            .and_then(|index| slots.get_mut(index))
            .ok_or_else(|| {
                RepoError::InvalidData(format!("invalid hour value `{hour}` in activities.hour"))
            })?;
        slot.activity = row.get("activity")?;
    }
    Ok(slots)
}

fn load_intervals(conn: &Connection, day_id: DayId) -> RepoResult<Vec<IntervalEntry>> {
    let mut stmt = conn.prepare(
        "SELECT start_time, end_time, activity, category
         FROM activities
         WHERE day_id = ?1
         ORDER BY activity_id ASC;",
    )?;
    let mut rows = stmt.query([day_id.0])?;
    let mut entries = Vec::new();
    while let Some(row) = rows.next()? {
        let start: String = row.get("start_time")?;
        let end: String = row.get("end_time")?;
        entries.push(IntervalEntry {
            start_time: parse_time_column(&start, "activities.start_time")?,
            end_time: parse_time_column(&end, "activities.end_time")?,
            activity: row.get("activity")?,
            category: row.get("category")?,
        });
    }
    Ok(entries)
}

fn parse_time_column(value: &str, column: &str) -> RepoResult<TimeOfDay> {
    value
        .parse()
        .map_err(|_| RepoError::InvalidData(format!("invalid time value `{value}` in {column}")))
}
