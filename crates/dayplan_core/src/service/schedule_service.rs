//! Schedule use-case service.
//!
//! # Responsibility
//! - Expose the engine operations (`resolve_day_id`, `save`, `load`,
//!   `load_all`) over the shared store handle.
//! - Wrap store failures into the engine's component-level error kinds.
//!
//! # Invariants
//! - Every store failure is returned to the caller; none is swallowed.
//! - Each call confines its transaction to one day.
//! - Logs carry dates, ids, and counts only, never activity text.

use crate::db::{DbError, StoreHandle};
use crate::model::schedule::{DailySchedule, DayId, ScheduleMode};
use crate::repo::day_repo::{DayRepository, SqliteDayRepository};
use crate::repo::schedule_repo::{ScheduleRepository, SqliteScheduleRepository};
use crate::repo::RepoError;
use chrono::NaiveDate;
use log::{error, info};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Instant;

pub type EngineResult<T> = Result<T, EngineError>;

/// Stable label of an engine failure, used by FFI envelopes and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    SchemaInitFailed,
    DayResolutionFailed,
    SaveFailed,
    LoadFailed,
}

impl EngineErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SchemaInitFailed => "schema_init_failed",
            Self::DayResolutionFailed => "day_resolution_failed",
            Self::SaveFailed => "save_failed",
            Self::LoadFailed => "load_failed",
        }
    }
}

/// Engine failure at a component boundary.
#[derive(Debug)]
pub enum EngineError {
    /// Schema could not be ensured; the engine is unusable.
    SchemaInitFailed(DbError),
    /// The day row could not be resolved or created.
    DayResolutionFailed { date: NaiveDate, source: RepoError },
    /// The save transaction was rolled back.
    SaveFailed { date: NaiveDate, source: RepoError },
    /// Reading failed; the schedule is unknown, not empty.
    LoadFailed {
        date: Option<NaiveDate>,
        source: RepoError,
    },
}

impl EngineError {
    pub fn kind(&self) -> EngineErrorKind {
        match self {
            Self::SchemaInitFailed(_) => EngineErrorKind::SchemaInitFailed,
            Self::DayResolutionFailed { .. } => EngineErrorKind::DayResolutionFailed,
            Self::SaveFailed { .. } => EngineErrorKind::SaveFailed,
            Self::LoadFailed { .. } => EngineErrorKind::LoadFailed,
        }
    }

    /// Whether repeating the same call may succeed.
    ///
    /// Shape errors and schema failures will not heal on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SchemaInitFailed(_) => false,
            Self::DayResolutionFailed { source, .. }
            | Self::SaveFailed { source, .. }
            | Self::LoadFailed { source, .. } => matches!(source, RepoError::Db(_)),
        }
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SchemaInitFailed(err) => write!(f, "schema initialization failed: {err}"),
            Self::DayResolutionFailed { date, source } => {
                write!(f, "failed to resolve day {date}: {source}")
            }
            Self::SaveFailed { date, source } => {
                write!(f, "failed to save schedule for {date}: {source}")
            }
            Self::LoadFailed {
                date: Some(date),
                source,
            } => write!(f, "failed to load schedule for {date}: {source}"),
            Self::LoadFailed { date: None, source } => {
                write!(f, "failed to load schedules: {source}")
            }
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::SchemaInitFailed(err) => Some(err),
            Self::DayResolutionFailed { source, .. }
            | Self::SaveFailed { source, .. }
            | Self::LoadFailed { source, .. } => Some(source),
        }
    }
}

/// Engine facade over one shared store.
///
/// Cheap to clone; clones share the same connection.
#[derive(Debug, Clone)]
pub struct ScheduleService {
    store: StoreHandle,
}

impl ScheduleService {
    /// Uses an already bootstrapped store.
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Opens the store file and ensures its schema.
    ///
    /// # Errors
    /// - `SchemaInitFailed` for any open, migration, or mode failure.
    pub fn open(path: impl AsRef<Path>, mode: ScheduleMode) -> EngineResult<Self> {
        StoreHandle::open(path, mode)
            .map(Self::new)
            .map_err(EngineError::SchemaInitFailed)
    }

    /// Opens a private in-memory store.
    pub fn open_in_memory(mode: ScheduleMode) -> EngineResult<Self> {
        StoreHandle::open_in_memory(mode)
            .map(Self::new)
            .map_err(EngineError::SchemaInitFailed)
    }

    pub fn mode(&self) -> ScheduleMode {
        self.store.mode()
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// Resolves `date` to its stable id, creating the day row if absent.
    pub fn resolve_day_id(&self, date: NaiveDate) -> EngineResult<DayId> {
        let into_error = |source: RepoError| EngineError::DayResolutionFailed { date, source };
        let conn = self.store.lock().map_err(|err| into_error(err.into()))?;
        let day_id = SqliteDayRepository::new(&conn)
            .resolve_day_id(date)
            .map_err(into_error)?;
        info!(
            "event=day_resolve module=service status=ok date={} day_id={}",
            date, day_id
        );
        Ok(day_id)
    }

    /// Replaces the persisted snapshot of `schedule.date` atomically.
    ///
    /// Safe to retry with the same or a newer snapshot after a failure.
    pub fn save(&self, schedule: &DailySchedule) -> EngineResult<DayId> {
        let started_at = Instant::now();
        let date = schedule.date;
        let result = self.with_repo(|repo| repo.save_schedule(schedule));

        match result {
            Ok(day_id) => {
                info!(
                    "event=schedule_save module=service status=ok date={} day_id={} rows={} duration_ms={}",
                    date,
                    day_id,
                    schedule.activities.persisted_len(),
                    started_at.elapsed().as_millis()
                );
                Ok(day_id)
            }
            Err(source) => {
                error!(
                    "event=schedule_save module=service status=error date={} duration_ms={} error_code=save_failed error={}",
                    date,
                    started_at.elapsed().as_millis(),
                    source
                );
                Err(EngineError::SaveFailed { date, source })
            }
        }
    }

    /// Loads one day; a date never saved yields the default schedule.
    pub fn load(&self, date: NaiveDate) -> EngineResult<DailySchedule> {
        self.with_repo(|repo| repo.load_schedule(date))
            .map_err(|source| {
                error!(
                    "event=schedule_load module=service status=error date={} error_code=load_failed error={}",
                    date, source
                );
                EngineError::LoadFailed {
                    date: Some(date),
                    source,
                }
            })
    }

    /// Loads every persisted day keyed by date.
    pub fn load_all(&self) -> EngineResult<BTreeMap<NaiveDate, DailySchedule>> {
        let started_at = Instant::now();
        let schedules = self
            .with_repo(|repo| repo.load_all())
            .map_err(|source| {
                error!(
                    "event=schedule_load_all module=service status=error error_code=load_failed error={}",
                    source
                );
                EngineError::LoadFailed { date: None, source }
            })?;
        info!(
            "event=schedule_load_all module=service status=ok days={} duration_ms={}",
            schedules.len(),
            started_at.elapsed().as_millis()
        );
        Ok(schedules)
    }

    fn with_repo<T>(
        &self,
        f: impl FnOnce(&mut SqliteScheduleRepository<'_>) -> Result<T, RepoError>,
    ) -> Result<T, RepoError> {
        let mut conn = self.store.lock()?;
        let mut repo = SqliteScheduleRepository::try_new(&mut conn, self.store.mode())?;
        f(&mut repo)
    }
}
