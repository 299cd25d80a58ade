//! Core persistence engine for the day planner.
//! This crate is the single source of truth for schedule storage invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use db::{DbError, DbResult, StoreHandle};
pub use logging::{default_log_level, init_logging, logging_status, LogLevel, LoggingError};
pub use model::schedule::{
    DailySchedule, DayActivities, DayId, HourSlot, IntervalEntry, ScheduleMode,
    ScheduleValidationError, SleepWindow, TimeOfDay, DEFAULT_SLEEP_END, DEFAULT_SLEEP_START,
    HOURS_PER_DAY,
};
pub use repo::day_repo::{DayRecord, DayRepository, SqliteDayRepository};
pub use repo::schedule_repo::{ScheduleRepository, SqliteScheduleRepository};
pub use repo::{RepoError, RepoResult};
pub use service::save_coalescer::{
    CoalescedSaveFailure, CoalescerConfig, CoalescerError, SaveCoalescer, ScheduleSink,
    DEFAULT_QUIESCENCE,
};
pub use service::schedule_service::{
    EngineError, EngineErrorKind, EngineResult, ScheduleService,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
