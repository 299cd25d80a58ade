//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose schedule persistence to Dart via FRB as plain envelopes.
//! - Own the process-scoped engine (store + save coalescer).
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - The engine is opened once; later `schedule_init` calls must match it.
//! - Coalesced save failures are queued until the UI drains them.

use dayplan_core::model::schedule::{format_date, parse_date};
use dayplan_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    CoalescedSaveFailure, CoalescerConfig, DailySchedule, DayActivities, EngineError,
    HourSlot, IntervalEntry, SaveCoalescer, ScheduleMode, ScheduleService, SleepWindow,
    HOURS_PER_DAY,
};
use log::warn;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

const ENGINE_DB_FILE_NAME: &str = "dayplan.sqlite3";
const ENGINE_DB_PATH_ENV: &str = "DAYPLAN_DB_PATH";
const MAX_QUEUED_FAILURES: usize = 64;

static ENGINE: OnceLock<EngineRuntime> = OnceLock::new();

struct EngineRuntime {
    db_path: PathBuf,
    service: ScheduleService,
    coalescer: SaveCoalescer,
    failures: Arc<Mutex<VecDeque<CoalescedFailureDto>>>,
}

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir`.
/// - Returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// One interval-form entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalEntryDto {
    /// `HH:MM`.
    pub start_time: String,
    /// `HH:MM`.
    pub end_time: String,
    pub activity: String,
    /// Icon catalog id.
    pub category: String,
}

/// One calendar day as exchanged with Dart.
///
/// Slot stores use `slots` (24 labels, empty = unset) and ignore
/// `intervals`; interval stores do the opposite. Label, activity and
/// category text is stored exactly as sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyScheduleDto {
    /// `YYYY-MM-DD`.
    pub date: String,
    pub sleep_start: String,
    pub sleep_end: String,
    pub slots: Vec<String>,
    pub intervals: Vec<IntervalEntryDto>,
}

/// Background save that failed after `schedule_queue_save` returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoalescedFailureDto {
    /// `YYYY-MM-DD`.
    pub date: String,
    /// Engine error kind, e.g. `save_failed`.
    pub error_kind: String,
    pub message: String,
}

/// Envelope for commands without payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleActionResponse {
    pub ok: bool,
    /// Engine error kind (`save_failed`, ...) when `ok == false`.
    pub error_kind: Option<String>,
    pub message: String,
}

/// Envelope for single-day reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleResponse {
    pub ok: bool,
    pub error_kind: Option<String>,
    pub message: String,
    pub schedule: Option<DailyScheduleDto>,
}

/// Envelope for all-days reads, ordered by date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleListResponse {
    pub ok: bool,
    pub error_kind: Option<String>,
    pub message: String,
    pub items: Vec<DailyScheduleDto>,
}

impl ScheduleActionResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            error_kind: None,
            message: message.into(),
        }
    }

    fn failure(error_kind: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error_kind: error_kind.map(str::to_string),
            message: message.into(),
        }
    }
}

/// Opens the schedule store once per process.
///
/// Input semantics:
/// - `db_path`: database file; falls back to `DAYPLAN_DB_PATH`, then to
///   the temp directory.
/// - `mode`: `slots` or `intervals`.
///
/// # FFI contract
/// - Idempotent for the same path and mode.
/// - A different path or mode after init is rejected.
#[flutter_rust_bridge::frb(sync)]
pub fn schedule_init(db_path: Option<String>, mode: String) -> ScheduleActionResponse {
    let Some(mode) = ScheduleMode::parse(&mode) else {
        return ScheduleActionResponse::failure(
            None,
            format!("unsupported schedule mode `{mode}`; expected slots|intervals"),
        );
    };
    let db_path = resolve_db_path(db_path);

    if let Some(runtime) = ENGINE.get() {
        return check_same_runtime(runtime, &db_path, mode);
    }

    let service = match ScheduleService::open(&db_path, mode) {
        Ok(service) => service,
        Err(err) => return engine_failure(&err),
    };
    let failures = Arc::new(Mutex::new(VecDeque::new()));
    let coalescer = match SaveCoalescer::spawn(
        service.clone(),
        CoalescerConfig::default(),
        failure_collector(Arc::clone(&failures)),
    ) {
        Ok(coalescer) => coalescer,
        Err(err) => return ScheduleActionResponse::failure(None, err.to_string()),
    };

    let runtime = EngineRuntime {
        db_path: db_path.clone(),
        service,
        coalescer,
        failures,
    };
    match ENGINE.set(runtime) {
        Ok(()) => ScheduleActionResponse::success("Schedule store ready."),
        // Lost an init race; the winner's settings decide.
        Err(_) => match ENGINE.get() {
            Some(runtime) => check_same_runtime(runtime, &db_path, mode),
            None => ScheduleActionResponse::failure(None, "schedule store init failed"),
        },
    }
}

/// Loads one day; days never saved come back with defaults.
#[flutter_rust_bridge::frb(sync)]
pub fn schedule_load(date: String) -> ScheduleResponse {
    let outcome = with_runtime(|runtime| {
        let date = parse_date(&date).map_err(|err| (None, err.to_string()))?;
        runtime
            .service
            .load(date)
            .map_err(|err| engine_error_parts(&err))
    });

    schedule_response(outcome)
}

/// Selects a date in the UI: creates its day row if absent and returns
/// the day's schedule.
#[flutter_rust_bridge::frb(sync)]
pub fn schedule_select_day(date: String) -> ScheduleResponse {
    let outcome = with_runtime(|runtime| {
        let date = parse_date(&date).map_err(|err| (None, err.to_string()))?;
        runtime
            .service
            .resolve_day_id(date)
            .and_then(|_| runtime.service.load(date))
            .map_err(|err| engine_error_parts(&err))
    });
    schedule_response(outcome)
}

/// Loads every persisted day.
#[flutter_rust_bridge::frb(sync)]
pub fn schedule_load_all() -> ScheduleListResponse {
    let outcome = with_runtime(|runtime| {
        runtime
            .service
            .load_all()
            .map_err(|err| engine_error_parts(&err))
    });

    match outcome {
        Ok(schedules) => {
            let items = schedules.values().map(to_dto).collect::<Vec<_>>();
            ScheduleListResponse {
                ok: true,
                error_kind: None,
                message: format!("Loaded {} day(s).", items.len()),
                items,
            }
        }
        Err((error_kind, message)) => ScheduleListResponse {
            ok: false,
            error_kind,
            message,
            items: Vec::new(),
        },
    }
}

/// Saves one day immediately, bypassing the coalescer.
#[flutter_rust_bridge::frb(sync)]
pub fn schedule_save(schedule: DailyScheduleDto) -> ScheduleActionResponse {
    let outcome = with_runtime(|runtime| {
        let schedule = from_dto(&schedule, runtime.service.mode()).map_err(|err| (None, err))?;
        runtime
            .service
            .save(&schedule)
            .map_err(|err| engine_error_parts(&err))
    });

    match outcome {
        Ok(_) => ScheduleActionResponse::success("Schedule saved."),
        Err((error_kind, message)) => {
            ScheduleActionResponse::failure(error_kind.as_deref(), message)
        }
    }
}

/// Queues one day for a coalesced save.
///
/// # FFI contract
/// - Returns once queued; the write happens after the quiescence window.
/// - Write failures are drained with `schedule_take_failures`.
#[flutter_rust_bridge::frb(sync)]
pub fn schedule_queue_save(schedule: DailyScheduleDto) -> ScheduleActionResponse {
    let outcome = with_runtime(|runtime| {
        let schedule = from_dto(&schedule, runtime.service.mode()).map_err(|err| (None, err))?;
        runtime
            .coalescer
            .schedule(schedule)
            .map_err(|err| (None, err.to_string()))
    });

    match outcome {
        Ok(()) => ScheduleActionResponse::success("Schedule queued."),
        Err((error_kind, message)) => {
            ScheduleActionResponse::failure(error_kind.as_deref(), message)
        }
    }
}

/// Writes every queued day now; call before the app is backgrounded.
#[flutter_rust_bridge::frb(sync)]
pub fn schedule_flush() -> ScheduleActionResponse {
    match with_runtime(|runtime| runtime.coalescer.flush().map_err(|err| (None, err.to_string())))
    {
        Ok(()) => ScheduleActionResponse::success("Pending schedules flushed."),
        Err((error_kind, message)) => {
            ScheduleActionResponse::failure(error_kind.as_deref(), message)
        }
    }
}

/// Drains coalesced save failures reported since the last call.
#[flutter_rust_bridge::frb(sync)]
pub fn schedule_take_failures() -> Vec<CoalescedFailureDto> {
    match ENGINE.get() {
        Some(runtime) => match runtime.failures.lock() {
            Ok(mut queued) => queued.drain(..).collect(),
            Err(_) => Vec::new(),
        },
        None => Vec::new(),
    }
}

type FfiError = (Option<String>, String);

fn schedule_response(outcome: Result<DailySchedule, FfiError>) -> ScheduleResponse {
    match outcome {
        Ok(schedule) => ScheduleResponse {
            ok: true,
            error_kind: None,
            message: String::new(),
            schedule: Some(to_dto(&schedule)),
        },
        Err((error_kind, message)) => ScheduleResponse {
            ok: false,
            error_kind,
            message,
            schedule: None,
        },
    }
}

fn with_runtime<T>(
    f: impl FnOnce(&EngineRuntime) -> Result<T, FfiError>,
) -> Result<T, FfiError> {
    match ENGINE.get() {
        Some(runtime) => f(runtime),
        None => Err((
            None,
            "schedule store is not initialized; call schedule_init first".to_string(),
        )),
    }
}

fn check_same_runtime(
    runtime: &EngineRuntime,
    db_path: &Path,
    mode: ScheduleMode,
) -> ScheduleActionResponse {
    if runtime.db_path != db_path || runtime.service.mode() != mode {
        warn!(
            "event=schedule_init module=ffi status=rejected reason=already_initialized mode={}",
            runtime.service.mode()
        );
        return ScheduleActionResponse::failure(
            None,
            format!(
                "schedule store already initialized at `{}` for {}",
                runtime.db_path.display(),
                runtime.service.mode()
            ),
        );
    }
    ScheduleActionResponse::success("Schedule store ready.")
}

fn failure_collector(
    failures: Arc<Mutex<VecDeque<CoalescedFailureDto>>>,
) -> impl FnMut(CoalescedSaveFailure) + Send + 'static {
    move |failure| {
        if let Ok(mut queued) = failures.lock() {
            if queued.len() >= MAX_QUEUED_FAILURES {
                queued.pop_front();
            }
            queued.push_back(CoalescedFailureDto {
                date: format_date(failure.date),
                error_kind: failure.error.kind().as_str().to_string(),
                message: failure.error.to_string(),
            });
        }
    }
}

fn resolve_db_path(db_path: Option<String>) -> PathBuf {
    let explicit = db_path
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty());
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }
    if let Ok(raw) = std::env::var(ENGINE_DB_PATH_ENV) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    std::env::temp_dir().join(ENGINE_DB_FILE_NAME)
}

fn engine_failure(err: &EngineError) -> ScheduleActionResponse {
    let (error_kind, message) = engine_error_parts(err);
    ScheduleActionResponse::failure(error_kind.as_deref(), message)
}

fn engine_error_parts(err: &EngineError) -> FfiError {
    (Some(err.kind().as_str().to_string()), err.to_string())
}

fn to_dto(schedule: &DailySchedule) -> DailyScheduleDto {
    let (slots, intervals) = match &schedule.activities {
        DayActivities::Slots(slots) => (
            slots.iter().map(|slot| slot.activity.clone()).collect(),
            Vec::new(),
        ),
        DayActivities::Intervals(entries) => (
            Vec::new(),
            entries
                .iter()
                .map(|entry| IntervalEntryDto {
                    start_time: entry.start_time.to_string(),
                    end_time: entry.end_time.to_string(),
                    activity: entry.activity.clone(),
                    category: entry.category.clone(),
                })
                .collect(),
        ),
    };

    DailyScheduleDto {
        date: format_date(schedule.date),
        sleep_start: schedule.sleep_window.start.to_string(),
        sleep_end: schedule.sleep_window.end.to_string(),
        slots,
        intervals,
    }
}

fn from_dto(dto: &DailyScheduleDto, mode: ScheduleMode) -> Result<DailySchedule, String> {
    let date = parse_date(&dto.date).map_err(|err| err.to_string())?;
    let start = dto.sleep_start.parse().map_err(|err| format!("sleep_start: {err}"))?;
    let end = dto.sleep_end.parse().map_err(|err| format!("sleep_end: {err}"))?;

    let activities = match mode {
        ScheduleMode::Slots => {
            if dto.slots.len() != HOURS_PER_DAY {
                return Err(format!(
                    "slots must contain {HOURS_PER_DAY} labels, got {}",
                    dto.slots.len()
                ));
            }
            DayActivities::Slots(
                dto.slots
                    .iter()
                    .zip(0u8..)
                    .map(|(label, hour)| HourSlot {
                        hour,
                        activity: label.clone(),
                    })
                    .collect(),
            )
        }
        ScheduleMode::Intervals => {
            let mut entries = Vec::with_capacity(dto.intervals.len());
            for (index, entry) in dto.intervals.iter().enumerate() {
                entries.push(IntervalEntry {
                    start_time: entry
                        .start_time
                        .parse()
                        .map_err(|err| format!("intervals[{index}].start_time: {err}"))?,
                    end_time: entry
                        .end_time
                        .parse()
                        .map_err(|err| format!("intervals[{index}].end_time: {err}"))?,
                    activity: entry.activity.clone(),
                    category: entry.category.clone(),
                });
            }
            DayActivities::Intervals(entries)
        }
    };

    Ok(DailySchedule {
        date,
        sleep_window: SleepWindow::new(start, end),
        activities,
    })
}

#[cfg(test)]
mod tests {
    use super::{
        core_version, from_dto, init_logging, ping, schedule_flush, schedule_init,
        schedule_load, schedule_load_all, schedule_queue_save, schedule_save,
        schedule_select_day, schedule_take_failures, to_dto, DailyScheduleDto,
        IntervalEntryDto,
    };
    use chrono::{Duration, NaiveDate};
    use dayplan_core::model::schedule::format_date;
    use dayplan_core::{DailySchedule, ScheduleMode};
    use std::sync::atomic::{AtomicI64, Ordering};

    // Process-wide engine shared by every test; nothing is left on disk.
    const TEST_DB_PATH: &str = ":memory:";

    fn init_test_engine() {
        let response = schedule_init(Some(TEST_DB_PATH.to_string()), "intervals".to_string());
        assert!(response.ok, "{}", response.message);
    }

    fn unique_day() -> String {
        static NEXT_DAY: AtomicI64 = AtomicI64::new(0);
        let offset = NEXT_DAY.fetch_add(1, Ordering::Relaxed);
        let base = NaiveDate::from_ymd_opt(2031, 1, 1).expect("valid base date");
        format_date(base + Duration::days(offset))
    }

    fn dto(date: &str, activity: &str) -> DailyScheduleDto {
        DailyScheduleDto {
            date: date.to_string(),
            sleep_start: "23:00".to_string(),
            sleep_end: "7:00".to_string(),
            slots: Vec::new(),
            intervals: vec![IntervalEntryDto {
                start_time: "09:00".to_string(),
                end_time: "10:30".to_string(),
                activity: activity.to_string(),
                category: "work".to_string(),
            }],
        }
    }

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_unsupported_level() {
        let error = init_logging("verbose".to_string(), "/tmp/dayplan-logs".to_string());
        assert!(!error.is_empty());
    }

    #[test]
    fn schedule_init_rejects_unknown_mode() {
        let response = schedule_init(None, "hourly".to_string());
        assert!(!response.ok);
        assert!(response.message.contains("slots|intervals"));
    }

    #[test]
    fn schedule_init_is_idempotent_and_rejects_other_mode() {
        init_test_engine();
        init_test_engine();

        let conflicting = schedule_init(Some(TEST_DB_PATH.to_string()), "slots".to_string());
        assert!(!conflicting.ok);
    }

    #[test]
    fn save_then_load_round_trips_through_envelopes() {
        init_test_engine();
        let day = unique_day();

        let saved = schedule_save(dto(&day, "Design review"));
        assert!(saved.ok, "{}", saved.message);

        let loaded = schedule_load(day.clone());
        assert!(loaded.ok, "{}", loaded.message);
        let schedule = loaded.schedule.expect("schedule payload");
        assert_eq!(schedule.sleep_end, "07:00");
        assert_eq!(schedule.intervals[0].activity, "Design review");

        let all = schedule_load_all();
        assert!(all.ok);
        assert!(all.items.iter().any(|item| item.date == day));
    }

    #[test]
    fn queued_save_is_written_on_flush() {
        init_test_engine();
        let day = unique_day();

        assert!(schedule_queue_save(dto(&day, "Draft")).ok);
        assert!(schedule_queue_save(dto(&day, "Final")).ok);
        assert!(schedule_flush().ok);

        let loaded = schedule_load(day).schedule.expect("schedule payload");
        assert_eq!(loaded.intervals.len(), 1);
        assert_eq!(loaded.intervals[0].activity, "Final");
    }

    // Only this test drains the failure queue.
    #[test]
    fn failed_queued_save_is_reported_with_error_kind() {
        init_test_engine();
        let day = unique_day();
        let mut invalid = dto(&day, "No category");
        invalid.intervals[0].category = String::new();

        assert!(schedule_queue_save(invalid).ok);
        assert!(schedule_flush().ok);

        let failures = schedule_take_failures();
        let failure = failures
            .iter()
            .find(|failure| failure.date == day)
            .expect("failure for queued day");
        assert_eq!(failure.error_kind, "save_failed");
        assert!(failure.message.contains("category"));
        assert!(schedule_take_failures()
            .iter()
            .all(|failure| failure.date != day));
    }

    #[test]
    fn select_day_creates_row_with_defaults() {
        init_test_engine();
        let day = unique_day();

        let selected = schedule_select_day(day.clone());
        assert!(selected.ok, "{}", selected.message);
        let schedule = selected.schedule.expect("schedule payload");
        assert_eq!(schedule.sleep_start, "22:00");
        assert!(schedule.intervals.is_empty());

        let all = schedule_load_all();
        assert!(all.items.iter().any(|item| item.date == day));
    }

    #[test]
    fn activity_text_is_stored_as_sent() {
        init_test_engine();
        let day = unique_day();

        assert!(schedule_save(dto(&day, " Read ")).ok);

        let loaded = schedule_load(day).schedule.expect("schedule payload");
        assert_eq!(loaded.intervals[0].activity, " Read ");
    }

    #[test]
    fn save_reports_validation_failure_kind() {
        init_test_engine();
        let mut invalid = dto(&unique_day(), "Missing category");
        invalid.intervals[0].category = String::new();

        let response = schedule_save(invalid);
        assert!(!response.ok);
        assert_eq!(response.error_kind.as_deref(), Some("save_failed"));
    }

    #[test]
    fn load_rejects_malformed_date() {
        init_test_engine();
        let response = schedule_load("06/01/2031".to_string());
        assert!(!response.ok);
        assert!(response.error_kind.is_none());
    }

    #[test]
    fn slot_dto_requires_all_hours() {
        let mut slots = dto("2031-02-03", "x");
        slots.intervals.clear();
        slots.slots = vec![String::new(); 23];
        assert!(from_dto(&slots, ScheduleMode::Slots).is_err());

        slots.slots.push("Work".to_string());
        let schedule = from_dto(&slots, ScheduleMode::Slots).expect("24 slots convert");
        assert_eq!(schedule.activities.persisted_len(), 1);
        assert_eq!(to_dto(&schedule).slots[23], "Work");
    }

    #[test]
    fn default_schedule_converts_to_24_empty_slots() {
        let date = dayplan_core::model::schedule::parse_date("2031-03-04").expect("date");
        let dto = to_dto(&DailySchedule::empty(date, ScheduleMode::Slots));
        assert_eq!(dto.slots.len(), 24);
        assert_eq!(dto.sleep_start, "22:00");
        assert!(dto.intervals.is_empty());
    }
}
