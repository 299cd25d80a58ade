//! SQLite migration registry and executor.
//!
//! # Responsibility
//! - Register schema migrations in strictly increasing order.
//! - Apply pending migrations atomically.
//! - Pin the store to one `ScheduleMode` and reject the other.
//!
//! # Invariants
//! - `version` values must remain monotonic.
//! - Applied migration version is mirrored to `PRAGMA user_version`.
//! - `engine_meta.schedule_mode` is written once and never changed.

use crate::db::{DbError, DbResult};
use crate::model::schedule::ScheduleMode;
use rusqlite::{Connection, OptionalExtension};

const SCHEDULE_MODE_KEY: &str = "schedule_mode";

#[derive(Debug, Clone, Copy)]
enum MigrationSql {
    Shared(&'static str),
    PerMode {
        slots: &'static str,
        intervals: &'static str,
    },
}

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    sql: MigrationSql,
}

impl Migration {
    fn sql_for(&self, mode: ScheduleMode) -> &'static str {
        match self.sql {
            MigrationSql::Shared(sql) => sql,
            MigrationSql::PerMode { slots, intervals } => match mode {
                ScheduleMode::Slots => slots,
                ScheduleMode::Intervals => intervals,
            },
        }
    }
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: MigrationSql::Shared(include_str!("0001_init.sql")),
    },
    Migration {
        version: 2,
        sql: MigrationSql::PerMode {
            slots: include_str!("0002_slot_activities.sql"),
            intervals: include_str!("0002_interval_activities.sql"),
        },
    },
];

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Ensures the day/sleep/activity schema exists for `mode`.
///
/// Safe to call on every process start; a fully migrated store with the
/// same mode is left untouched.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the file was written by a newer build.
/// - `ScheduleModeMismatch` when the store was created for the other mode.
/// - `Sqlite` for any statement failure; nothing is partially applied.
pub fn ensure_schema(conn: &mut Connection, mode: ScheduleMode) -> DbResult<()> {
    let current_version = current_user_version(conn)?;
    let latest = latest_version();

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    if current_version < latest {
        let tx = conn.transaction()?;
        for migration in MIGRATIONS {
            if migration.version <= current_version {
                continue;
            }

            tx.execute_batch(migration.sql_for(mode))?;
            tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
        }
        tx.execute(
            "INSERT OR IGNORE INTO engine_meta (key, value) VALUES (?1, ?2);",
            [SCHEDULE_MODE_KEY, mode.as_str()],
        )?;
        check_schedule_mode(&tx, mode)?;
        tx.commit()?;
        return Ok(());
    }

    check_schedule_mode(conn, mode)
}

/// Reads the mode a migrated store was created for.
pub fn stored_schedule_mode(conn: &Connection) -> DbResult<Option<ScheduleMode>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM engine_meta WHERE key = ?1;",
            [SCHEDULE_MODE_KEY],
            |row| row.get(0),
        )
        .optional()?;

    match value {
        Some(text) => ScheduleMode::parse(&text)
            .map(Some)
            .ok_or(DbError::UnknownScheduleMode(text)),
        None => Ok(None),
    }
}

fn check_schedule_mode(conn: &Connection, requested: ScheduleMode) -> DbResult<()> {
    match stored_schedule_mode(conn)? {
        Some(stored) if stored != requested => {
            Err(DbError::ScheduleModeMismatch { stored, requested })
        }
        Some(_) => Ok(()),
        None => Err(DbError::UnknownScheduleMode(String::new())),
    }
}

fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
