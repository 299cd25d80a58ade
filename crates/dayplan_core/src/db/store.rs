//! Process-scoped handle over the single schedule connection.
//!
//! # Responsibility
//! - Own the bootstrapped connection and share it with services.
//! - Serialize access so each transaction runs on one thread at a time.
//!
//! # Invariants
//! - A handle only exists for a connection whose schema is ensured.
//! - The connection closes when the last clone is dropped or `close` runs.

use super::{open_db, open_db_in_memory, DbError, DbResult};
use crate::model::schedule::ScheduleMode;
use log::{info, warn};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Cloneable handle to the shared store connection.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    conn: Arc<Mutex<Connection>>,
    mode: ScheduleMode,
}

impl StoreHandle {
    /// Opens (and migrates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>, mode: ScheduleMode) -> DbResult<Self> {
        let conn = open_db(path, mode)?;
        Ok(Self::wrap(conn, mode))
    }

    /// Opens a private in-memory store, mainly for tests.
    pub fn open_in_memory(mode: ScheduleMode) -> DbResult<Self> {
        let conn = open_db_in_memory(mode)?;
        Ok(Self::wrap(conn, mode))
    }

    fn wrap(conn: Connection, mode: ScheduleMode) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            mode,
        }
    }

    /// Activity representation this store was created for.
    pub fn mode(&self) -> ScheduleMode {
        self.mode
    }

    /// Locks the shared connection for one unit of work.
    pub fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    /// Closes the connection if this is the last handle.
    ///
    /// Returns `Ok(false)` when other clones still hold the connection; it
    /// then closes when the last of them is dropped.
    pub fn close(self) -> DbResult<bool> {
        match Arc::try_unwrap(self.conn) {
            Ok(mutex) => {
                let conn = mutex.into_inner().map_err(|_| DbError::Poisoned)?;
                conn.close().map_err(|(_, err)| DbError::Sqlite(err))?;
                info!("event=db_close module=db status=ok");
                Ok(true)
            }
            Err(_) => {
                warn!("event=db_close module=db status=deferred reason=shared_handles");
                Ok(false)
            }
        }
    }
}
