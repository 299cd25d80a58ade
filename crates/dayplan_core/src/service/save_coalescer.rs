//! Quiescence-based save coalescing.
//!
//! # Responsibility
//! - Absorb rapid successive edits of a day into one persisted snapshot.
//! - Report save failures asynchronously through a caller callback.
//! - Flush pending snapshots on demand and on shutdown.
//!
//! # Invariants
//! - At most one save per date per quiescence window.
//! - The latest snapshot received before expiry is the one saved.
//! - A newer snapshot for a date re-arms that date's deadline.
//! - Saves of one date happen in the order their windows expire.
//! - Snapshots pending when the process is killed are lost.

use crate::model::schedule::DailySchedule;
use crate::service::schedule_service::{EngineError, ScheduleService};
use chrono::NaiveDate;
use log::{debug, error, info};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default delay after the last edit before a save is flushed.
pub const DEFAULT_QUIESCENCE: Duration = Duration::from_secs(1);

const WORKER_THREAD_NAME: &str = "dayplan-save-coalescer";

/// Destination of coalesced saves.
pub trait ScheduleSink {
    fn save(&self, schedule: &DailySchedule) -> Result<(), EngineError>;
}

impl ScheduleSink for ScheduleService {
    fn save(&self, schedule: &DailySchedule) -> Result<(), EngineError> {
        ScheduleService::save(self, schedule).map(|_| ())
    }
}

/// Coalescer tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoalescerConfig {
    pub quiescence: Duration,
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            quiescence: DEFAULT_QUIESCENCE,
        }
    }
}

/// Failure of a save issued after its triggering call returned.
#[derive(Debug)]
pub struct CoalescedSaveFailure {
    pub date: NaiveDate,
    pub error: EngineError,
}

/// Errors of the coalescer itself (not of the saves it issues).
#[derive(Debug)]
pub enum CoalescerError {
    Spawn(std::io::Error),
    /// The worker is gone; nothing more can be queued.
    Closed,
}

impl Display for CoalescerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn(err) => write!(f, "failed to spawn save coalescer thread: {err}"),
            Self::Closed => write!(f, "save coalescer is shut down"),
        }
    }
}

impl Error for CoalescerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Spawn(err) => Some(err),
            Self::Closed => None,
        }
    }
}

enum Command {
    Schedule(DailySchedule),
    Flush(mpsc::Sender<()>),
}

struct PendingSave {
    schedule: DailySchedule,
    deadline: Instant,
    superseded: usize,
}

#[derive(Debug, Clone, Copy)]
enum FlushReason {
    Quiescence,
    Requested,
    Shutdown,
}

impl FlushReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::Quiescence => "quiescence",
            Self::Requested => "requested",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Debounced writer running on one dedicated thread.
pub struct SaveCoalescer {
    sender: Option<mpsc::Sender<Command>>,
    worker: Option<JoinHandle<()>>,
    pending: Arc<AtomicUsize>,
}

impl SaveCoalescer {
    /// Starts the worker thread.
    ///
    /// `on_failure` runs on the worker thread for every failed save.
    pub fn spawn<S, F>(sink: S, config: CoalescerConfig, on_failure: F) -> Result<Self, CoalescerError>
    where
        S: ScheduleSink + Send + 'static,
        F: FnMut(CoalescedSaveFailure) + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker_pending = Arc::clone(&pending);

        let worker = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let mut worker = Worker {
                    sink,
                    on_failure,
                    quiescence: config.quiescence,
                    pending: BTreeMap::new(),
                    pending_depth: worker_pending,
                };
                worker.run(&receiver);
            })
            .map_err(CoalescerError::Spawn)?;

        info!(
            "event=coalescer_start module=coalescer status=ok quiescence_ms={}",
            config.quiescence.as_millis()
        );

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            pending,
        })
    }

    /// Records `schedule` as the latest snapshot of its date and re-arms
    /// that date's timer. Returns before anything is written.
    pub fn schedule(&self, schedule: DailySchedule) -> Result<(), CoalescerError> {
        self.send(Command::Schedule(schedule))
    }

    /// Saves every pending snapshot now and waits until done.
    ///
    /// Failures still go to the failure callback.
    pub fn flush(&self) -> Result<(), CoalescerError> {
        let (ack_tx, ack_rx) = mpsc::channel();
        self.send(Command::Flush(ack_tx))?;
        ack_rx.recv().map_err(|_| CoalescerError::Closed)
    }

    /// Number of dates waiting for their window to expire, as last seen by
    /// the worker. `0` once `flush()` returns, unless other threads keep
    /// scheduling.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Flushes pending snapshots and stops the worker.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn send(&self, command: Command) -> Result<(), CoalescerError> {
        match &self.sender {
            Some(sender) => sender.send(command).map_err(|_| CoalescerError::Closed),
            None => Err(CoalescerError::Closed),
        }
    }

    fn stop(&mut self) {
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("event=coalescer_stop module=coalescer status=error error_code=worker_panicked");
                return;
            }
            info!("event=coalescer_stop module=coalescer status=ok");
        }
    }
}

impl Drop for SaveCoalescer {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker<S, F> {
    sink: S,
    on_failure: F,
    quiescence: Duration,
    pending: BTreeMap<NaiveDate, PendingSave>,
    pending_depth: Arc<AtomicUsize>,
}

impl<S, F> Worker<S, F>
where
    S: ScheduleSink,
    F: FnMut(CoalescedSaveFailure),
{
    fn run(&mut self, receiver: &mpsc::Receiver<Command>) {
        loop {
            let next_deadline = self.pending.values().map(|save| save.deadline).min();
            let received = match next_deadline {
                Some(deadline) => {
                    let timeout = deadline.saturating_duration_since(Instant::now());
                    match receiver.recv_timeout(timeout) {
                        Ok(command) => Some(command),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match receiver.recv() {
                    Ok(command) => Some(command),
                    Err(_) => break,
                },
            };

            match received {
                Some(Command::Schedule(schedule)) => self.record(schedule),
                Some(Command::Flush(ack)) => {
                    self.flush_all(FlushReason::Requested);
                    self.publish_depth();
                    let _ = ack.send(());
                }
                None => {}
            }

            self.flush_due(Instant::now());
            self.publish_depth();
        }

        self.flush_all(FlushReason::Shutdown);
        self.publish_depth();
    }

    // Must run before a flush is acknowledged so `pending()` is current
    // once `flush()` returns.
    fn publish_depth(&self) {
        self.pending_depth
            .store(self.pending.len(), Ordering::Release);
    }

    fn record(&mut self, schedule: DailySchedule) {
        let date = schedule.date;
        let deadline = Instant::now() + self.quiescence;
        let superseded = self
            .pending
            .remove(&date)
            .map_or(0, |previous| previous.superseded + 1);
        debug!(
            "event=coalescer_schedule module=coalescer status=armed date={} superseded={}",
            date, superseded
        );
        self.pending.insert(
            date,
            PendingSave {
                schedule,
                deadline,
                superseded,
            },
        );
    }

    fn flush_due(&mut self, now: Instant) {
        let mut due: Vec<(Instant, NaiveDate)> = self
            .pending
            .iter()
            .filter(|(_, save)| save.deadline <= now)
            .map(|(date, save)| (save.deadline, *date))
            .collect();
        due.sort();

        for (_, date) in due {
            if let Some(save) = self.pending.remove(&date) {
                self.write(save, FlushReason::Quiescence);
            }
        }
    }

    fn flush_all(&mut self, reason: FlushReason) {
        let mut all: Vec<PendingSave> = std::mem::take(&mut self.pending).into_values().collect();
        all.sort_by_key(|save| save.deadline);
        for save in all {
            self.write(save, reason);
        }
    }

    fn write(&mut self, save: PendingSave, reason: FlushReason) {
        let date = save.schedule.date;
        match self.sink.save(&save.schedule) {
            Ok(()) => {
                debug!(
                    "event=coalescer_flush module=coalescer status=ok date={} reason={} superseded={}",
                    date,
                    reason.as_str(),
                    save.superseded
                );
            }
            Err(err) => {
                error!(
                    "event=coalescer_flush module=coalescer status=error date={} reason={} error_code={}",
                    date,
                    reason.as_str(),
                    err.kind().as_str()
                );
                (self.on_failure)(CoalescedSaveFailure { date, error: err });
            }
        }
    }
}
