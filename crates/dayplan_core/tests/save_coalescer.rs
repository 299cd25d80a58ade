use chrono::NaiveDate;
use dayplan_core::{
    CoalescedSaveFailure, CoalescerConfig, DailySchedule, EngineError,
    EngineErrorKind, RepoError, SaveCoalescer, ScheduleMode, ScheduleService, ScheduleSink,
};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const QUIESCENCE: Duration = Duration::from_millis(150);

#[derive(Clone, Default)]
struct RecordingSink {
    saves: Arc<Mutex<Vec<DailySchedule>>>,
}

impl RecordingSink {
    fn saved(&self) -> Vec<DailySchedule> {
        self.saves.lock().unwrap().clone()
    }
}

impl ScheduleSink for RecordingSink {
    fn save(&self, schedule: &DailySchedule) -> Result<(), EngineError> {
        self.saves.lock().unwrap().push(schedule.clone());
        Ok(())
    }
}

struct FailingSink;

impl ScheduleSink for FailingSink {
    fn save(&self, schedule: &DailySchedule) -> Result<(), EngineError> {
        Err(EngineError::SaveFailed {
            date: schedule.date,
            source: RepoError::InvalidData("disk unavailable".to_string()),
        })
    }
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 7, day).unwrap()
}

fn snapshot(day: u32, hour: u8, label: &str) -> DailySchedule {
    let mut schedule = DailySchedule::empty(date(day), ScheduleMode::Slots);
    schedule.set_slot(hour, label);
    schedule
}

fn config() -> CoalescerConfig {
    CoalescerConfig {
        quiescence: QUIESCENCE,
    }
}

fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met in time");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn burst_within_window_results_in_one_save_of_last_snapshot() {
    let sink = RecordingSink::default();
    let coalescer = SaveCoalescer::spawn(sink.clone(), config(), |_| {}).unwrap();

    coalescer.schedule(snapshot(1, 8, "Play")).unwrap();
    coalescer.schedule(snapshot(1, 8, "Work")).unwrap();
    coalescer.schedule(snapshot(1, 8, "Grow")).unwrap();

    wait_for(|| !sink.saved().is_empty());
    thread::sleep(QUIESCENCE * 2);

    let saved = sink.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0], snapshot(1, 8, "Grow"));
    assert_eq!(coalescer.pending(), 0);
}

#[test]
fn nothing_is_written_before_the_window_expires() {
    let sink = RecordingSink::default();
    let coalescer = SaveCoalescer::spawn(
        sink.clone(),
        CoalescerConfig {
            quiescence: Duration::from_secs(30),
        },
        |_| {},
    )
    .unwrap();

    coalescer.schedule(snapshot(2, 9, "Work")).unwrap();
    thread::sleep(Duration::from_millis(100));

    assert!(sink.saved().is_empty());
    assert_eq!(coalescer.pending(), 1);
}

#[test]
fn different_dates_are_saved_independently() {
    let sink = RecordingSink::default();
    let coalescer = SaveCoalescer::spawn(sink.clone(), config(), |_| {}).unwrap();

    coalescer.schedule(snapshot(3, 7, "Work")).unwrap();
    coalescer.schedule(snapshot(4, 7, "Play")).unwrap();
    coalescer.schedule(snapshot(3, 7, "Grow")).unwrap();

    wait_for(|| sink.saved().len() == 2);

    let saved = sink.saved();
    assert!(saved.contains(&snapshot(3, 7, "Grow")));
    assert!(saved.contains(&snapshot(4, 7, "Play")));
}

#[test]
fn flush_writes_pending_snapshots_immediately() {
    let sink = RecordingSink::default();
    let coalescer = SaveCoalescer::spawn(
        sink.clone(),
        CoalescerConfig {
            quiescence: Duration::from_secs(30),
        },
        |_| {},
    )
    .unwrap();

    coalescer.schedule(snapshot(5, 10, "Work")).unwrap();
    coalescer.schedule(snapshot(5, 11, "Work")).unwrap();
    coalescer.flush().unwrap();

    assert_eq!(sink.saved(), vec![snapshot(5, 11, "Work")]);
    assert_eq!(coalescer.pending(), 0);
}

#[test]
fn pending_is_zero_as_soon_as_flush_returns() {
    let sink = RecordingSink::default();
    let coalescer = SaveCoalescer::spawn(
        sink.clone(),
        CoalescerConfig {
            quiescence: Duration::from_secs(30),
        },
        |_| {},
    )
    .unwrap();

    for round in 0..200u32 {
        let day = 1 + round % 28;
        coalescer.schedule(snapshot(day, 8, "Work")).unwrap();
        if round % 2 == 0 {
            coalescer.schedule(snapshot(day, 9, "Play")).unwrap();
        }
        coalescer.flush().unwrap();
        assert_eq!(coalescer.pending(), 0, "round {round}");
    }
    assert_eq!(sink.saved().len(), 200);
}

#[test]
fn newer_snapshot_restarts_the_window_of_its_date() {
    let window = Duration::from_millis(500);
    let sink = RecordingSink::default();
    let coalescer = SaveCoalescer::spawn(
        sink.clone(),
        CoalescerConfig { quiescence: window },
        |_| {},
    )
    .unwrap();

    let started = Instant::now();
    coalescer.schedule(snapshot(10, 8, "Draft")).unwrap();
    thread::sleep(window * 3 / 5);
    coalescer.schedule(snapshot(10, 8, "Final")).unwrap();

    // Past the first snapshot's deadline, before the second one's.
    let checkpoint = started + window * 6 / 5;
    thread::sleep(checkpoint.saturating_duration_since(Instant::now()));
    assert!(sink.saved().is_empty());
    assert_eq!(coalescer.pending(), 1);

    wait_for(|| !sink.saved().is_empty());
    thread::sleep(window);
    assert_eq!(sink.saved(), vec![snapshot(10, 8, "Final")]);
}

#[test]
fn shutdown_flushes_pending_snapshots() {
    let sink = RecordingSink::default();
    let coalescer = SaveCoalescer::spawn(
        sink.clone(),
        CoalescerConfig {
            quiescence: Duration::from_secs(30),
        },
        |_| {},
    )
    .unwrap();

    coalescer.schedule(snapshot(6, 12, "Play")).unwrap();
    coalescer.shutdown();

    assert_eq!(sink.saved(), vec![snapshot(6, 12, "Play")]);
}

#[test]
fn dropping_the_coalescer_flushes_too() {
    let sink = RecordingSink::default();
    {
        let coalescer = SaveCoalescer::spawn(
            sink.clone(),
            CoalescerConfig {
                quiescence: Duration::from_secs(30),
            },
            |_| {},
        )
        .unwrap();
        coalescer.schedule(snapshot(7, 13, "Grow")).unwrap();
    }

    assert_eq!(sink.saved(), vec![snapshot(7, 13, "Grow")]);
}

#[test]
fn save_failures_reach_the_failure_callback() {
    let (failure_tx, failure_rx) = mpsc::channel::<CoalescedSaveFailure>();
    let coalescer = SaveCoalescer::spawn(FailingSink, config(), move |failure| {
        let _ = failure_tx.send(failure);
    })
    .unwrap();

    coalescer.schedule(snapshot(8, 14, "Work")).unwrap();

    let failure = failure_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(failure.date, date(8));
    assert_eq!(failure.error.kind(), EngineErrorKind::SaveFailed);
}

#[test]
fn coalesced_saves_reach_the_store() {
    let service = ScheduleService::open_in_memory(ScheduleMode::Slots).unwrap();
    let coalescer = SaveCoalescer::spawn(service.clone(), config(), |_| {}).unwrap();

    coalescer.schedule(snapshot(9, 6, "Grow")).unwrap();
    coalescer.schedule(snapshot(9, 6, "Work")).unwrap();
    coalescer.flush().unwrap();

    assert_eq!(service.load(date(9)).unwrap(), snapshot(9, 6, "Work"));
}
