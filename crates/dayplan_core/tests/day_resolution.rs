use chrono::NaiveDate;
use dayplan_core::db::open_db_in_memory;
use dayplan_core::{
    DayRepository, ScheduleMode, ScheduleService, SqliteDayRepository, StoreHandle,
};
use std::sync::{Arc, Barrier};
use std::thread;

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
}

#[test]
fn resolve_day_id_is_stable_for_same_date() {
    let conn = open_db_in_memory(ScheduleMode::Intervals).unwrap();
    let repo = SqliteDayRepository::new(&conn);

    let first = repo.resolve_day_id(date(1)).unwrap();
    let second = repo.resolve_day_id(date(1)).unwrap();
    let other = repo.resolve_day_id(date(2)).unwrap();

    assert_eq!(first, second);
    assert_ne!(first, other);
    assert_eq!(day_row_count(&conn, "2024-05-01"), 1);
}

#[test]
fn find_day_id_does_not_create_rows() {
    let conn = open_db_in_memory(ScheduleMode::Slots).unwrap();
    let repo = SqliteDayRepository::new(&conn);

    assert_eq!(repo.find_day_id(date(3)).unwrap(), None);
    assert_eq!(day_row_count(&conn, "2024-05-03"), 0);

    let created = repo.resolve_day_id(date(3)).unwrap();
    assert_eq!(repo.find_day_id(date(3)).unwrap(), Some(created));
}

#[test]
fn list_days_is_ordered_by_date() {
    let conn = open_db_in_memory(ScheduleMode::Slots).unwrap();
    let repo = SqliteDayRepository::new(&conn);

    repo.resolve_day_id(date(9)).unwrap();
    repo.resolve_day_id(date(2)).unwrap();
    repo.resolve_day_id(date(5)).unwrap();

    let dates = repo
        .list_days()
        .unwrap()
        .into_iter()
        .map(|day| day.date)
        .collect::<Vec<_>>();
    assert_eq!(dates, vec![date(2), date(5), date(9)]);
}

#[test]
fn concurrent_resolution_on_separate_connections_creates_one_row() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("race.db");
    drop(StoreHandle::open(&path, ScheduleMode::Intervals).unwrap());

    let workers = 4;
    let barrier = Arc::new(Barrier::new(workers));
    let handles = (0..workers)
        .map(|_| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let service = ScheduleService::open(&path, ScheduleMode::Intervals).unwrap();
                barrier.wait();
                service.resolve_day_id(date(20)).unwrap()
            })
        })
        .collect::<Vec<_>>();

    let ids = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect::<Vec<_>>();
    assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));

    let service = ScheduleService::open(&path, ScheduleMode::Intervals).unwrap();
    let conn = service.store().lock().unwrap();
    assert_eq!(day_row_count(&conn, "2024-05-20"), 1);
}

fn day_row_count(conn: &rusqlite::Connection, date: &str) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM days WHERE date = ?1;", [date], |row| {
        row.get(0)
    })
    .unwrap()
}
