use chrono::NaiveDate;
use dayplan_core::{DailySchedule, ScheduleMode, ScheduleService, StoreHandle};

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 8, 14).unwrap()
}

#[test]
fn close_releases_connection_only_for_last_handle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    let store = StoreHandle::open(&path, ScheduleMode::Slots).unwrap();
    let service = ScheduleService::new(store.clone());
    let mut schedule = DailySchedule::empty(date(), ScheduleMode::Slots);
    schedule.set_slot(7, "Grow");
    service.save(&schedule).unwrap();

    assert!(!store.close().unwrap());
    // The service clone still works after the deferred close.
    assert_eq!(service.load(date()).unwrap(), schedule);

    let last = service.store().clone();
    drop(service);
    assert!(last.close().unwrap());

    let reopened = ScheduleService::open(&path, ScheduleMode::Slots).unwrap();
    assert_eq!(reopened.load(date()).unwrap(), schedule);
}

#[test]
fn in_memory_store_closes_cleanly() {
    let store = StoreHandle::open_in_memory(ScheduleMode::Intervals).unwrap();
    assert_eq!(store.mode(), ScheduleMode::Intervals);
    assert!(store.close().unwrap());
}
