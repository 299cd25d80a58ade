//! Daily schedule domain model.
//!
//! # Responsibility
//! - Define the in-memory shape of one calendar day's plan.
//! - Provide documented defaults used when nothing was persisted yet.
//! - Validate a schedule before it reaches the storage layer.
//!
//! # Invariants
//! - Slot form always carries exactly 24 slots, slot `i` has `hour == i`.
//! - An empty slot label means "unset" and is never persisted.
//! - Sleep windows are stored verbatim; `end < start` is an overnight wrap.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Number of hour slots in one slot-form day.
pub const HOURS_PER_DAY: usize = 24;

/// Default sleep start applied when a day has no persisted sleep window.
pub const DEFAULT_SLEEP_START: TimeOfDay = TimeOfDay {
    hour: 22,
    minute: 0,
};

/// Default sleep end applied when a day has no persisted sleep window.
pub const DEFAULT_SLEEP_END: TimeOfDay = TimeOfDay { hour: 6, minute: 0 };

/// Text format used for `days.date`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

static TIME_OF_DAY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2}):(\d{2})$").expect("valid time-of-day regex"));

/// Stable internal key of a persisted calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayId(pub i64);

impl Display for DayId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Activity representation selected once per store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    /// One fixed entry per hour of day.
    Slots,
    /// Free list of start/end entries.
    Intervals,
}

impl ScheduleMode {
    /// Stable text tag persisted in `engine_meta`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Slots => "slots",
            Self::Intervals => "intervals",
        }
    }

    /// Parses a persisted mode tag.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "slots" => Some(Self::Slots),
            "intervals" => Some(Self::Intervals),
            _ => None,
        }
    }
}

impl Display for ScheduleMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hour:minute pair without date or zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
}

impl TimeOfDay {
    /// Builds a time of day, rejecting out-of-range components.
    pub fn new(hour: u8, minute: u8) -> Result<Self, ScheduleValidationError> {
        if hour > 23 || minute > 59 {
            return Err(ScheduleValidationError::TimeOutOfRange { hour, minute });
        }
        Ok(Self { hour, minute })
    }
}

impl Display for TimeOfDay {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TimeOfDay {
    type Err = ScheduleValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let captures = TIME_OF_DAY_RE
            .captures(trimmed)
            .ok_or_else(|| ScheduleValidationError::InvalidTimeText(trimmed.to_string()))?;
        let hour = captures[1]
            .parse::<u8>()
            .map_err(|_| ScheduleValidationError::InvalidTimeText(trimmed.to_string()))?;
        let minute = captures[2]
            .parse::<u8>()
            .map_err(|_| ScheduleValidationError::InvalidTimeText(trimmed.to_string()))?;
        Self::new(hour, minute)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Sleep boundaries for one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepWindow {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl SleepWindow {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Self {
        Self { start, end }
    }

    /// Whether the window crosses midnight.
    pub fn wraps_midnight(&self) -> bool {
        self.end < self.start
    }
}

impl Default for SleepWindow {
    fn default() -> Self {
        Self {
            start: DEFAULT_SLEEP_START,
            end: DEFAULT_SLEEP_END,
        }
    }
}

/// Slot-form entry. An empty `activity` means unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourSlot {
    pub hour: u8,
    pub activity: String,
}

impl HourSlot {
    pub fn unset(hour: u8) -> Self {
        Self {
            hour,
            activity: String::new(),
        }
    }

    pub fn is_set(&self) -> bool {
        !self.activity.is_empty()
    }
}

/// Interval-form entry. Overlap between entries is allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalEntry {
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub activity: String,
    /// Category identifier from the UI icon catalog.
    pub category: String,
}

/// Activities of one day in the store's representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "entries", rename_all = "snake_case")]
pub enum DayActivities {
    Slots(Vec<HourSlot>),
    Intervals(Vec<IntervalEntry>),
}

impl DayActivities {
    /// Default activity shape for `mode`.
    pub fn empty(mode: ScheduleMode) -> Self {
        match mode {
            ScheduleMode::Slots => Self::Slots(empty_slots()),
            ScheduleMode::Intervals => Self::Intervals(Vec::new()),
        }
    }

    pub fn mode(&self) -> ScheduleMode {
        match self {
            Self::Slots(_) => ScheduleMode::Slots,
            Self::Intervals(_) => ScheduleMode::Intervals,
        }
    }

    /// Number of entries that produce a persisted row.
    pub fn persisted_len(&self) -> usize {
        match self {
            Self::Slots(slots) => slots.iter().filter(|slot| slot.is_set()).count(),
            Self::Intervals(entries) => entries.len(),
        }
    }
}

/// Full plan of one calendar day; saved and loaded as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySchedule {
    pub date: NaiveDate,
    pub sleep_window: SleepWindow,
    pub activities: DayActivities,
}

impl DailySchedule {
    /// Returns the documented default schedule for `date`.
    ///
    /// # Invariants
    /// - Sleep window is `22:00`-`06:00`.
    /// - Slot form has 24 unset slots; interval form is empty.
    pub fn empty(date: NaiveDate, mode: ScheduleMode) -> Self {
        Self {
            date,
            sleep_window: SleepWindow::default(),
            activities: DayActivities::empty(mode),
        }
    }

    pub fn mode(&self) -> ScheduleMode {
        self.activities.mode()
    }

    /// Sets one hour label on a slot-form schedule.
    ///
    /// Returns `false` when the schedule is not slot form or `hour > 23`.
    pub fn set_slot(&mut self, hour: u8, activity: impl Into<String>) -> bool {
        match &mut self.activities {
            DayActivities::Slots(slots) => match slots.get_mut(usize::from(hour)) {
                Some(slot) => {
                    slot.activity = activity.into();
                    true
                }
                None => false,
            },
            DayActivities::Intervals(_) => false,
        }
    }

    /// Appends one entry to an interval-form schedule.
    ///
    /// Returns `false` when the schedule is not interval form.
    pub fn push_interval(&mut self, entry: IntervalEntry) -> bool {
        match &mut self.activities {
            DayActivities::Intervals(entries) => {
                entries.push(entry);
                true
            }
            DayActivities::Slots(_) => false,
        }
    }

    /// Checks shape invariants before persistence.
    ///
    /// # Errors
    /// - `SlotCount` when slot form does not carry exactly 24 slots.
    /// - `SlotHourMismatch` when slot `i` does not describe hour `i`.
    /// - `EmptyIntervalField` when an interval misses its name or category.
    pub fn validate(&self) -> Result<(), ScheduleValidationError> {
        match &self.activities {
            DayActivities::Slots(slots) => {
                if slots.len() != HOURS_PER_DAY {
                    return Err(ScheduleValidationError::SlotCount(slots.len()));
                }
                for (index, slot) in slots.iter().enumerate() {
                    if usize::from(slot.hour) != index {
                        return Err(ScheduleValidationError::SlotHourMismatch {
                            index,
                            hour: slot.hour,
                        });
                    }
                }
            }
            DayActivities::Intervals(entries) => {
                for (index, entry) in entries.iter().enumerate() {
                    if entry.activity.trim().is_empty() {
                        return Err(ScheduleValidationError::EmptyIntervalField {
                            index,
                            field: "activity",
                        });
                    }
                    if entry.category.trim().is_empty() {
                        return Err(ScheduleValidationError::EmptyIntervalField {
                            index,
                            field: "category",
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Formats a calendar date for `days.date`.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parses `YYYY-MM-DD` calendar date text.
pub fn parse_date(value: &str) -> Result<NaiveDate, ScheduleValidationError> {
    let trimmed = value.trim();
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .map_err(|_| ScheduleValidationError::InvalidDateText(trimmed.to_string()))
}

/// Returns 24 unset slots, hour `i` at index `i`.
pub fn empty_slots() -> Vec<HourSlot> {
    (0..HOURS_PER_DAY as u8).map(HourSlot::unset).collect()
}

/// Shape errors for schedule values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleValidationError {
    InvalidDateText(String),
    InvalidTimeText(String),
    TimeOutOfRange { hour: u8, minute: u8 },
    SlotCount(usize),
    SlotHourMismatch { index: usize, hour: u8 },
    EmptyIntervalField { index: usize, field: &'static str },
    ModeMismatch {
        expected: ScheduleMode,
        actual: ScheduleMode,
    },
}

impl Display for ScheduleValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDateText(value) => {
                write!(f, "invalid date `{value}`; expected YYYY-MM-DD")
            }
            Self::InvalidTimeText(value) => write!(f, "invalid time `{value}`; expected HH:MM"),
            Self::TimeOutOfRange { hour, minute } => {
                write!(f, "time {hour}:{minute} is out of range")
            }
            Self::SlotCount(count) => {
                write!(f, "slot schedule must have {HOURS_PER_DAY} slots, got {count}")
            }
            Self::SlotHourMismatch { index, hour } => {
                write!(f, "slot at index {index} carries hour {hour}")
            }
            Self::EmptyIntervalField { index, field } => {
                write!(f, "interval entry {index} has empty {field}")
            }
            Self::ModeMismatch { expected, actual } => {
                write!(f, "store uses {expected} schedules, got {actual}")
            }
        }
    }
}

impl Error for ScheduleValidationError {}
