//! Day-planning domain model.
//!
//! # Responsibility
//! - Define canonical data structures used by the persistence engine.
//! - Keep slot form and interval form as one tagged variant.
//!
//! # Invariants
//! - A store holds exactly one `ScheduleMode`; schedules of the other mode
//!   are rejected before any write.

pub mod schedule;
