//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into engine-level operations.
//! - Coalesce bursts of edits into single saves.
//! - Keep UI/FFI layers decoupled from storage details.

pub mod save_coalescer;
pub mod schedule_service;
