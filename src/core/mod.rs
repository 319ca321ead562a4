//! Core dispatch logic.
//!
//! This module contains:
//! - Selector: nearest-candidate selection over store queries
//! - Audit: dispatch event records
//! - Orchestrator: the created -> dispatched state machine
//! - Trigger: per-document invocation on creation events

pub mod audit;
pub mod orchestrator;
pub mod selector;
pub mod trigger;

// Re-export commonly used types
pub use orchestrator::{
    AbortReason, Assignment, DispatchError, DispatchOutcome, DispatchRecord, Dispatcher,
    SweepReport,
};
pub use selector::{nearest, within_radius, CandidateSelector, Ranked, Selection};
pub use trigger::on_create;
