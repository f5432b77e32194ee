//! Limit-checking engine.
//!
//! This crate provides:
//! - `EventStore`: append-only, per-user ordered event history
//! - `LimitEvaluator` implementations for the consecutive-deletion,
//!   top-secret-read and user-update-window rules
//! - `LimitChecker`: runs every evaluator on every event and persists results
//! - `NotificationSink` contract plus an in-memory implementation
//! - `LaneRouter`: per-user ordered, cross-user concurrent processing lanes

pub mod evaluator;
pub mod lanes;
pub mod orchestrator;
pub mod sink;
pub mod store;

pub use evaluator::{default_evaluators, EvaluatorError, LimitEvaluator};
pub use lanes::{LaneError, LaneRouter};
pub use orchestrator::{EvaluationOutcome, Evaluated, LimitChecker, Outcome, ProcessReport};
pub use sink::{MemorySink, NotificationFilters, NotificationSink, SinkError};
pub use store::EventStore;
