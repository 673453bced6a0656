//! Deferred study plan processing.
//!
//! A single polling loop picks up due plans and records their outcome. See
//! [`runner`] for the lifecycle and failure rules.

pub mod runner;

pub use runner::{
    PlanOutcome, Scheduler, SchedulerConfig, SchedulerError, SchedulerHandle, TickReport,
};
