//! Study Planner server.
//!
//! Users submit a video reference and get AI-generated study notes plus a
//! quiz. Study plans can also be scheduled for later: a background
//! [`scheduler::Scheduler`] polls for plans whose time has come, generates
//! their material through a [`generator::ContentGenerator`], and records the
//! result in the history log.
//!
//! Models and persistence live in `study-planner-core` and are re-exported
//! here as [`db`], [`models`] and [`store`].

pub mod api;
pub mod config;
pub mod generator;
pub mod mcp;
pub mod scheduler;

pub use study_planner_core::{db, models, store};
