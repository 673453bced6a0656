//! Core library for Study Planner.
//!
//! This crate provides the domain models and database operations for the
//! study planner, independent of any transport layer (HTTP, MCP, etc.) and of
//! the background scheduler that consumes them.
//!
//! # Usage
//!
//! ```no_run
//! use chrono::Utc;
//! use study_planner_core::db::Database;
//!
//! let db = Database::open_default()?;
//! db.migrate()?;
//!
//! let due = db.list_due_pending(Utc::now())?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod db;
pub mod models;
pub mod store;

// Re-export commonly used types at crate root
pub use db::Database;
pub use store::{HistoryLog, PlanStore};
