//! Storage boundary consumed by the background scheduler.
//!
//! The scheduler only needs a narrow slice of the database: find due plans,
//! claim them, record outcomes. Keeping that slice behind traits lets tests
//! substitute stores that fail on demand.

use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::Database;
use crate::models::{CreateHistoryInput, HistoryEntry, PlanStatus, StudyPlan};

pub trait PlanStore: Send + Sync {
    /// Pending plans with `scheduled_time <= now`, in processing order.
    fn list_due_pending(&self, now: DateTime<Utc>) -> Result<Vec<StudyPlan>>;

    /// Atomically move a plan from `Pending` to `Processing`.
    ///
    /// Returns `false` when the plan was no longer pending, meaning some other
    /// writer got there first.
    fn claim(&self, id: Uuid) -> Result<bool>;

    /// Returns `false` if the plan no longer exists.
    fn update_status(&self, id: Uuid, status: PlanStatus) -> Result<bool>;

    /// Fail plans stuck in `Processing` since before `cutoff`.
    fn fail_stale_processing(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>>;
}

pub trait HistoryLog: Send + Sync {
    fn append(&self, input: CreateHistoryInput) -> Result<HistoryEntry>;
}

impl PlanStore for Database {
    fn list_due_pending(&self, now: DateTime<Utc>) -> Result<Vec<StudyPlan>> {
        Database::list_due_pending(self, now)
    }

    fn claim(&self, id: Uuid) -> Result<bool> {
        self.transition_plan_status(id, PlanStatus::Pending, PlanStatus::Processing)
    }

    fn update_status(&self, id: Uuid, status: PlanStatus) -> Result<bool> {
        self.update_plan_status(id, status)
    }

    fn fail_stale_processing(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>> {
        Database::fail_stale_processing(self, cutoff)
    }
}

impl HistoryLog for Database {
    fn append(&self, input: CreateHistoryInput) -> Result<HistoryEntry> {
        self.append_history(input)
    }
}
