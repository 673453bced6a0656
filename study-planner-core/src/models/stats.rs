use serde::{Deserialize, Serialize};

/// Aggregate counters shown on the statistics view.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stats {
    pub notes_generated: u64,
    pub plans_total: u64,
    pub plans_completed: u64,
    /// Plans not yet in a terminal state.
    pub plans_pending: u64,
    pub plans_failed: u64,
}
