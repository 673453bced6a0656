//! Study plan scheduler loop.
//!
//! Every tick the scheduler asks the plan store for pending plans whose
//! scheduled time has passed and drives each one, in order, through
//! `Pending -> Processing -> Completed | Failed`. The `Processing` claim is
//! written before the generator is called, so a plan can only be picked up
//! once.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::generator::{ContentGenerator, GenerationError};
use crate::models::{CreateHistoryInput, HistoryKind, PlanStatus, StudyMaterial, StudyPlan};
use crate::store::{HistoryLog, PlanStore};

/// Interval between scheduler ticks (seconds).
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 60;

/// Upper bound on a single generation call (seconds).
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 120;

/// Age after which a `Processing` plan is considered abandoned (seconds).
pub const DEFAULT_STALE_PROCESSING_SECS: u64 = 30 * 60;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub generation_timeout: Duration,
    /// `None` disables stale-claim recovery on start.
    pub stale_processing_after: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(DEFAULT_TICK_INTERVAL_SECS),
            generation_timeout: Duration::from_secs(DEFAULT_GENERATION_TIMEOUT_SECS),
            stale_processing_after: Some(Duration::from_secs(DEFAULT_STALE_PROCESSING_SECS)),
        }
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The due-plan query itself failed; nothing was processed this tick.
    #[error("failed to query due study plans: {0:#}")]
    Query(anyhow::Error),
}

/// What happened to one due plan during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanOutcome {
    Completed,
    Failed,
    /// Not claimed: the claim write failed or another writer moved the plan
    /// first. The plan is left as the store has it.
    Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub due: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl TickReport {
    fn record(&mut self, outcome: PlanOutcome) {
        match outcome {
            PlanOutcome::Completed => self.completed += 1,
            PlanOutcome::Failed => self.failed += 1,
            PlanOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Background processor for scheduled study plans.
pub struct Scheduler {
    plans: Arc<dyn PlanStore>,
    history: Arc<dyn HistoryLog>,
    generator: Arc<dyn ContentGenerator>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        plans: Arc<dyn PlanStore>,
        history: Arc<dyn HistoryLog>,
        generator: Arc<dyn ContentGenerator>,
    ) -> Self {
        Self {
            plans,
            history,
            generator,
            config: SchedulerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Run one pass against the current time.
    pub async fn tick(&self) -> Result<TickReport, SchedulerError> {
        self.tick_at(Utc::now()).await
    }

    /// Run one pass, treating `now` as the current time.
    ///
    /// Plans are handled sequentially in the order the store returns them.
    /// Per-plan failures are contained; only a failing due-plan query aborts
    /// the pass.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<TickReport, SchedulerError> {
        let due = self
            .plans
            .list_due_pending(now)
            .map_err(SchedulerError::Query)?;

        if due.is_empty() {
            debug!("no due study plans");
            return Ok(TickReport::default());
        }

        info!(count = due.len(), "processing due study plans");
        let mut report = TickReport {
            due: due.len(),
            ..TickReport::default()
        };
        for plan in &due {
            report.record(self.process_plan(plan).await);
        }

        info!(
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped,
            "scheduler tick finished"
        );
        Ok(report)
    }

    async fn process_plan(&self, plan: &StudyPlan) -> PlanOutcome {
        match self.plans.claim(plan.id) {
            Ok(true) => {}
            Ok(false) => {
                debug!(plan_id = %plan.id, "plan no longer pending, skipping");
                return PlanOutcome::Skipped;
            }
            Err(e) => {
                error!(
                    plan_id = %plan.id,
                    error = %e,
                    "failed to claim plan, will retry next tick"
                );
                return PlanOutcome::Skipped;
            }
        }

        info!(plan_id = %plan.id, title = %plan.title, "processing study plan");
        match self.generate(plan).await {
            Ok(material) => {
                self.record_history(plan, material);
                self.finish(plan, PlanStatus::Completed);
                info!(plan_id = %plan.id, "study plan completed");
                PlanOutcome::Completed
            }
            Err(e) if e.is_quota() => {
                warn!(
                    plan_id = %plan.id,
                    error = %e,
                    "generation quota exhausted, marking plan failed"
                );
                self.finish(plan, PlanStatus::Failed);
                PlanOutcome::Failed
            }
            Err(e) => {
                error!(
                    plan_id = %plan.id,
                    kind = e.kind(),
                    error = %e,
                    "generation failed, marking plan failed"
                );
                self.finish(plan, PlanStatus::Failed);
                PlanOutcome::Failed
            }
        }
    }

    /// Call the generator on its own task, bounded by the configured timeout.
    ///
    /// Running it as a separate task turns a panicking generator into an
    /// ordinary failure for this plan.
    async fn generate(&self, plan: &StudyPlan) -> Result<StudyMaterial, GenerationError> {
        let reference = plan
            .content_reference
            .clone()
            .ok_or(GenerationError::MissingContent)?;
        let note_format = plan.note_format;
        let generator = Arc::clone(&self.generator);

        let mut task =
            tokio::spawn(async move { generator.generate(&reference, note_format).await });

        match tokio::time::timeout(self.config.generation_timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(GenerationError::Aborted(join_error.to_string())),
            Err(_) => {
                task.abort();
                Err(GenerationError::Timeout(self.config.generation_timeout))
            }
        }
    }

    fn record_history(&self, plan: &StudyPlan, material: StudyMaterial) {
        let content = plan.content_reference.clone().unwrap_or_default();
        let input = CreateHistoryInput::from_material(HistoryKind::StudyPlan, content, material);
        // The plan still completes: the material was generated, only the
        // record of it is missing.
        if let Err(e) = self.history.append(input) {
            error!(plan_id = %plan.id, error = %e, "failed to record history for study plan");
        }
    }

    fn finish(&self, plan: &StudyPlan, status: PlanStatus) {
        match self.plans.update_status(plan.id, status) {
            Ok(true) => {}
            Ok(false) => warn!(
                plan_id = %plan.id,
                "plan disappeared before its outcome was recorded"
            ),
            Err(e) => error!(
                plan_id = %plan.id,
                status = status.as_str(),
                error = %e,
                "failed to record plan outcome, plan left processing"
            ),
        }
    }

    /// Fail plans left `Processing` by a previous run that never finished.
    ///
    /// They are not re-run: the generator may already have been billed for
    /// them. The user can reschedule.
    pub fn recover_stale(&self, now: DateTime<Utc>) -> Vec<uuid::Uuid> {
        let Some(after) = self.config.stale_processing_after else {
            return Vec::new();
        };
        let Ok(after) = chrono::Duration::from_std(after) else {
            warn!("stale processing threshold out of range, skipping recovery");
            return Vec::new();
        };

        match self.plans.fail_stale_processing(now - after) {
            Ok(ids) => {
                for id in &ids {
                    warn!(plan_id = %id, "study plan stuck in processing, marked failed");
                }
                ids
            }
            Err(e) => {
                error!(error = %e, "failed to recover stale study plans");
                Vec::new()
            }
        }
    }

    /// Spawn the scheduler loop on the tokio runtime.
    ///
    /// The first tick runs immediately. Ticks never overlap: a tick that
    /// outlasts the interval delays the next one instead of running beside it.
    pub fn start(self) -> SchedulerHandle {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(self.run(shutdown.clone()));
        SchedulerHandle { shutdown, task }
    }

    async fn run(self, shutdown: CancellationToken) {
        self.recover_stale(Utc::now());
        info!(
            interval_secs = self.config.tick_interval.as_secs(),
            "study plan scheduler started"
        );

        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "scheduler tick aborted");
                    }
                }
            }
        }

        info!("study plan scheduler stopped");
    }
}

/// Owner handle for a running scheduler loop.
pub struct SchedulerHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the loop, letting an in-flight tick finish first.
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            error!(error = %e, "scheduler task ended abnormally");
        }
    }
}
