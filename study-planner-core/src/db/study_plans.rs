use anyhow::Result;
use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{conversion_error, now, parse_time, parse_uuid, to_sql_time, Database};
use crate::models::{
    CreateStudyPlanInput, NoteFormat, PlanStatus, StudyPlan, UpdateStudyPlanInput,
};

const PLAN_COLUMNS: &str = "id, title, content_reference, note_format, scheduled_time, status, created_at, updated_at";

/// Outcome of a user write against a plan the scheduler may be working on.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanWrite<T> {
    Done(T),
    NotFound,
    /// The plan is `Processing`; it cannot change until the scheduler
    /// records an outcome.
    Busy,
}

impl Database {
    pub fn create_study_plan(&self, input: CreateStudyPlanInput) -> Result<StudyPlan> {
        self.create_study_plan_at(input, now())
    }

    /// Create a plan, deciding its initial status against `now`.
    pub fn create_study_plan_at(
        &self,
        input: CreateStudyPlanInput,
        now: DateTime<Utc>,
    ) -> Result<StudyPlan> {
        let status = PlanStatus::initial(input.scheduled_time, now);
        let scheduled_time = match status {
            PlanStatus::Pending => input.scheduled_time.map(|at| at.trunc_subsecs(3)),
            _ => None,
        };
        let plan = StudyPlan {
            id: Uuid::new_v4(),
            title: input.title,
            content_reference: normalize_reference(input.content_reference),
            note_format: input.note_format,
            scheduled_time,
            status,
            created_at: now.trunc_subsecs(3),
            updated_at: now.trunc_subsecs(3),
        };

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO study_plans (id, title, content_reference, note_format, scheduled_time, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                plan.id.to_string(),
                plan.title,
                plan.content_reference,
                plan.note_format.as_str(),
                plan.scheduled_time.map(to_sql_time),
                plan.status.as_str(),
                to_sql_time(plan.created_at),
                to_sql_time(plan.updated_at),
            ],
        )?;

        tracing::debug!(plan_id = %plan.id, status = plan.status.as_str(), "created study plan");
        Ok(plan)
    }

    pub fn get_study_plan(&self, id: Uuid) -> Result<Option<StudyPlan>> {
        let conn = self.lock()?;
        get_plan(&conn, id)
    }

    /// All plans, newest first, optionally restricted to one status.
    pub fn list_study_plans(&self, status: Option<PlanStatus>) -> Result<Vec<StudyPlan>> {
        let conn = self.lock()?;
        let plans = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {PLAN_COLUMNS} FROM study_plans WHERE status = ?1 ORDER BY created_at DESC"
                ))?;
                let rows = stmt.query_map(params![status.as_str()], row_to_plan)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {PLAN_COLUMNS} FROM study_plans ORDER BY created_at DESC"
                ))?;
                let rows = stmt.query_map([], row_to_plan)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(plans)
    }

    /// Pending plans whose scheduled time is at or before `now`, earliest first.
    pub fn list_due_pending(&self, now: DateTime<Utc>) -> Result<Vec<StudyPlan>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PLAN_COLUMNS} FROM study_plans
             WHERE status = 'pending' AND scheduled_time IS NOT NULL AND scheduled_time <= ?1
             ORDER BY scheduled_time ASC, created_at ASC"
        ))?;
        let rows = stmt.query_map(params![to_sql_time(now)], row_to_plan)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Apply a user edit.
    ///
    /// Supplying a future `scheduled_time` (re)queues the plan as `Pending`,
    /// which is also how a `Failed` plan gets retried. Supplying a past time
    /// or `null` unschedules it (`NotStarted`).
    pub fn update_study_plan(
        &self,
        id: Uuid,
        input: UpdateStudyPlanInput,
    ) -> Result<PlanWrite<StudyPlan>> {
        let now = now();
        let conn = self.lock()?;
        let Some(mut plan) = get_plan(&conn, id)? else {
            return Ok(PlanWrite::NotFound);
        };
        if plan.status == PlanStatus::Processing {
            return Ok(PlanWrite::Busy);
        }

        if let Some(title) = input.title {
            plan.title = title;
        }
        if let Some(reference) = input.content_reference {
            plan.content_reference = normalize_reference(Some(reference));
        }
        if let Some(format) = input.note_format {
            plan.note_format = format;
        }
        if let Some(requested) = input.scheduled_time {
            plan.status = PlanStatus::initial(requested, now);
            plan.scheduled_time = match plan.status {
                PlanStatus::Pending => requested.map(|at| at.trunc_subsecs(3)),
                _ => None,
            };
        }
        plan.updated_at = now;

        conn.execute(
            "UPDATE study_plans
             SET title = ?1, content_reference = ?2, note_format = ?3, scheduled_time = ?4, status = ?5, updated_at = ?6
             WHERE id = ?7",
            params![
                plan.title,
                plan.content_reference,
                plan.note_format.as_str(),
                plan.scheduled_time.map(to_sql_time),
                plan.status.as_str(),
                to_sql_time(plan.updated_at),
                id.to_string(),
            ],
        )?;

        Ok(PlanWrite::Done(plan))
    }

    pub fn delete_study_plan(&self, id: Uuid) -> Result<PlanWrite<()>> {
        let conn = self.lock()?;
        let Some(plan) = get_plan(&conn, id)? else {
            return Ok(PlanWrite::NotFound);
        };
        if plan.status == PlanStatus::Processing {
            return Ok(PlanWrite::Busy);
        }
        conn.execute("DELETE FROM study_plans WHERE id = ?1", params![id.to_string()])?;
        Ok(PlanWrite::Done(()))
    }

    /// Unconditionally set a plan's status. Returns `false` if the plan is gone.
    pub fn update_plan_status(&self, id: Uuid, status: PlanStatus) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE study_plans SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), to_sql_time(now()), id.to_string()],
        )?;
        Ok(changed > 0)
    }

    /// Move a plan from `from` to `to` only if it is still in `from`.
    ///
    /// Returns `true` when this call performed the transition.
    pub fn transition_plan_status(
        &self,
        id: Uuid,
        from: PlanStatus,
        to: PlanStatus,
    ) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE study_plans SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            params![to.as_str(), to_sql_time(now()), id.to_string(), from.as_str()],
        )?;
        Ok(changed > 0)
    }

    /// Mark plans that have been `Processing` since before `cutoff` as `Failed`.
    pub fn fail_stale_processing(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let stale = {
            let mut stmt = tx.prepare(
                "SELECT id FROM study_plans WHERE status = 'processing' AND updated_at < ?1",
            )?;
            let rows = stmt.query_map(params![to_sql_time(cutoff)], |row| {
                let raw: String = row.get(0)?;
                parse_uuid(0, &raw)
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        tx.execute(
            "UPDATE study_plans SET status = 'failed', updated_at = ?1
             WHERE status = 'processing' AND updated_at < ?2",
            params![to_sql_time(now()), to_sql_time(cutoff)],
        )?;
        tx.commit()?;
        Ok(stale)
    }
}

fn get_plan(conn: &Connection, id: Uuid) -> Result<Option<StudyPlan>> {
    let plan = conn
        .query_row(
            &format!("SELECT {PLAN_COLUMNS} FROM study_plans WHERE id = ?1"),
            params![id.to_string()],
            row_to_plan,
        )
        .optional()?;
    Ok(plan)
}

fn normalize_reference(reference: Option<String>) -> Option<String> {
    reference
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
}

fn row_to_plan(row: &Row<'_>) -> rusqlite::Result<StudyPlan> {
    let id: String = row.get(0)?;
    let note_format: String = row.get(3)?;
    let scheduled_time: Option<String> = row.get(4)?;
    let status: String = row.get(5)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;

    Ok(StudyPlan {
        id: parse_uuid(0, &id)?,
        title: row.get(1)?,
        content_reference: row.get(2)?,
        note_format: NoteFormat::from_str(&note_format)
            .ok_or_else(|| conversion_error(3, format!("unknown note format {note_format:?}")))?,
        scheduled_time: scheduled_time
            .as_deref()
            .map(|raw| parse_time(4, raw))
            .transpose()?,
        status: PlanStatus::from_str(&status)
            .ok_or_else(|| conversion_error(5, format!("unknown status {status:?}")))?,
        created_at: parse_time(6, &created_at)?,
        updated_at: parse_time(7, &updated_at)?,
    })
}
