use anyhow::Result;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use super::{conversion_error, now, parse_time, parse_uuid, to_sql_time, Database};
use crate::models::{CreateHistoryInput, HistoryEntry, HistoryKind};

const HISTORY_COLUMNS: &str = "id, type, content, notes, quiz, created_at";

impl Database {
    /// Append a generation outcome. History entries are never modified.
    pub fn append_history(&self, input: CreateHistoryInput) -> Result<HistoryEntry> {
        let entry = HistoryEntry {
            id: Uuid::new_v4(),
            kind: input.kind,
            content: input.content,
            notes: input.notes,
            quiz: input.quiz,
            created_at: now(),
        };
        let quiz = serde_json::to_string(&entry.quiz)?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO history (id, type, content, notes, quiz, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.id.to_string(),
                entry.kind.as_str(),
                entry.content,
                entry.notes,
                quiz,
                to_sql_time(entry.created_at),
            ],
        )?;

        Ok(entry)
    }

    /// All entries, newest first.
    pub fn list_history(&self) -> Result<Vec<HistoryEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {HISTORY_COLUMNS} FROM history ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map([], row_to_entry)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Entries whose source reference equals `content`, newest first.
    pub fn list_history_by_content(&self, content: &str) -> Result<Vec<HistoryEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {HISTORY_COLUMNS} FROM history WHERE content = ?1 ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map(params![content], row_to_entry)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_history(&self, id: Uuid) -> Result<Option<HistoryEntry>> {
        let conn = self.lock()?;
        let entry = conn
            .query_row(
                &format!("SELECT {HISTORY_COLUMNS} FROM history WHERE id = ?1"),
                params![id.to_string()],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<HistoryEntry> {
    let id: String = row.get(0)?;
    let kind: String = row.get(1)?;
    let quiz: String = row.get(4)?;
    let created_at: String = row.get(5)?;

    Ok(HistoryEntry {
        id: parse_uuid(0, &id)?,
        kind: HistoryKind::from_str(&kind)
            .ok_or_else(|| conversion_error(1, format!("unknown history type {kind:?}")))?,
        content: row.get(2)?,
        notes: row.get(3)?,
        quiz: serde_json::from_str(&quiz)
            .map_err(|e| conversion_error(4, format!("bad quiz json: {e}")))?,
        created_at: parse_time(5, &created_at)?,
    })
}
