use chrono::{DateTime, Utc};
use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerInfo},
    tool, tool_handler, tool_router,
    schemars::JsonSchema,
    ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::models::*;

#[derive(Clone)]
pub struct McpServer {
    db: Database,
    tool_router: ToolRouter<Self>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListStudyPlansRequest {
    #[schemars(description = "Optional status filter: not_started, pending, processing, completed or failed")]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ScheduleStudyPlanRequest {
    #[schemars(description = "Display title for the plan")]
    pub title: String,
    #[schemars(description = "Video URL to generate notes from")]
    pub content_reference: String,
    #[schemars(description = "Note format: summary, bullet_points, q_and_a or flashcards")]
    pub note_format: Option<String>,
    #[schemars(description = "RFC 3339 time to process the plan at; omit to leave it unscheduled")]
    pub scheduled_time: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetHistoryRequest {
    #[schemars(description = "Only return entries generated from this content reference")]
    pub content: Option<String>,
    #[schemars(description = "Maximum number of entries to return (default 10)")]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct PlanSummary {
    pub id: String,
    pub title: String,
    pub status: PlanStatus,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub content_reference: Option<String>,
}

impl From<StudyPlan> for PlanSummary {
    fn from(plan: StudyPlan) -> Self {
        Self {
            id: plan.id.to_string(),
            title: plan.title,
            status: plan.status,
            scheduled_time: plan.scheduled_time,
            content_reference: plan.content_reference,
        }
    }
}

impl McpServer {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            tool_router: Self::tool_router(),
        }
    }

    fn to_json<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }
}

#[tool_router]
impl McpServer {
    #[tool(description = "List study plans, newest first, optionally filtered by status")]
    async fn list_study_plans(
        &self,
        params: Parameters<ListStudyPlansRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let status = match req.status.as_deref() {
            Some(raw) => Some(PlanStatus::from_str(raw).ok_or_else(|| {
                McpError::invalid_params(format!("Unknown status: {}", raw), None)
            })?),
            None => None,
        };

        let plans: Vec<PlanSummary> = self
            .db
            .list_study_plans(status)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?
            .into_iter()
            .map(PlanSummary::from)
            .collect();

        Self::to_json(&plans)
    }

    #[tool(description = "Create a study plan; a future scheduled_time queues it for background note generation")]
    async fn schedule_study_plan(
        &self,
        params: Parameters<ScheduleStudyPlanRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        if req.title.trim().is_empty() {
            return Err(McpError::invalid_params("Title cannot be empty", None));
        }

        let note_format = match req.note_format.as_deref() {
            Some(raw) => NoteFormat::from_str(raw).ok_or_else(|| {
                McpError::invalid_params(format!("Unknown note format: {}", raw), None)
            })?,
            None => NoteFormat::default(),
        };
        let scheduled_time = req
            .scheduled_time
            .as_deref()
            .map(|raw| {
                DateTime::parse_from_rfc3339(raw)
                    .map(|at| at.with_timezone(&Utc))
                    .map_err(|e| McpError::invalid_params(format!("Invalid time: {}", e), None))
            })
            .transpose()?;

        let plan = self
            .db
            .create_study_plan(CreateStudyPlanInput {
                title: req.title,
                content_reference: Some(req.content_reference),
                note_format,
                scheduled_time,
            })
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        Self::to_json(&PlanSummary::from(plan))
    }

    #[tool(description = "Get recently generated notes and quizzes")]
    async fn get_history(
        &self,
        params: Parameters<GetHistoryRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let entries = match req.content.as_deref() {
            Some(content) => self.db.list_history_by_content(content),
            None => self.db.list_history(),
        }
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        let limited: Vec<HistoryEntry> = entries
            .into_iter()
            .take(req.limit.unwrap_or(10))
            .collect();

        Self::to_json(&limited)
    }
}

#[tool_handler]
impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some("Study planner MCP server: schedule study plans and read generated notes".into()),
            ..Default::default()
        }
    }
}

pub async fn run_stdio_server(db: Database) -> anyhow::Result<()> {
    use tokio::io::{stdin, stdout};

    tracing::info!("Starting MCP server via stdio");

    let service = McpServer::new(db);
    let server = service.serve((stdin(), stdout())).await?;

    let quit_reason = server.waiting().await?;
    tracing::info!("MCP server stopped: {:?}", quit_reason);

    Ok(())
}
