//! HTTP API for study plans, generation history and interactive generation.

mod error;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::db::{Database, PlanWrite};
use crate::generator::{ContentGenerator, GenerationError};
use crate::models::*;
use crate::scheduler::runner::DEFAULT_GENERATION_TIMEOUT_SECS;

pub use error::ApiError;

type ApiResult<T> = Result<T, ApiError>;

#[derive(Clone)]
pub struct AppState {
    db: Database,
    generator: Arc<dyn ContentGenerator>,
    generation_timeout: Duration,
}

impl AppState {
    pub fn new(db: Database, generator: Arc<dyn ContentGenerator>) -> Self {
        Self {
            db,
            generator,
            generation_timeout: Duration::from_secs(DEFAULT_GENERATION_TIMEOUT_SECS),
        }
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/health", get(health))
        .route("/api/study-plans", get(list_plans).post(create_plan))
        .route(
            "/api/study-plans/{id}",
            get(get_plan).put(update_plan).delete(delete_plan),
        )
        .route("/api/history", get(list_history))
        .route("/api/history/{id}", get(get_history))
        .route("/api/stats", get(stats))
        .route("/api/generate", post(generate))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn root() -> &'static str {
    "Server is running!"
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct ListPlansQuery {
    status: Option<String>,
}

/// `?status=` on the plan listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlanFilter {
    Status(PlanStatus),
    /// Plans with a content reference or a scheduled time, in any status.
    Planned,
    /// Plans with neither.
    Unplanned,
}

fn parse_status_filter(raw: &str) -> ApiResult<PlanFilter> {
    match raw {
        "planned" => Ok(PlanFilter::Planned),
        "unplanned" => Ok(PlanFilter::Unplanned),
        other => PlanStatus::from_str(other)
            .map(PlanFilter::Status)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown status filter: {other}"))),
    }
}

async fn list_plans(
    State(state): State<AppState>,
    Query(query): Query<ListPlansQuery>,
) -> ApiResult<Json<Vec<StudyPlan>>> {
    let filter = query.status.as_deref().map(parse_status_filter).transpose()?;
    let plans = match filter {
        None => state.db.list_study_plans(None)?,
        Some(PlanFilter::Status(status)) => state.db.list_study_plans(Some(status))?,
        Some(PlanFilter::Planned) => state
            .db
            .list_study_plans(None)?
            .into_iter()
            .filter(StudyPlan::is_planned)
            .collect(),
        Some(PlanFilter::Unplanned) => state
            .db
            .list_study_plans(None)?
            .into_iter()
            .filter(|plan| !plan.is_planned())
            .collect(),
    };
    Ok(Json(plans))
}

async fn create_plan(
    State(state): State<AppState>,
    Json(input): Json<CreateStudyPlanInput>,
) -> ApiResult<(StatusCode, Json<StudyPlan>)> {
    if input.title.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Please provide a title for the study plan.".into(),
        ));
    }
    let plan = state.db.create_study_plan(input)?;
    tracing::info!(plan_id = %plan.id, status = plan.status.as_str(), "study plan created");
    Ok((StatusCode::CREATED, Json(plan)))
}

async fn get_plan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<StudyPlan>> {
    state
        .db
        .get_study_plan(id)?
        .map(Json)
        .ok_or(ApiError::NotFound("study plan"))
}

async fn update_plan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateStudyPlanInput>,
) -> ApiResult<Json<StudyPlan>> {
    if input.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::BadRequest("title cannot be empty".into()));
    }
    match state.db.update_study_plan(id, input)? {
        PlanWrite::Done(plan) => Ok(Json(plan)),
        PlanWrite::NotFound => Err(ApiError::NotFound("study plan")),
        PlanWrite::Busy => Err(ApiError::Busy),
    }
}

async fn delete_plan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    match state.db.delete_study_plan(id)? {
        PlanWrite::Done(()) => Ok(StatusCode::NO_CONTENT),
        PlanWrite::NotFound => Err(ApiError::NotFound("study plan")),
        PlanWrite::Busy => Err(ApiError::Busy),
    }
}

async fn list_history(State(state): State<AppState>) -> ApiResult<Json<Vec<HistoryEntry>>> {
    Ok(Json(state.db.list_history()?))
}

async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<HistoryEntry>> {
    state
        .db
        .get_history(id)?
        .map(Json)
        .ok_or(ApiError::NotFound("history entry"))
}

async fn stats(State(state): State<AppState>) -> ApiResult<Json<Stats>> {
    Ok(Json(state.db.stats()?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub youtube_url: Option<String>,
    #[serde(default)]
    pub note_format: NoteFormat,
}

/// Interactive generation for a video URL. The result is returned to the
/// caller and also recorded in history.
async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> ApiResult<Json<StudyMaterial>> {
    let Some(url) = request
        .youtube_url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
    else {
        return Err(ApiError::BadRequest("No YouTube URL or file provided.".into()));
    };

    let material = tokio::time::timeout(
        state.generation_timeout,
        state.generator.generate(&url, request.note_format),
    )
    .await
    .map_err(|_| GenerationError::Timeout(state.generation_timeout))??;

    let input = CreateHistoryInput::from_material(HistoryKind::Youtube, url, material.clone());
    if let Err(e) = state.db.append_history(input) {
        tracing::error!(error = %e, "failed to save history");
    }

    Ok(Json(material))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_filters_parse() {
        assert_eq!(parse_status_filter("planned").unwrap(), PlanFilter::Planned);
        assert_eq!(parse_status_filter("unplanned").unwrap(), PlanFilter::Unplanned);
        assert_eq!(
            parse_status_filter("failed").unwrap(),
            PlanFilter::Status(PlanStatus::Failed)
        );
        assert!(parse_status_filter("bogus").is_err());
    }
}
