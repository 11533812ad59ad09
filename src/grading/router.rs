use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::audit::AuditSink;
use super::domain::{RequestContext, RunId, SchemeId, SectionId, TableId};
use super::errors::EngineError;
use super::outcome::ComputedGrade;
use super::repository::{ConfigStore, RepositoryError, RunStore, SectionStore};
use super::service::{ComputeRunRequest, GradeComputationService};

/// Router builder exposing HTTP endpoints for creating and inspecting
/// compute runs.
pub fn grading_router<S, A>(service: Arc<GradeComputationService<S, A>>) -> Router
where
    S: ConfigStore + SectionStore + RunStore + 'static,
    A: AuditSink + 'static,
{
    Router::new()
        .route("/api/v1/grading/runs", post(create_run_handler::<S, A>))
        .route("/api/v1/grading/runs/:run_id", get(run_handler::<S, A>))
        .route(
            "/api/v1/grading/runs/:run_id/grades",
            get(grades_handler::<S, A>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateRunPayload {
    pub organization_id: String,
    pub actor_id: String,
    pub section_id: String,
    pub term: String,
    pub scheme_id: String,
    pub as_of: DateTime<Utc>,
    #[serde(default)]
    pub transmutation_table_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContextQuery {
    pub organization_id: String,
    #[serde(default = "default_actor")]
    pub actor_id: String,
}

fn default_actor() -> String {
    "api".to_string()
}

impl ContextQuery {
    fn into_context(self) -> RequestContext {
        RequestContext {
            organization_id: self.organization_id,
            actor_id: self.actor_id,
        }
    }
}

pub(crate) async fn create_run_handler<S, A>(
    State(service): State<Arc<GradeComputationService<S, A>>>,
    axum::Json(payload): axum::Json<CreateRunPayload>,
) -> Response
where
    S: ConfigStore + SectionStore + RunStore + 'static,
    A: AuditSink + 'static,
{
    let ctx = RequestContext {
        organization_id: payload.organization_id,
        actor_id: payload.actor_id,
    };
    let request = ComputeRunRequest {
        section_id: SectionId(payload.section_id),
        term: payload.term,
        scheme_id: SchemeId(payload.scheme_id),
        as_of: payload.as_of,
        transmutation_table_id: payload.transmutation_table_id.map(TableId),
    };

    let run = match service.create_run(&ctx, request) {
        Ok(run) => run,
        Err(error) => return engine_error_response(error),
    };

    match service.execute_run(&ctx, &run.id) {
        Ok(outcome) => {
            let grades: Vec<_> = outcome
                .grades
                .iter()
                .map(ComputedGrade::status_view)
                .collect();
            let body = json!({
                "run": outcome.run.status_view(),
                "grades": grades,
            });
            (StatusCode::CREATED, axum::Json(body)).into_response()
        }
        Err(EngineError::Configuration(error)) => {
            // The run is recorded as failed; hand the caller both the error
            // and the run id so the failure stays discoverable.
            let body = json!({
                "error": error.to_string(),
                "run_id": run.id.0,
                "status": "failed",
            });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(body)).into_response()
        }
        Err(error) => engine_error_response(error),
    }
}

pub(crate) async fn run_handler<S, A>(
    State(service): State<Arc<GradeComputationService<S, A>>>,
    Path(run_id): Path<String>,
    Query(context): Query<ContextQuery>,
) -> Response
where
    S: ConfigStore + SectionStore + RunStore + 'static,
    A: AuditSink + 'static,
{
    let ctx = context.into_context();
    match service.run(&ctx, &RunId(run_id)) {
        Ok(run) => (StatusCode::OK, axum::Json(run.status_view())).into_response(),
        Err(error) => engine_error_response(error),
    }
}

pub(crate) async fn grades_handler<S, A>(
    State(service): State<Arc<GradeComputationService<S, A>>>,
    Path(run_id): Path<String>,
    Query(context): Query<ContextQuery>,
) -> Response
where
    S: ConfigStore + SectionStore + RunStore + 'static,
    A: AuditSink + 'static,
{
    let ctx = context.into_context();
    match service.grades(&ctx, &RunId(run_id)) {
        Ok(grades) => {
            let views: Vec<_> = grades.iter().map(ComputedGrade::status_view).collect();
            (StatusCode::OK, axum::Json(views)).into_response()
        }
        Err(error) => engine_error_response(error),
    }
}

fn engine_error_response(error: EngineError) -> Response {
    let status = match &error {
        EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
        EngineError::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::RunNotExecutable { .. } => StatusCode::CONFLICT,
        EngineError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = json!({ "error": error.to_string() });
    (status, axum::Json(body)).into_response()
}
