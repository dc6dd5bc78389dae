//! Manual workflow triggers
//!
//! Queues a cadence workflow exactly as a scheduler tick would.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::pool::SubmitError;
use crate::workflow::WorkflowKind;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct WorkflowQueued {
    pub workflow: WorkflowKind,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct WorkflowList {
    pub scheduled: Vec<WorkflowKind>,
}

/// POST /workflows/:name/run
pub async fn run_workflow(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<(StatusCode, Json<WorkflowQueued>)> {
    let kind = WorkflowKind::parse(&name)
        .ok_or_else(|| ApiError::NotFound(format!("workflow '{}'", name)))?;
    if !kind.is_scheduled() {
        return Err(ApiError::BadRequest(format!(
            "{} runs per reading; post realtimeData instead",
            kind
        )));
    }

    match state.dispatcher.trigger(kind) {
        Ok(()) => {
            info!(workflow = %kind, "Manual run queued");
            Ok((
                StatusCode::ACCEPTED,
                Json(WorkflowQueued {
                    workflow: kind,
                    status: "queued",
                }),
            ))
        }
        Err(SubmitError::Overloaded) => {
            Err(ApiError::Overloaded(format!("{} could not be queued", kind)))
        }
        Err(SubmitError::Closed) => Err(ApiError::Internal("worker pool is shut down".to_string())),
    }
}

/// GET /workflows
pub async fn list_workflows() -> Json<WorkflowList> {
    Json(WorkflowList {
        scheduled: WorkflowKind::SCHEDULED.to_vec(),
    })
}

pub fn workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/workflows", get(list_workflows))
        .route("/workflows/:name/run", post(run_workflow))
}
