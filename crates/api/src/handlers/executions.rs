use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use engine::{ExecutionFilter, ExecutionStatus, TriggerType, WorkflowExecution};
use serde_json::Value;
use uuid::Uuid;

use crate::AppState;

#[derive(serde::Deserialize)]
pub struct ExecuteWorkflowDto {
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub trigger_type: Option<TriggerType>,
}

pub async fn execute(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<ExecuteWorkflowDto>,
) -> Result<(StatusCode, Json<WorkflowExecution>), StatusCode> {
    let start = std::time::Instant::now();
    let result = state
        .engine
        .execute(id, payload.input.unwrap_or(Value::Null), payload.trigger_type.unwrap_or(TriggerType::Manual))
        .await;

    match result {
        Ok(execution) => {
            state.monitoring.metrics.record_execution(
                id,
                execution.status == ExecutionStatus::Completed,
                start.elapsed().as_millis() as f64,
            );
            Ok((StatusCode::OK, Json(execution)))
        }
        Err(engine::EngineError::WorkflowNotFound(_)) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

pub async fn get(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<WorkflowExecution>, StatusCode> {
    state.engine.get(id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

#[derive(serde::Deserialize)]
pub struct ListExecutionsQuery {
    #[serde(rename = "workflowId")]
    pub workflow_id: Option<Uuid>,
    pub status: Option<String>,
    pub limit: Option<usize>,
}

pub async fn list(
    Query(params): Query<ListExecutionsQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<WorkflowExecution>>, StatusCode> {
    let status = match params.status.as_deref() {
        None => None,
        Some(s) => Some(parse_status(s).ok_or(StatusCode::BAD_REQUEST)?),
    };
    let filter = ExecutionFilter { workflow_id: params.workflow_id, status, limit: params.limit };
    Ok(Json(state.engine.list_executions(filter)))
}

fn parse_status(s: &str) -> Option<ExecutionStatus> {
    match s {
        "pending" => Some(ExecutionStatus::Pending),
        "running" => Some(ExecutionStatus::Running),
        "paused" => Some(ExecutionStatus::Paused),
        "completed" => Some(ExecutionStatus::Completed),
        "failed" => Some(ExecutionStatus::Failed),
        "cancelled" => Some(ExecutionStatus::Cancelled),
        _ => None,
    }
}

#[derive(serde::Deserialize)]
pub struct ExecutionActionDto {
    pub action: String,
}

/// `POST executions/:id` with `{action: cancel|pause|resume}` (spec §6).
pub async fn action(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<ExecutionActionDto>,
) -> Result<StatusCode, StatusCode> {
    let result = match payload.action.as_str() {
        "cancel" => state.engine.cancel(id).await,
        "pause" => state.engine.pause(id).await,
        "resume" => state.engine.resume(id).await,
        _ => return Err(StatusCode::BAD_REQUEST),
    };

    match result {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(engine::EngineError::ExecutionNotFound(_)) => Err(StatusCode::NOT_FOUND),
        Err(engine::EngineError::InvalidTransition { .. }) => Err(StatusCode::CONFLICT),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}
