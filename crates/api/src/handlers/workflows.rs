use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use engine::WorkflowDefinition;
use serde_json::Value;
use uuid::Uuid;

use crate::AppState;
use db::repository::workflows as wf_repo;

#[derive(serde::Deserialize)]
pub struct CreateWorkflowDto {
    pub name: String,
    pub definition: Value,
}

#[derive(serde::Deserialize)]
pub struct PatchWorkflowDto {
    pub patch: Value,
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<db::models::WorkflowRow>>, StatusCode> {
    match wf_repo::list_workflows(&state.pool).await {
        Ok(workflows) => Ok(Json(workflows)),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<db::models::WorkflowRow>, StatusCode> {
    match wf_repo::get_workflow(&state.pool, id).await {
        Ok(wf) => Ok(Json(wf)),
        Err(db::DbError::NotFound) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Persists the row, then registers the same definition with the live
/// engine — `register` is idempotent and bumps `version` on content change
/// (spec §4.1), so re-creating with the same id is safe.
pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CreateWorkflowDto>,
) -> Result<(StatusCode, Json<db::models::WorkflowRow>), StatusCode> {
    let definition: WorkflowDefinition = serde_json::from_value(payload.definition.clone()).map_err(|_| StatusCode::BAD_REQUEST)?;
    state.engine.register(definition).map_err(|_| StatusCode::BAD_REQUEST)?;

    match wf_repo::create_workflow(&state.pool, &payload.name, payload.definition).await {
        Ok(wf) => Ok((StatusCode::CREATED, Json(wf))),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Applies a shallow JSON-object patch over the persisted definition and
/// re-registers the merged result (spec §6 `PUT workflows/:id`).
pub async fn update(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<PatchWorkflowDto>,
) -> Result<Json<db::models::WorkflowRow>, StatusCode> {
    let existing = match wf_repo::get_workflow(&state.pool, id).await {
        Ok(wf) => wf,
        Err(db::DbError::NotFound) => return Err(StatusCode::NOT_FOUND),
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    let mut merged = existing.definition.clone();
    if let (Some(target), Some(patch)) = (merged.as_object_mut(), payload.patch.as_object()) {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
    }

    let definition: WorkflowDefinition = serde_json::from_value(merged.clone()).map_err(|_| StatusCode::BAD_REQUEST)?;
    state.engine.register(definition).map_err(|_| StatusCode::BAD_REQUEST)?;

    match wf_repo::update_workflow(&state.pool, id, merged).await {
        Ok(wf) => Ok(Json(wf)),
        Err(db::DbError::NotFound) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

pub async fn delete(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, StatusCode> {
    match wf_repo::delete_workflow(&state.pool, id).await {
        Ok(_) => {
            let _ = state.engine.unregister(id);
            Ok(StatusCode::NO_CONTENT)
        }
        Err(db::DbError::NotFound) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}
