use axum::{extract::State, http::StatusCode, Json};

use crate::AppState;

/// `GET status` (spec §6): engine status + metrics + health in one payload.
pub async fn status(State(state): State<AppState>) -> Result<Json<serde_json::Value>, StatusCode> {
    let workflow_count = match db::repository::workflows::list_workflows(&state.pool).await {
        Ok(rows) => rows.len(),
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    let all_executions = state.engine.list_executions(engine::ExecutionFilter::default());
    let active = all_executions.iter().filter(|e| matches!(e.status, engine::ExecutionStatus::Running | engine::ExecutionStatus::Paused)).count();

    let metrics: Vec<_> = state.monitoring.metrics.all_workflow_metrics();
    let active_alerts = state.monitoring.alerts.alerts().into_iter().filter(|a| a.state == monitoring::AlertState::Active).count();

    Ok(Json(serde_json::json!({
        "engine": {
            "registered_workflows": workflow_count,
            "active_executions": active,
            "total_executions": all_executions.len(),
        },
        "metrics": {
            "workflows": metrics,
        },
        "health": {
            "status": "ok",
            "uptime_seconds": (chrono::Utc::now() - state.started_at).num_seconds(),
            "active_alerts": active_alerts,
        },
    })))
}
