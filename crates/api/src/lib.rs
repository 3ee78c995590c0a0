//! `api` crate — HTTP REST API layer, implementing the management-API
//! operation table (spec.md §6) over `WorkflowEngine` and the persisted
//! workflow registry in `db`.
//!
//! Exposes:
//!   POST   /api/v1/workflows
//!   PUT    /api/v1/workflows/:id
//!   DELETE /api/v1/workflows/:id
//!   GET    /api/v1/workflows
//!   GET    /api/v1/workflows/:id
//!   POST   /api/v1/workflows/:id/execute
//!   GET    /api/v1/executions
//!   GET    /api/v1/executions/:id
//!   POST   /api/v1/executions/:id       (action=cancel|pause|resume)
//!   GET    /api/v1/status
//!   POST   /webhook/:endpoint_id

pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use db::DbPool;
use engine::WorkflowEngine;
use monitoring::MonitoringService;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use triggers::WebhookService;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub engine: WorkflowEngine,
    pub webhooks: Arc<WebhookService>,
    pub monitoring: Arc<MonitoringService>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    #[must_use]
    pub fn new(pool: DbPool, engine: WorkflowEngine, webhooks: Arc<WebhookService>, monitoring: Arc<MonitoringService>) -> Self {
        Self { pool, engine, webhooks, monitoring, started_at: Utc::now() }
    }
}

pub async fn serve(bind: &str, state: AppState) -> Result<(), std::io::Error> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_router = Router::new()
        .route("/workflows", get(handlers::workflows::list).post(handlers::workflows::create))
        .route(
            "/workflows/:id",
            get(handlers::workflows::get).put(handlers::workflows::update).delete(handlers::workflows::delete),
        )
        .route("/workflows/:id/execute", post(handlers::executions::execute))
        .route("/executions", get(handlers::executions::list))
        .route("/executions/:id", get(handlers::executions::get).post(handlers::executions::action))
        .route("/status", get(handlers::status::status));

    let app = Router::new()
        .nest("/api/v1", api_router)
        .route("/webhook/:endpoint_id", post(handlers::webhooks::handle_webhook))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await
}
