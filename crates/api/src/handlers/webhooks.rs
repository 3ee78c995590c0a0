use std::collections::BTreeMap;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use uuid::Uuid;

use crate::AppState;
use triggers::{InboundRequest, WebhookRejection};

/// `POST /webhook/:endpoint_id` — delegates straight into
/// `WebhookService::handle_request`, which owns the full six-step pipeline
/// (spec.md §4.3); this handler only adapts the HTTP framing.
pub async fn handle_webhook(
    Path(endpoint_id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), StatusCode> {
    let header_map: BTreeMap<String, String> = headers
        .iter()
        .map(|(name, value)| (name.as_str().to_owned(), value.to_str().unwrap_or_default().to_owned()))
        .collect();

    let parsed_body = if body.is_empty() {
        serde_json::Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(v) => v,
            Err(_) => return Err(StatusCode::from_u16(WebhookRejection::InvalidPayload.status_code()).unwrap()),
        }
    };

    let request = InboundRequest {
        method: "POST".to_owned(),
        headers: header_map,
        query,
        body: parsed_body,
        raw_body: body.to_vec(),
    };

    match state.webhooks.handle_request(endpoint_id, request).await {
        Ok(summary) => Ok((StatusCode::from_u16(summary.status_code).unwrap_or(StatusCode::OK), Json(serde_json::to_value(summary).unwrap()))),
        Err(rejection) => Err(StatusCode::from_u16(rejection.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)),
    }
}
