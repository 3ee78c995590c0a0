//! HTTP ingress contract for inbound webhooks (spec.md §4.3). `handle_request`
//! implements the six-step pipeline verbatim; the HTTP framework (`api`
//! crate) is responsible only for extracting headers/body/query and mapping
//! the returned status code onto an actual response.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use engine::{TriggerType, WorkflowEngine};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{TriggerError, WebhookRejection};
use crate::models::{
    AuthConfig, DataMapping, RateLimitConfig, SignatureAlgorithm, TriggerDispatchOutcome, WebhookBinding,
    WebhookDispatchSummary, WebhookEndpoint, WebhookPayload,
};

type HmacSha256 = Hmac<Sha256>;

pub struct WebhookServiceConfig {
    pub payload_history_capacity: usize,
}

impl Default for WebhookServiceConfig {
    fn default() -> Self {
        Self { payload_history_capacity: 10_000 }
    }
}

struct RateWindow {
    window_start: std::time::Instant,
    count: u32,
}

pub struct WebhookService {
    engine: Arc<WorkflowEngine>,
    endpoints: DashMap<Uuid, WebhookEndpoint>,
    bindings: DashMap<Uuid, Vec<WebhookBinding>>,
    rate_windows: DashMap<Uuid, RateWindow>,
    payloads: std::sync::Mutex<VecDeque<WebhookPayload>>,
    config: WebhookServiceConfig,
}

/// The raw shape of an inbound HTTP request, independent of the web
/// framework used to receive it.
pub struct InboundRequest {
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub body: Value,
    pub raw_body: Vec<u8>,
}

impl WebhookService {
    #[must_use]
    pub fn new(engine: Arc<WorkflowEngine>, config: WebhookServiceConfig) -> Self {
        Self {
            engine,
            endpoints: DashMap::new(),
            bindings: DashMap::new(),
            rate_windows: DashMap::new(),
            payloads: std::sync::Mutex::new(VecDeque::new()),
            config,
        }
    }

    pub fn register_endpoint(&self, path: &str, method: &str, auth: AuthConfig, rate_limit: RateLimitConfig) -> Uuid {
        let endpoint = WebhookEndpoint {
            id: Uuid::new_v4(),
            path: path.to_owned(),
            method: method.to_uppercase(),
            active: true,
            auth,
            rate_limit,
            created_at: Utc::now(),
        };
        let id = endpoint.id;
        self.endpoints.insert(id, endpoint);
        id
    }

    pub fn bind_trigger(&self, endpoint_id: Uuid, binding: WebhookBinding) -> Result<(), TriggerError> {
        if !self.endpoints.contains_key(&endpoint_id) {
            return Err(TriggerError::EndpointNotFound(endpoint_id));
        }
        self.bindings.entry(endpoint_id).or_default().push(binding);
        Ok(())
    }

    pub fn set_endpoint_active(&self, endpoint_id: Uuid, active: bool) -> Result<(), TriggerError> {
        let mut endpoint = self.endpoints.get_mut(&endpoint_id).ok_or(TriggerError::EndpointNotFound(endpoint_id))?;
        endpoint.active = active;
        Ok(())
    }

    #[must_use]
    pub fn find_endpoint_by_path(&self, path: &str) -> Option<WebhookEndpoint> {
        self.endpoints.iter().find(|e| e.path == path).map(|e| e.value().clone())
    }

    #[must_use]
    pub fn payload_history(&self) -> Vec<WebhookPayload> {
        self.payloads.lock().unwrap().iter().cloned().collect()
    }

    /// Step 2: fixed-window counter per endpoint.
    fn check_rate_limit(&self, endpoint_id: Uuid, limit: &RateLimitConfig) -> bool {
        let now = std::time::Instant::now();
        let mut window = self.rate_windows.entry(endpoint_id).or_insert_with(|| RateWindow { window_start: now, count: 0 });
        if now.duration_since(window.window_start).as_secs() >= limit.window_secs {
            window.window_start = now;
            window.count = 0;
        }
        if window.count >= limit.max_requests {
            return false;
        }
        window.count += 1;
        true
    }

    /// Step 3: authentication.
    fn authenticate(&self, endpoint: &WebhookEndpoint, request: &InboundRequest) -> bool {
        match &endpoint.auth {
            AuthConfig::None => true,
            AuthConfig::Bearer { token } => request
                .headers
                .get("authorization")
                .and_then(|h| h.strip_prefix("Bearer "))
                .is_some_and(|t| t == token),
            AuthConfig::Basic { username, password } => {
                let Some(header) = request.headers.get("authorization").and_then(|h| h.strip_prefix("Basic ")) else {
                    return false;
                };
                use base64::Engine as _;
                let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(header) else {
                    return false;
                };
                let Ok(decoded) = String::from_utf8(decoded) else { return false };
                decoded == format!("{username}:{password}")
            }
            AuthConfig::ApiKey { header, key } => request.headers.get(&header.to_lowercase()).is_some_and(|v| v == key),
            AuthConfig::Signature { secret, algorithm, header } => {
                let SignatureAlgorithm::Sha256 = algorithm;
                let Some(provided) = request.headers.get(&header.to_lowercase()) else { return false };
                let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else { return false };
                mac.update(&request.raw_body);
                // spec.md §6: `${algorithm}=${base64(HMAC(secret, body))}`.
                use base64::Engine as _;
                let computed = format!("sha256={}", base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()));
                provided == &computed
            }
        }
    }

    fn project(mapping: &DataMapping, request: &InboundRequest) -> Value {
        let raw = if let Some(rest) = mapping.source.strip_prefix("headers.") {
            request.headers.get(rest).cloned().map(Value::String)
        } else if let Some(rest) = mapping.source.strip_prefix("query.") {
            request.query.get(rest).cloned().map(Value::String)
        } else if let Some(rest) = mapping.source.strip_prefix("body.") {
            resolve_path(&request.body, rest).cloned()
        } else {
            resolve_path(&request.body, &mapping.source).cloned()
        };

        let resolved = raw.unwrap_or_else(|| mapping.default_value.clone().unwrap_or(Value::Null));
        mapping.transform.map(|t| t.apply(&resolved)).unwrap_or(resolved)
    }

    /// Runs the full inbound webhook pipeline (spec.md §4.3 steps 1–6).
    pub async fn handle_request(&self, endpoint_id: Uuid, request: InboundRequest) -> Result<WebhookDispatchSummary, WebhookRejection> {
        let endpoint = self.endpoints.get(&endpoint_id).ok_or(WebhookRejection::EndpointNotFound)?.clone();

        if !endpoint.active {
            return Err(WebhookRejection::EndpointInactive);
        }
        if endpoint.method != request.method.to_uppercase() {
            return Err(WebhookRejection::MethodMismatch);
        }
        if !self.check_rate_limit(endpoint_id, &endpoint.rate_limit) {
            return Err(WebhookRejection::RateLimited);
        }
        if !self.authenticate(&endpoint, &request) {
            return Err(WebhookRejection::Unauthorized);
        }

        let payload = WebhookPayload {
            id: Uuid::new_v4(),
            endpoint_id,
            headers: request.headers.clone(),
            body: request.body.clone(),
            query: request.query.clone(),
            received_at: Utc::now(),
        };
        {
            let mut history = self.payloads.lock().unwrap();
            if history.len() >= self.config.payload_history_capacity {
                history.pop_front();
            }
            history.push_back(payload.clone());
        }

        let bindings = self.bindings.get(&endpoint_id).map(|b| b.value().clone()).unwrap_or_default();
        let mut outcomes = Vec::with_capacity(bindings.len());

        for binding in &bindings {
            let all_required_pass = binding.conditions.iter().filter(|c| c.required).all(|c| {
                let actual = resolve_path(&request.body, &c.field);
                nodes::condition::eval_operator(c.operator, actual, c.value.as_ref()).unwrap_or(false)
            });

            if !all_required_pass {
                outcomes.push(TriggerDispatchOutcome { trigger_id: binding.trigger_id, filtered_out: true, succeeded: false, error: None });
                continue;
            }

            let mut input = serde_json::Map::new();
            for mapping in &binding.data_mapping {
                input.insert(mapping.target.clone(), Self::project(mapping, &request));
            }

            match self.engine.execute(binding.trigger_id, Value::Object(input), TriggerType::Webhook).await {
                Ok(execution) => {
                    info!(trigger_id = %binding.trigger_id, execution_id = %execution.id, "webhook trigger fired");
                    outcomes.push(TriggerDispatchOutcome { trigger_id: binding.trigger_id, filtered_out: false, succeeded: true, error: None });
                }
                Err(err) => {
                    error!(trigger_id = %binding.trigger_id, error = %err, "webhook trigger failed");
                    outcomes.push(TriggerDispatchOutcome { trigger_id: binding.trigger_id, filtered_out: false, succeeded: false, error: Some(err.to_string()) });
                }
            }
        }

        let fired: Vec<&TriggerDispatchOutcome> = outcomes.iter().filter(|o| !o.filtered_out).collect();
        let status_code = if fired.is_empty() {
            200
        } else if fired.iter().all(|o| o.succeeded) {
            200
        } else if fired.iter().all(|o| !o.succeeded) {
            500
        } else {
            207
        };

        Ok(WebhookDispatchSummary { status_code, per_trigger: outcomes })
    }
}

fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(arr) => arr.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
