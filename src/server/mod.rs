//! HTTP surface: translates safety exits and quota decisions into responses.

pub mod logging;
mod monetization;
mod predict;
mod safety;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::monetization::exits::{
    EXIT_HEADER_CAP_EXCEEDED, HDR_CLIENT, HDR_EXIT, HDR_PLAN, HDR_QUOTA_REMAINING,
    HDR_RETRY_AFTER, RETRY_AFTER_SECS,
};
use crate::monetization::{
    ClientKey, Decision, MonetizationMetrics, Plan, QuotaGuard, resolve_identity,
};
use crate::policy::PolicySet;
use crate::safety::SafetyGuard;

pub use monetization::{CapExceededBody, ConfigView, MonetizationStatus, ResetResponse};
pub use predict::{PredictAbRequest, PredictAbResponse};
pub use safety::{GenerateMeta, GenerateRequest, GenerateResponse, SafetyExitBody};

pub const HDR_CLIENT_ID: &str = "x-client-id";
pub const HDR_CLIENT_PLAN: &str = "x-client-plan";
pub const HDR_SAFETY_EXIT: &str = "X-Safety-Exit";

#[derive(Clone)]
pub struct PersonaLabState {
    guard: Arc<QuotaGuard>,
    metrics: Arc<Mutex<MonetizationMetrics>>,
    policies: Arc<PolicySet>,
    safety: Arc<SafetyGuard>,
    admin_token: Option<String>,
}

impl PersonaLabState {
    pub fn new(guard: QuotaGuard) -> Self {
        Self::from_shared(Arc::new(guard))
    }

    pub fn from_shared(guard: Arc<QuotaGuard>) -> Self {
        Self {
            guard,
            metrics: Arc::new(Mutex::new(MonetizationMetrics::default())),
            policies: Arc::new(PolicySet::default()),
            safety: Arc::new(SafetyGuard::default()),
            admin_token: None,
        }
    }

    pub fn with_policies(mut self, policies: PolicySet) -> Self {
        self.policies = Arc::new(policies);
        self
    }

    pub fn with_safety(mut self, safety: SafetyGuard) -> Self {
        self.safety = Arc::new(safety);
        self
    }

    pub fn with_metrics_max_events(mut self, max_events: usize) -> Self {
        self.metrics = Arc::new(Mutex::new(MonetizationMetrics::new(max_events)));
        self
    }

    pub fn with_admin_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.admin_token = (!token.trim().is_empty()).then_some(token);
        self
    }

    pub fn guard(&self) -> &Arc<QuotaGuard> {
        &self.guard
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

pub fn router(state: PersonaLabState) -> Router {
    let mut router = Router::new()
        .route("/predict_ab", post(predict::predict_ab))
        .route("/monetization/status", get(monetization::status))
        .route("/monetization/config", get(monetization::config))
        .route("/monetization/exits", get(monetization::exits))
        .route("/monetization/test", post(monetization::consume_one))
        .route("/monetization/metrics", get(monetization::metrics))
        .route("/generate", post(safety::generate))
        .route("/safety/taxonomy", get(safety::taxonomy))
        .fallback(handle_fallback);

    if let Some(token) = state.admin_token.clone() {
        router = router.route(
            "/admin/monetization/reset",
            post(move |state: State<PersonaLabState>, headers: HeaderMap| {
                monetization::reset(state, headers, token)
            }),
        );
    }

    router.with_state(state)
}

async fn handle_fallback() -> (StatusCode, Json<ErrorResponse>) {
    error_response(StatusCode::NOT_FOUND, "not_found", "route not found")
}

/// Resolved metering identity for one request.
#[derive(Clone, Debug)]
struct Caller {
    client_key: ClientKey,
    plan: Plan,
}

fn resolve_caller(
    state: &PersonaLabState,
    headers: &HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> Caller {
    let explicit_id = extract_header(headers, HDR_CLIENT_ID);
    let peer = connect_info.map(|ConnectInfo(addr)| addr.ip());
    let client_key = resolve_identity(explicit_id.as_deref(), peer);
    let plan = state
        .guard
        .resolve_plan(extract_header(headers, HDR_CLIENT_PLAN).as_deref());
    Caller { client_key, plan }
}

/// Plan and client are always echoed; remaining only for metered finite caps, exit headers only
/// on denial.
fn decision_headers(decision: &Decision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert_header(&mut headers, HDR_PLAN, decision.plan.as_str());
    insert_header(&mut headers, HDR_CLIENT, decision.client_key.as_str());

    if decision.allowed {
        if let (true, Some(remaining)) = (decision.metered, decision.remaining) {
            insert_header(&mut headers, HDR_QUOTA_REMAINING, &remaining.to_string());
        }
    } else {
        insert_header(&mut headers, HDR_EXIT, EXIT_HEADER_CAP_EXCEEDED);
        insert_header(&mut headers, HDR_RETRY_AFTER, &RETRY_AFTER_SECS.to_string());
    }
    headers
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) {
    let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
        return;
    };
    let Ok(value) = HeaderValue::from_str(value) else {
        return;
    };
    headers.insert(name, value);
}

fn extract_header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let auth = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())?
        .trim()
        .to_string();
    let rest = auth
        .strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))?;
    let token = rest.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn ensure_admin(
    expected: &str,
    headers: &HeaderMap,
) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    let provided = extract_header(headers, "x-admin-token").or_else(|| extract_bearer(headers));
    if provided.as_deref() == Some(expected) {
        return Ok(());
    }
    Err(error_response(
        StatusCode::UNAUTHORIZED,
        "unauthorized",
        "missing or invalid admin token",
    ))
}

fn error_response(
    status: StatusCode,
    code: &str,
    message: impl Into<String>,
) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message: message.into(),
            },
        }),
    )
}
