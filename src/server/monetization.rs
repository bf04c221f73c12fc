use std::net::SocketAddr;

use axum::Json;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use super::{PersonaLabState, decision_headers, ensure_admin, resolve_caller};
use crate::monetization::exits::{EXIT_CAP_EXCEEDED, MonetizationExitsDoc, exits_doc};
use crate::monetization::{Decision, MetricsSnapshot, Outcome, Plan, format_utc};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonetizationStatus {
    pub client_id: String,
    pub plan: Plan,
    pub usage_today: u64,
    pub daily_cap: Option<u64>,
    pub remaining_today: Option<u64>,
    pub as_of_utc: String,
}

impl MonetizationStatus {
    fn from_decision(decision: &Decision, as_of: time::OffsetDateTime) -> Self {
        Self {
            client_id: decision.client_key.to_string(),
            plan: decision.plan,
            usage_today: decision.usage_today,
            daily_cap: decision.daily_cap.limit(),
            remaining_today: decision.remaining,
            as_of_utc: format_utc(as_of),
        }
    }
}

/// 429 payload for a request denied by the daily cap.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapExceededBody {
    pub code: String,
    pub message: String,
    pub plan: Plan,
    pub usage_today: u64,
    pub daily_cap: Option<u64>,
    pub retry_at_utc: Option<String>,
}

impl CapExceededBody {
    pub(super) fn from_decision(decision: &Decision) -> Self {
        Self {
            code: EXIT_CAP_EXCEEDED.to_string(),
            message: "Daily request cap reached for your plan.".to_string(),
            plan: decision.plan,
            usage_today: decision.usage_today,
            daily_cap: decision.daily_cap.limit(),
            retry_at_utc: decision.retry_at_utc.map(format_utc),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigView {
    pub enabled: bool,
    pub free_tier_daily_requests: u64,
    pub allow_header_plans: bool,
    pub notes: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResetResponse {
    pub reset: bool,
    pub as_of_utc: String,
}

/// Translates a denied decision into the 429 contract.
pub(super) fn cap_exceeded_response(decision: &Decision) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        decision_headers(decision),
        Json(CapExceededBody::from_decision(decision)),
    )
        .into_response()
}

pub(super) async fn status(
    State(state): State<PersonaLabState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Json<MonetizationStatus> {
    let caller = resolve_caller(&state, &headers, connect_info);
    let now = state.guard.now();
    let decision = state.guard.status(&caller.client_key, caller.plan, now);
    Json(MonetizationStatus::from_decision(&decision, now))
}

pub(super) async fn config(State(state): State<PersonaLabState>) -> Json<ConfigView> {
    let config = state.guard.config();
    Json(ConfigView {
        enabled: config.enabled,
        free_tier_daily_requests: config.free_tier_daily_requests,
        allow_header_plans: config.allow_header_plans,
        notes: "Header-based plans are for local experiments. Usage is in-memory only.".to_string(),
    })
}

pub(super) async fn exits() -> Json<MonetizationExitsDoc> {
    Json(exits_doc())
}

/// Consumes one unit like a real request, but always answers 200 with the resulting status.
pub(super) async fn consume_one(
    State(state): State<PersonaLabState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let caller = resolve_caller(&state, &headers, connect_info);
    let now = state.guard.now();
    let decision = state
        .guard
        .check_and_increment(&caller.client_key, caller.plan, now);

    state
        .metrics
        .lock()
        .await
        .record(&decision, Outcome::for_decision(&decision, true), now);

    tracing::debug!(
        client = %decision.client_key,
        plan = %decision.plan,
        allowed = decision.allowed,
        usage_today = decision.usage_today,
        "monetization test request"
    );

    (
        decision_headers(&decision),
        Json(MonetizationStatus::from_decision(&decision, now)),
    )
        .into_response()
}

pub(super) async fn metrics(State(state): State<PersonaLabState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.lock().await.snapshot())
}

pub(super) async fn reset(
    State(state): State<PersonaLabState>,
    headers: HeaderMap,
    token: String,
) -> Response {
    if let Err(err) = ensure_admin(&token, &headers) {
        return err.into_response();
    }
    state.guard.reset_all();
    tracing::info!("monetization usage reset by admin");
    Json(ResetResponse {
        reset: true,
        as_of_utc: format_utc(state.guard.now()),
    })
    .into_response()
}
