use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use super::{HDR_SAFETY_EXIT, PersonaLabState, insert_header};
use crate::safety::{SafetyExit, SafetyExitReason, TaxonomyEntry};

const DEFAULT_PERSONA: &str = "default";

/// Body returned when a safety check stops a metered request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SafetyExitBody {
    pub exit: SafetyExit,
    pub output: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub persona: Option<String>,
    pub prompt: String,
    #[serde(default)]
    pub latency_budget_ms: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GenerateMeta {
    pub persona: String,
    pub elapsed_ms: u64,
    pub version: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GenerateResponse {
    pub exit: Option<SafetyExit>,
    pub output: Option<String>,
    pub meta: GenerateMeta,
}

fn exit_status(reason: SafetyExitReason) -> StatusCode {
    match reason {
        SafetyExitReason::KillSwitch => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

pub(super) fn safety_exit_response(exit: SafetyExit) -> Response {
    let mut headers = HeaderMap::new();
    insert_header(&mut headers, HDR_SAFETY_EXIT, exit.reason.as_str());
    (
        exit_status(exit.reason),
        headers,
        Json(SafetyExitBody { exit, output: None }),
    )
        .into_response()
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Unmetered echo generator behind the same preflight as `/predict_ab`. Exits are reported in
/// the body with a 200 status.
pub(super) async fn generate(
    State(state): State<PersonaLabState>,
    Json(request): Json<GenerateRequest>,
) -> Json<GenerateResponse> {
    let started = Instant::now();
    let budget_ms = request
        .latency_budget_ms
        .unwrap_or(state.safety.config().default_latency_budget_ms);
    let persona = request
        .persona
        .as_deref()
        .map(str::trim)
        .filter(|persona| !persona.is_empty())
        .unwrap_or(DEFAULT_PERSONA)
        .to_string();

    let mut exit = state.safety.preflight(&request.prompt);
    let mut output = None;
    if exit.is_none() {
        let text = format!("[persona={persona}] ECHO: {}", request.prompt);
        exit = state.safety.check_latency(elapsed_ms(started), budget_ms);
        if exit.is_none() {
            output = Some(text);
        }
    }

    if let Some(exit) = exit.as_ref() {
        tracing::info!(reason = %exit.reason, persona = %persona, "generate stopped by safety exit");
    }

    Json(GenerateResponse {
        exit,
        output,
        meta: GenerateMeta {
            persona,
            elapsed_ms: elapsed_ms(started),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    })
}

pub(super) async fn taxonomy() -> Json<Vec<TaxonomyEntry>> {
    Json(crate::safety::taxonomy())
}
