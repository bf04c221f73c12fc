use std::net::SocketAddr;

use axum::Json;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::Instrument as _;

use super::monetization::cap_exceeded_response;
use super::safety::safety_exit_response;
use super::{PersonaLabState, decision_headers, error_response, resolve_caller};
use crate::monetization::{Outcome, format_utc};
use crate::policy::{AbGroup, Persona};

fn default_stochastic() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PredictAbRequest {
    pub prompt: String,
    /// Bucketing key; defaults to the metered client id.
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_stochastic")]
    pub stochastic: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PredictAbResponse {
    pub group: AbGroup,
    pub policy: String,
    pub persona: Persona,
    pub output: String,
    pub as_of_utc: String,
}

pub(super) async fn predict_ab(
    State(state): State<PersonaLabState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<PredictAbRequest>,
) -> Response {
    let caller = resolve_caller(&state, &headers, connect_info);
    let span = tracing::info_span!(
        "persona_lab.predict_ab",
        client = %caller.client_key,
        plan = %caller.plan,
        allowed = tracing::field::Empty,
        group = tracing::field::Empty,
        persona = tracing::field::Empty,
    );

    async move {
        if request.prompt.trim().is_empty() {
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                "prompt must not be empty",
            )
            .into_response();
        }

        if let Some(exit) = state.safety.preflight(&request.prompt) {
            tracing::info!(reason = %exit.reason, "request stopped by safety exit");
            return safety_exit_response(exit);
        }

        let now = state.guard.now();
        let decision = state
            .guard
            .check_and_increment(&caller.client_key, caller.plan, now);
        state
            .metrics
            .lock()
            .await
            .record(&decision, Outcome::for_decision(&decision, false), now);
        tracing::Span::current().record("allowed", decision.allowed);

        if !decision.allowed {
            tracing::info!(
                usage_today = decision.usage_today,
                "request denied by daily cap"
            );
            return cap_exceeded_response(&decision);
        }

        let user_id = request
            .user_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(caller.client_key.as_str());
        let (group, blender) = state.policies.assign_ab(user_id);
        let persona = Persona::from_name(blender.choose(request.stochastic).unwrap_or("serious"));
        tracing::Span::current().record("group", tracing::field::debug(group));
        tracing::Span::current().record("persona", tracing::field::display(persona));

        let body = PredictAbResponse {
            group,
            policy: group.policy_name().to_string(),
            persona,
            output: persona.respond(&request.prompt, now),
            as_of_utc: format_utc(now),
        };
        (decision_headers(&decision), Json(body)).into_response()
    }
    .instrument(span)
    .await
}
