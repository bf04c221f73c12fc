use serde::{Deserialize, Serialize};

use super::{SafetyExitReason, Severity};

/// Client-facing guidance for one exit reason.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyEntry {
    pub reason: SafetyExitReason,
    pub severity: Severity,
    pub description: String,
    pub client_action: String,
}

fn describe(reason: SafetyExitReason) -> (&'static str, &'static str) {
    match reason {
        SafetyExitReason::KillSwitch => (
            "Operator disabled generation via kill switch.",
            "Show a friendly outage banner; retry later.",
        ),
        SafetyExitReason::PromptTooLong => (
            "Prompt length exceeds configured limit.",
            "Ask user to shorten input; consider chunking.",
        ),
        SafetyExitReason::PolicyViolation => (
            "Denylist/policy phrase detected.",
            "Redact or rephrase; show policy hint.",
        ),
        SafetyExitReason::SensitivePii => (
            "Possible sensitive PII detected (e.g., SSN/credit card).",
            "Block; advise removing PII before retry.",
        ),
        SafetyExitReason::JailbreakDetected => (
            "Prompt-injection/jailbreak cue detected.",
            "Suggest safer phrasing; remove jailbreak cues.",
        ),
        SafetyExitReason::LatencyBudget => (
            "Request exceeded latency budget.",
            "Offer retry or streaming; widen budget if needed.",
        ),
        SafetyExitReason::TokenBudget => (
            "Estimated token budget exceeded.",
            "Shorten input/context or increase budget.",
        ),
        SafetyExitReason::CostBudget => (
            "Estimated cost exceeded configured budget.",
            "Confirm spend or pick a cheaper path.",
        ),
        SafetyExitReason::RateLimit => ("Too many requests.", "Backoff and retry later."),
        SafetyExitReason::MalformedInput => (
            "Input didn't pass validation/hygiene.",
            "Fix input shape/encoding and retry.",
        ),
        SafetyExitReason::Unspecified => (
            "Generic safety exit (unspecified).",
            "Retry or contact support with request ID.",
        ),
    }
}

pub fn taxonomy() -> Vec<TaxonomyEntry> {
    SafetyExitReason::ALL
        .iter()
        .map(|reason| {
            let (description, client_action) = describe(*reason);
            TaxonomyEntry {
                reason: *reason,
                severity: reason.severity(),
                description: description.to_string(),
                client_action: client_action.to_string(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_reason_is_documented_once() {
        let entries = taxonomy();
        assert_eq!(entries.len(), SafetyExitReason::ALL.len());
        for reason in SafetyExitReason::ALL {
            assert_eq!(entries.iter().filter(|e| e.reason == reason).count(), 1);
        }
    }

    #[test]
    fn entries_serialize_with_wire_names() {
        let entry = taxonomy()
            .into_iter()
            .find(|e| e.reason == SafetyExitReason::KillSwitch)
            .unwrap();
        let value = serde_json::to_value(entry).unwrap();
        assert_eq!(value["reason"], "kill_switch");
        assert_eq!(value["severity"], "high");
    }
}
