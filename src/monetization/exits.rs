use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const EXIT_CAP_EXCEEDED: &str = "MONETIZATION_CAP_EXCEEDED";
pub const EXIT_HEADER_CAP_EXCEEDED: &str = "CAP_EXCEEDED";

pub const HDR_EXIT: &str = "X-Monetization-Exit";
pub const HDR_CLIENT: &str = "X-Monetization-Client";
pub const HDR_PLAN: &str = "X-Monetization-Plan";
pub const HDR_RETRY_AFTER: &str = "Retry-After";
pub const HDR_QUOTA_REMAINING: &str = "X-Quota-Remaining";

/// Advisory; the real reset for FREE is the next UTC midnight.
pub const RETRY_AFTER_SECS: u64 = 60;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonetizationExit {
    pub code: String,
    pub http_status: u16,
    pub summary: String,
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_hint_utc: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonetizationExitsDoc {
    pub exits: Vec<MonetizationExit>,
    pub header_contract: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

pub fn exits_doc() -> MonetizationExitsDoc {
    let headers = [
        (HDR_EXIT, "Machine-readable exit reason"),
        (HDR_CLIENT, "Resolved client id used for metering"),
        (HDR_PLAN, "Resolved plan (FREE|PREMIUM|INTERNAL)"),
        (HDR_RETRY_AFTER, "Seconds until a generic retry is advisable"),
    ];
    let header_contract = [
        (HDR_EXIT, "Stable exits like CAP_EXCEEDED"),
        (HDR_CLIENT, "Echo of the metered client id"),
        (HDR_PLAN, "Resolved plan at time of decision"),
        (
            HDR_RETRY_AFTER,
            "Advisory seconds; true reset is next UTC midnight for FREE",
        ),
        (
            HDR_QUOTA_REMAINING,
            "Requests left today on allowed responses (finite caps only)",
        ),
    ];

    MonetizationExitsDoc {
        exits: vec![MonetizationExit {
            code: EXIT_CAP_EXCEEDED.to_string(),
            http_status: 429,
            summary: "Daily request cap reached for your plan.".to_string(),
            headers: to_map(&headers),
            retry_hint_utc: None,
        }],
        header_contract: to_map(&header_contract),
        notes: Some(
            "Header-selected plans are for experiments only; usage is kept in process memory."
                .to_string(),
        ),
    }
}

fn to_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(name, meaning)| (name.to_string(), meaning.to_string()))
        .collect()
}
