//! Preflight checks that stop a prompt before it is metered or answered.

pub mod config;
pub mod patterns;
pub mod taxonomy;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use config::SafetyConfig;
pub use patterns::{contains_jailbreak, contains_pii};
pub use taxonomy::{TaxonomyEntry, taxonomy};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyExitReason {
    PolicyViolation,
    JailbreakDetected,
    SensitivePii,
    RateLimit,
    TokenBudget,
    CostBudget,
    LatencyBudget,
    KillSwitch,
    MalformedInput,
    PromptTooLong,
    Unspecified,
}

impl SafetyExitReason {
    pub const ALL: [SafetyExitReason; 11] = [
        SafetyExitReason::KillSwitch,
        SafetyExitReason::PromptTooLong,
        SafetyExitReason::PolicyViolation,
        SafetyExitReason::SensitivePii,
        SafetyExitReason::JailbreakDetected,
        SafetyExitReason::LatencyBudget,
        SafetyExitReason::TokenBudget,
        SafetyExitReason::CostBudget,
        SafetyExitReason::RateLimit,
        SafetyExitReason::MalformedInput,
        SafetyExitReason::Unspecified,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SafetyExitReason::PolicyViolation => "policy_violation",
            SafetyExitReason::JailbreakDetected => "jailbreak_detected",
            SafetyExitReason::SensitivePii => "sensitive_pii",
            SafetyExitReason::RateLimit => "rate_limit",
            SafetyExitReason::TokenBudget => "token_budget",
            SafetyExitReason::CostBudget => "cost_budget",
            SafetyExitReason::LatencyBudget => "latency_budget",
            SafetyExitReason::KillSwitch => "kill_switch",
            SafetyExitReason::MalformedInput => "malformed_input",
            SafetyExitReason::PromptTooLong => "prompt_too_long",
            SafetyExitReason::Unspecified => "unspecified",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            SafetyExitReason::KillSwitch | SafetyExitReason::SensitivePii => Severity::High,
            SafetyExitReason::PolicyViolation | SafetyExitReason::JailbreakDetected => {
                Severity::Medium
            }
            _ => Severity::Low,
        }
    }
}

impl fmt::Display for SafetyExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Structured reason a request was stopped, returned to the client as-is.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SafetyExit {
    pub reason: SafetyExitReason,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub details: BTreeMap<String, Value>,
}

impl SafetyExit {
    pub fn new(reason: SafetyExitReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            severity: reason.severity(),
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct SafetyGuard {
    config: SafetyConfig,
}

impl SafetyGuard {
    pub fn new(config: SafetyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    /// Checks run in order: kill switch, empty input, length, denylist, PII, jailbreak cues.
    /// The first hit wins.
    pub fn preflight(&self, prompt: &str) -> Option<SafetyExit> {
        if self.config.kill_switch {
            return Some(
                SafetyExit::new(
                    SafetyExitReason::KillSwitch,
                    "Safety kill switch active; generation disabled.",
                )
                .with_detail("hint", "Unset SAFETY_KILL_SWITCH to re-enable"),
            );
        }

        if prompt.trim().is_empty() {
            return Some(SafetyExit::new(
                SafetyExitReason::MalformedInput,
                "Prompt must not be empty.",
            ));
        }

        let length = prompt.chars().count();
        if length > self.config.max_prompt_chars {
            return Some(
                SafetyExit::new(
                    SafetyExitReason::PromptTooLong,
                    format!(
                        "Prompt exceeds {} characters.",
                        self.config.max_prompt_chars
                    ),
                )
                .with_detail("length", length),
            );
        }

        let content = prompt.to_lowercase();
        if let Some(word) = self
            .config
            .denylist
            .iter()
            .find(|word| content.contains(word.as_str()))
        {
            return Some(
                SafetyExit::new(
                    SafetyExitReason::PolicyViolation,
                    "Prompt triggered denylist keyword.",
                )
                .with_detail("keyword", word.as_str()),
            );
        }

        if let Some(pattern) = contains_pii(prompt) {
            return Some(
                SafetyExit::new(
                    SafetyExitReason::SensitivePii,
                    "Prompt appears to contain sensitive personal data.",
                )
                .with_detail("pattern", pattern),
            );
        }

        if let Some(phrase) = contains_jailbreak(prompt) {
            return Some(
                SafetyExit::new(
                    SafetyExitReason::JailbreakDetected,
                    "Prompt contains a jailbreak cue.",
                )
                .with_detail("phrase", phrase),
            );
        }

        None
    }

    pub fn check_latency(&self, elapsed_ms: u64, budget_ms: u64) -> Option<SafetyExit> {
        (elapsed_ms > budget_ms).then(|| {
            SafetyExit::new(SafetyExitReason::LatencyBudget, "Latency budget exceeded.")
                .with_detail("elapsed_ms", elapsed_ms)
                .with_detail("budget_ms", budget_ms)
        })
    }
}
