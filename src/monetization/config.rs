use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_ENABLED: &str = "MONETIZATION_ENABLED";
pub const ENV_FREE_TIER_DAILY_REQUESTS: &str = "FREE_TIER_DAILY_REQUESTS";
pub const ENV_ALLOW_HEADER_PLANS: &str = "ALLOW_HEADER_PLANS";

pub const DEFAULT_FREE_TIER_DAILY_REQUESTS: u64 = 50;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonetizationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_free_tier_daily_requests")]
    pub free_tier_daily_requests: u64,
    #[serde(default)]
    pub allow_header_plans: bool,
}

fn default_free_tier_daily_requests() -> u64 {
    DEFAULT_FREE_TIER_DAILY_REQUESTS
}

impl Default for MonetizationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            free_tier_daily_requests: DEFAULT_FREE_TIER_DAILY_REQUESTS,
            allow_header_plans: false,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {name}: expected a positive integer, got {value:?}")]
    InvalidCap { name: &'static str, value: String },
    #[error("invalid {name}: expected a boolean flag (1/0, true/false, yes/no, on/off), got {value:?}")]
    InvalidFlag { name: &'static str, value: String },
}

impl MonetizationConfig {
    /// Metering enabled with the given FREE cap; header plans stay off.
    pub fn enabled_with_cap(free_tier_daily_requests: u64) -> Self {
        Self {
            enabled: true,
            free_tier_daily_requests,
            allow_header_plans: false,
        }
    }

    pub fn with_header_plans(mut self, allow: bool) -> Self {
        self.allow_header_plans = allow;
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Parses the three monetization variables through `lookup`. Missing or blank values
    /// keep their defaults; anything unparseable is rejected.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = non_blank(lookup(ENV_ENABLED)) {
            config.enabled = parse_flag(ENV_ENABLED, &raw)?;
        }
        if let Some(raw) = non_blank(lookup(ENV_FREE_TIER_DAILY_REQUESTS)) {
            config.free_tier_daily_requests = parse_cap(ENV_FREE_TIER_DAILY_REQUESTS, &raw)?;
        }
        if let Some(raw) = non_blank(lookup(ENV_ALLOW_HEADER_PLANS)) {
            config.allow_header_plans = parse_flag(ENV_ALLOW_HEADER_PLANS, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.free_tier_daily_requests == 0 {
            return Err(ConfigError::InvalidCap {
                name: ENV_FREE_TIER_DAILY_REQUESTS,
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(crate) fn parse_flag(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            name,
            value: raw.to_string(),
        }),
    }
}

pub(crate) fn parse_cap(name: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match raw.parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::InvalidCap {
            name,
            value: raw.to_string(),
        }),
    }
}
