use serde::{Deserialize, Serialize};

use crate::monetization::ConfigError;
use crate::monetization::config::{non_blank, parse_cap, parse_flag};

pub const ENV_KILL_SWITCH: &str = "SAFETY_KILL_SWITCH";
pub const ENV_MAX_PROMPT_CHARS: &str = "SAFETY_MAX_PROMPT_CHARS";
pub const ENV_DENYLIST: &str = "SAFETY_DENYLIST";
pub const ENV_DEFAULT_LATENCY_BUDGET_MS: &str = "SAFETY_DEFAULT_LATENCY_BUDGET_MS";

pub const DEFAULT_MAX_PROMPT_CHARS: usize = 4000;
pub const DEFAULT_LATENCY_BUDGET_MS: u64 = 3500;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default)]
    pub kill_switch: bool,
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
    /// Lowercased keywords; a prompt containing any of them is rejected.
    #[serde(default)]
    pub denylist: Vec<String>,
    #[serde(default = "default_latency_budget_ms")]
    pub default_latency_budget_ms: u64,
}

fn default_max_prompt_chars() -> usize {
    DEFAULT_MAX_PROMPT_CHARS
}

fn default_latency_budget_ms() -> u64 {
    DEFAULT_LATENCY_BUDGET_MS
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            kill_switch: false,
            max_prompt_chars: DEFAULT_MAX_PROMPT_CHARS,
            denylist: Vec::new(),
            default_latency_budget_ms: DEFAULT_LATENCY_BUDGET_MS,
        }
    }
}

impl SafetyConfig {
    pub fn with_kill_switch(mut self, on: bool) -> Self {
        self.kill_switch = on;
        self
    }

    pub fn with_max_prompt_chars(mut self, max_prompt_chars: usize) -> Self {
        self.max_prompt_chars = max_prompt_chars;
        self
    }

    pub fn with_denylist<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.denylist = words
            .into_iter()
            .map(|word| word.as_ref().trim().to_lowercase())
            .filter(|word| !word.is_empty())
            .collect();
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = non_blank(lookup(ENV_KILL_SWITCH)) {
            config.kill_switch = parse_flag(ENV_KILL_SWITCH, &raw)?;
        }
        if let Some(raw) = non_blank(lookup(ENV_MAX_PROMPT_CHARS)) {
            let max = parse_cap(ENV_MAX_PROMPT_CHARS, &raw)?;
            config.max_prompt_chars =
                usize::try_from(max).map_err(|_| ConfigError::InvalidCap {
                    name: ENV_MAX_PROMPT_CHARS,
                    value: raw.clone(),
                })?;
        }
        if let Some(raw) = non_blank(lookup(ENV_DENYLIST)) {
            config = config.with_denylist(raw.split(','));
        }
        if let Some(raw) = non_blank(lookup(ENV_DEFAULT_LATENCY_BUDGET_MS)) {
            config.default_latency_budget_ms = parse_cap(ENV_DEFAULT_LATENCY_BUDGET_MS, &raw)?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(
            SafetyConfig::from_lookup(lookup(&[])).unwrap(),
            SafetyConfig::default()
        );
    }

    #[test]
    fn parses_all_variables() {
        let config = SafetyConfig::from_lookup(lookup(&[
            (ENV_KILL_SWITCH, "on"),
            (ENV_MAX_PROMPT_CHARS, "120"),
            (ENV_DENYLIST, " Secret_Key, ,credit card "),
            (ENV_DEFAULT_LATENCY_BUDGET_MS, "900"),
        ]))
        .unwrap();
        assert!(config.kill_switch);
        assert_eq!(config.max_prompt_chars, 120);
        assert_eq!(config.denylist, vec!["secret_key", "credit card"]);
        assert_eq!(config.default_latency_budget_ms, 900);
    }

    #[test]
    fn rejects_bad_values() {
        assert_eq!(
            SafetyConfig::from_lookup(lookup(&[(ENV_MAX_PROMPT_CHARS, "lots")])),
            Err(ConfigError::InvalidCap {
                name: ENV_MAX_PROMPT_CHARS,
                value: "lots".to_string(),
            })
        );
        assert!(matches!(
            SafetyConfig::from_lookup(lookup(&[(ENV_KILL_SWITCH, "maybe")])),
            Err(ConfigError::InvalidFlag { .. })
        ));
    }
}
