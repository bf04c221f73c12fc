use thiserror::Error;

use crate::monetization::ConfigError;
use crate::policy::PolicyError;

#[derive(Debug, Error)]
pub enum PersonaLabError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid policy file: {0}")]
    Policy(#[from] PolicyError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to initialize logging: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, PersonaLabError>;
