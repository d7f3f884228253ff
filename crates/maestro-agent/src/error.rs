use thiserror::Error;

use crate::provider::ProviderError;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("No model provider configured for {role}")]
    NoProvider { role: String },

    #[error("Unknown worker type: {0}")]
    UnknownWorkerType(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
