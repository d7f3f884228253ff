use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    #[error("Agent error: {0}")]
    Agent(#[from] maestro_agent::AgentError),

    #[error("Queue closed for chat {0}")]
    QueueClosed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
