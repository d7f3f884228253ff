use thiserror::Error;

#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("Automation limit reached ({max} per chat)")]
    LimitReached { max: usize },

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(#[from] maestro_scheduler::SchedulerError),

    #[error("Automation not found: {id}")]
    NotFound { id: String },

    #[error("{0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, AutomationError>;
