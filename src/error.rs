use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetrierError {
    #[error("GitLab API request failed (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Pipeline {0} not found")]
    PipelineNotFound(u64),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidSchedule { expression: String, reason: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, RetrierError>;
