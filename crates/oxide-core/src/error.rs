//! Error types for Oxide CI.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Configuration errors
    #[error("Stream not found: {0}")]
    StreamNotFound(String),

    #[error("Template not found: {template} in stream {stream}")]
    TemplateNotFound { stream: String, template: String },

    #[error("Invalid schedule pattern '{pattern}': {message}")]
    InvalidSchedulePattern { pattern: String, message: String },

    #[error("Invalid filter expression: {0}")]
    InvalidFilter(String),

    // Schedule errors
    #[error("Schedule not found: {stream}/{template}")]
    ScheduleNotFound { stream: String, template: String },

    // Job errors
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Step '{step}' not found in job {job}")]
    StepNotFound { job: String, step: String },

    // Bisection errors
    #[error("Bisect task not found: {0}")]
    BisectTaskNotFound(String),

    #[error("Update conflict on {entity} after {attempts} attempts")]
    UpdateConflict { entity: String, attempts: u32 },

    // Commit history errors
    #[error("Commit not found: {0}")]
    CommitNotFound(String),

    // Infrastructure errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("Lease error: {0}")]
    Lease(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::InvalidFilter(err.to_string())
    }
}
