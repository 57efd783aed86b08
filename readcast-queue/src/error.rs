//! Error types for the task queue and its collaborators

use thiserror::Error;

use readcast_cast::CastError;

/// Failures of the external services a task depends on
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Unsupported content type '{0}'")]
    Unsupported(String),

    #[error("No readable text extracted from {0}")]
    EmptyArticle(String),

    #[error("LLM returned an empty response")]
    EmptyResponse,
}

/// Errors raised by queue storage and task handling
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Timed out waiting for lock {0}")]
    LockTimeout(String),

    #[error("Feed error: {0}")]
    Feed(String),

    #[error(transparent)]
    Cast(#[from] CastError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

pub type QueueResult<T> = Result<T, QueueError>;
