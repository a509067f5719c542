//! Error types for the annotation core
//!
//! Every core operation returns these as values. The HTTP layer maps them to
//! status codes; nothing in the core retries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnnotateError {
    /// Malformed or missing required input
    #[error("{0}")]
    Validation(String),

    /// Unknown task or example id
    #[error("{0}")]
    NotFound(String),

    /// Backing store failure, surfaced as-is
    #[error("store error: {0}")]
    Store(String),
}

impl AnnotateError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AnnotateError::Validation(msg.into())
    }

    pub fn task_not_found(task: &str) -> Self {
        AnnotateError::NotFound(format!("task not found: {}", task))
    }

    pub fn example_not_found(task: &str, example_id: &str) -> Self {
        AnnotateError::NotFound(format!("example not found: {}/{}", task, example_id))
    }
}

impl From<rusqlite::Error> for AnnotateError {
    fn from(err: rusqlite::Error) -> Self {
        AnnotateError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for AnnotateError {
    fn from(err: serde_json::Error) -> Self {
        AnnotateError::Store(format!("json: {}", err))
    }
}

impl From<std::io::Error> for AnnotateError {
    fn from(err: std::io::Error) -> Self {
        AnnotateError::Store(format!("io: {}", err))
    }
}

impl From<zip::result::ZipError> for AnnotateError {
    fn from(err: zip::result::ZipError) -> Self {
        AnnotateError::Store(format!("zip: {}", err))
    }
}

/// Result alias for core operations
pub type AnnotateResult<T> = Result<T, AnnotateError>;
