//! Error types for agenda.
//!
//! Nothing in the notification core is fatal: callers log these and carry
//! on. The front end maps them to a non-zero exit code.

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage write failed for key '{key}': {reason}")]
    Storage { key: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Notification dispatch failed: {0}")]
    Dispatch(String),

    #[error("Notification permission not granted")]
    PermissionDenied,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Request limit exceeded, wait a moment and try again")]
    RateLimited,

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Empty response from the assistant")]
    EmptyResponse,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Keyring error: {0}")]
    Keyring(String),
}

pub type Result<T> = std::result::Result<T, Error>;
