//! Error types for the hub.

use crate::types::ClientId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for hub internals.
///
/// Errors that belong to a single task of a sync request are reported as
/// [`TaskError`] inside the response instead.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Event target closed: {0}")]
    TargetClosed(ClientId),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Request canceled")]
    Canceled,

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl From<serde_json::Error> for HubError {
    fn from(e: serde_json::Error) -> Self {
        HubError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for HubError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        HubError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for HubError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        HubError::Deserialization(e.to_string())
    }
}

/// Result type for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;

/// Category of a task-level failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskErrorKind {
    PermissionDenied,
    InvalidTask,
    DatabaseError,
    NotImplemented,
    InternalError,
}

/// Error result of a single task. Sibling tasks are not affected.
#[derive(Clone, Debug, PartialEq, Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct TaskError {
    pub kind: TaskErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: TaskErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::PermissionDenied, message)
    }

    pub fn invalid_task(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::InvalidTask, message)
    }
}
