//! Error types for the library service client.
//!
//! # Design
//! Every operation resolves to exactly one `Result<T, ApiError>`. Transport
//! failures and non-200 statuses are mutually exclusive with success, and the
//! poller adds its own terminal outcomes (`EmptyResponse`, `UnknownStatus`,
//! `TaskFailed`, `Cancelled`). Messages are kept as strings so errors stay
//! `Clone` and comparable in tests.

use thiserror::Error;

use crate::types::Task;

/// Errors returned by `LibraryClient` operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// No status line was received: connect, DNS, timeout or body read failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with any status other than 200.
    #[error("server returned HTTP {status}")]
    Server { status: u16 },

    /// A task poll returned a body with neither an `_id` nor a `status`.
    #[error("empty task response")]
    EmptyResponse,

    /// A task poll returned a status the client does not recognise.
    #[error("unknown task status: {0:?}")]
    UnknownStatus(String),

    /// The task reached the server-side `error` state.
    #[error("task {} failed", task_label(.0))]
    TaskFailed(Box<Task>),

    /// The caller cancelled a wait before the task reached a terminal state.
    #[error("task wait cancelled")]
    Cancelled,

    /// The upload file could not be read; no request was sent.
    #[error("cannot read {path}: {message}")]
    File { path: String, message: String },

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("deserialization failed: {0}")]
    Deserialization(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

fn task_label(task: &Task) -> &str {
    task.id.as_deref().unwrap_or("<unknown>")
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ApiError>;
