//! Error types for Autoflow.
//!
//! All errors in Autoflow are represented by the `AutoflowError` enum,
//! which provides specific variants for different error categories.
//! A failing action is not an engine error: it is recorded as a failed
//! attempt on the step result instead.

use std::{io::ErrorKind, string::FromUtf8Error};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all Autoflow operations.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum AutoflowError {
    /// Engine-level errors (startup, shutdown, not running).
    #[error("{0}")]
    Engine(String),

    /// Configuration parsing or validation errors.
    #[error("{0}")]
    Config(String),

    /// Data conversion errors (JSON, TOML).
    #[error("{0}")]
    Convert(String),

    /// Script execution errors.
    #[error("{0}")]
    Script(String),

    /// Structured exception with error code.
    #[error("ecode: {ecode}, message: {message}")]
    Exception {
        ecode: String,
        message: String,
    },

    /// Runtime execution errors.
    #[error("{0}")]
    Runtime(String),

    /// Storage operation errors.
    #[error("{0}")]
    Store(String),

    /// A stored record does not exist.
    #[error("record {0} not found")]
    NotFound(String),

    /// The workflow is unknown or not active.
    #[error("workflow {0} not found or not active")]
    WorkflowNotFound(String),

    /// The execution is unknown or no longer running.
    #[error("execution {0} not found")]
    ExecutionNotFound(String),

    /// Execution lifecycle errors.
    #[error("{0}")]
    Execution(String),

    /// Workflow definition errors.
    #[error("{0}")]
    Workflow(String),

    /// Trigger definition errors (bad cron expression, unknown type).
    #[error("{0}")]
    Trigger(String),

    /// Step definition errors.
    #[error("{0}")]
    Step(String),

    /// Action definition or execution errors.
    #[error("{0}")]
    Action(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),

    /// Message queue errors.
    #[error("{0}")]
    Queue(String),
}

impl From<AutoflowError> for String {
    fn from(val: AutoflowError) -> Self {
        val.to_string()
    }
}

impl From<std::io::Error> for AutoflowError {
    fn from(error: std::io::Error) -> Self {
        AutoflowError::IoError(error.to_string())
    }
}

impl From<AutoflowError> for std::io::Error {
    fn from(val: AutoflowError) -> Self {
        #[allow(clippy::io_other_error)]
        std::io::Error::new(ErrorKind::Other, val.to_string())
    }
}

impl From<FromUtf8Error> for AutoflowError {
    fn from(_: FromUtf8Error) -> Self {
        AutoflowError::Runtime("Error with utf-8 string convert".to_string())
    }
}

impl From<serde_json::Error> for AutoflowError {
    fn from(error: serde_json::Error) -> Self {
        AutoflowError::Convert(error.to_string())
    }
}

impl From<toml::de::Error> for AutoflowError {
    fn from(error: toml::de::Error) -> Self {
        AutoflowError::Config(error.to_string())
    }
}

impl From<jsonschema::ValidationError<'_>> for AutoflowError {
    fn from(error: jsonschema::ValidationError<'_>) -> Self {
        AutoflowError::Action(error.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::AutoflowError;

    #[test]
    fn test_not_found_messages() {
        assert_eq!(AutoflowError::WorkflowNotFound("wf1".into()).to_string(), "workflow wf1 not found or not active");
        assert_eq!(AutoflowError::ExecutionNotFound("e1".into()).to_string(), "execution e1 not found");
    }

    #[test]
    fn test_io_round_trip_keeps_message() {
        let io: std::io::Error = AutoflowError::Store("disk full".into()).into();
        assert_eq!(io.to_string(), "disk full");
        let back: AutoflowError = io.into();
        assert_eq!(back, AutoflowError::IoError("disk full".into()));
    }
}
