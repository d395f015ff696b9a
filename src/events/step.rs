use std::fmt;

use crate::workflow::step::{ActionId, StepResult};

#[derive(Debug, Clone)]
pub enum StepEvent {
    Running { seq: usize, name: String, timestamp: i64 },
    Succeeded(StepResult),
    Failed(StepResult),
}

impl StepEvent {
    pub fn str(&self) -> &str {
        match self {
            StepEvent::Running { .. } => "StepRunning",
            StepEvent::Succeeded(_) => "StepSucceeded",
            StepEvent::Failed(_) => "StepFailed",
        }
    }

    pub fn result(&self) -> Option<&StepResult> {
        match self {
            StepEvent::Running { .. } => None,
            StepEvent::Succeeded(r) | StepEvent::Failed(r) => Some(r),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ActionEvent {
    Running { action_id: ActionId, attempt: u32 },
    Retry { action_id: ActionId, attempt: u32, reason: ErrorReason, backoff_ms: u64 },
    Succeeded { action_id: ActionId, attempts: u32 },
    Failed { action_id: ActionId, attempts: u32, reason: ErrorReason },
}

impl ActionEvent {
    pub fn str(&self) -> &str {
        match self {
            ActionEvent::Running { .. } => "ActionRunning",
            ActionEvent::Retry { .. } => "ActionRetry",
            ActionEvent::Succeeded { .. } => "ActionSucceeded",
            ActionEvent::Failed { .. } => "ActionFailed",
        }
    }
}

#[derive(Debug, Clone)]
pub enum ErrorReason {
    Timeout,
    Stopped,
    Failed(String),
    Exception(String),
}

impl fmt::Display for ErrorReason {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ErrorReason::Timeout => write!(f, "Timeout"),
            ErrorReason::Stopped => write!(f, "Stopped"),
            ErrorReason::Failed(msg) => write!(f, "Failed: {}", msg),
            ErrorReason::Exception(msg) => write!(f, "Exception: {}", msg),
        }
    }
}
