//! Event types for workflow execution.
//!
//! Events are emitted during an execution to notify subscribers about state
//! changes, completions, errors and logs. The monitor persists them.

mod step;
mod workflow;

pub use step::*;
pub use workflow::*;

use crate::{
    runtime::ExecutionId,
    workflow::step::{ActionId, StepId},
};

/// Generic event wrapper.
#[derive(Debug, Clone)]
pub struct Event<T> {
    inner: T,
}

/// Top-level event type for execution events.
#[derive(Debug, Clone)]
pub enum GraphEvent {
    /// Execution-level events (start, succeeded, failed, aborted).
    Workflow(WorkflowEvent),
    /// A step started or finished.
    Step(StepEvent),
    /// A single action attempt started, is retried or finished.
    Action(ActionEvent),
}

/// Event message with its execution context.
#[derive(Debug, Clone)]
pub struct Message {
    pub eid: ExecutionId,
    pub wid: String,
    /// step id, empty for workflow events
    pub sid: StepId,
    pub event: GraphEvent,
}

/// Log line emitted by an action.
#[derive(Debug, Clone)]
pub struct Log {
    pub eid: ExecutionId,
    pub aid: ActionId,
    pub content: String,
    /// milliseconds
    pub timestamp: i64,
}

impl<T> std::ops::Deref for Event<T>
where
    T: std::fmt::Debug + Clone,
{
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> Event<T>
where
    T: std::fmt::Debug + Clone,
{
    pub fn new(inner: &T) -> Self {
        Self {
            inner: inner.clone(),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl GraphEvent {
    pub fn name(&self) -> &str {
        match self {
            GraphEvent::Workflow(e) => e.str(),
            GraphEvent::Step(e) => e.str(),
            GraphEvent::Action(e) => e.str(),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, GraphEvent::Workflow(WorkflowEvent::Succeeded { .. }))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, GraphEvent::Workflow(WorkflowEvent::Failed { .. }))
    }

    /// Succeeded, failed or aborted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, GraphEvent::Workflow(e) if e.is_terminal())
    }
}
