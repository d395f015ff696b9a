use crate::common::Vars;

#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    Start,
    Succeeded { data: Vars },
    Failed { error: String, data: Vars },
    Aborted { reason: String, data: Vars },
}

impl WorkflowEvent {
    pub fn str(&self) -> &str {
        match self {
            WorkflowEvent::Start => "Running",
            WorkflowEvent::Succeeded { .. } => "Succeeded",
            WorkflowEvent::Failed { .. } => "Failed",
            WorkflowEvent::Aborted { .. } => "Aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkflowEvent::Start)
    }

    /// Execution data at the time the run ended.
    pub fn data(&self) -> Option<&Vars> {
        match self {
            WorkflowEvent::Start => None,
            WorkflowEvent::Succeeded { data } | WorkflowEvent::Failed { data, .. } | WorkflowEvent::Aborted { data, .. } => Some(data),
        }
    }
}
