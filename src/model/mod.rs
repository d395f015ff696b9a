mod action;
mod step;
mod trigger;
mod workflow;

pub use action::ActionModel;
pub use step::StepModel;
pub use trigger::{ConditionModel, TriggerModel};
pub use workflow::{WorkflowModel, WorkflowStatus};
