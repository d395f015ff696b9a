pub mod actions;
pub mod condition;
pub mod edge;
pub mod step;
pub mod template;
pub mod trigger;
mod workflow;

pub use workflow::Workflow;
