mod event;
mod execution;
mod log;
mod record;
mod step;
mod workflow;

pub use event::Event;
pub use execution::Execution;
pub use log::Log;
pub use record::Record;
pub use step::Step;
pub use workflow::Workflow;
