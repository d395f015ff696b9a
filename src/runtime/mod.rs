mod channel;
mod context;
mod execution;

pub use channel::{Channel, ChannelEvent, ChannelOptions};
pub use context::Context;
pub use execution::{Execution, ExecutionCommand, ExecutionId, ExecutionStatus};
