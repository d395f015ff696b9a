//! Walks an execution through its step chain.

mod dispatcher;
mod retry;

pub use dispatcher::Dispatcher;
pub use retry::RetryPolicy;
