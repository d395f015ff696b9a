mod event;
mod execution;
mod log;
mod record;
mod step;
mod workflow;
