//! # Autoflow
//!
//! Autoflow is an embeddable workflow automation engine written in Rust.
//! A workflow is one trigger plus a chain of steps; every step runs a set of
//! typed actions (email, notification, HTTP call, script, delay, ...) either
//! in parallel or in sequence, and branches to its `on_success` or
//! `on_failure` successor depending on the outcome.
//!
//! ## Core Features
//!
//! - **Triggers**: cron schedules plus event, webhook, user-action, condition
//!   and metric-threshold signals
//! - **Retried actions**: per-action retry count with exponential backoff and
//!   per-attempt timeouts
//! - **Event-Driven Execution**: every state change is published on an event
//!   channel and persisted by a background monitor
//! - **Pluggable Storage**: in-memory storage (testing) and PostgreSQL
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use autoflow::{EngineBuilder, Vars, WorkflowModel};
//!
//! let engine = EngineBuilder::new().build()?;
//! engine.launch()?;
//!
//! let workflow = WorkflowModel::from_json(json_str)?;
//! let wid = engine.create_workflow(&workflow)?;
//! let eid = engine.execute_workflow(&wid, Vars::new())?;
//! let execution = engine.get_execution(&eid)?;
//! ```

mod builder;
mod common;
mod config;
mod dispatcher;
mod engine;
mod error;
mod events;
mod model;
mod runtime;
mod services;
mod store;
mod utils;
mod workflow;

use std::sync::{Arc, RwLock};

pub use builder::EngineBuilder;
pub use common::Vars;
pub use config::{Config, EngineConfig, PostgresConfig, StoreConfig, StoreType};
pub use engine::{Engine, ExecutionInfo, WorkflowInfo, WorkflowStats, WorkflowTemplate};
pub use error::AutoflowError;
pub use events::{ActionEvent, GraphEvent, Log, Message, StepEvent, WorkflowEvent};
pub use model::*;
pub use runtime::{Channel, ChannelEvent, ChannelOptions, Execution, ExecutionId, ExecutionStatus};
pub use services::{AnalysisRequest, Analyzer, Email, Mailer, Notification, Notifier};
pub use store::{PageData, query::Query};
pub use workflow::{
    actions::{ActionStatus, ActionType},
    condition::{Condition, ConditionOperator},
    step::{ActionResult, StepResult},
    trigger::{CronSchedule, TriggerSignal, TriggerType},
};

/// Result type alias for Autoflow operations.
pub type Result<T> = std::result::Result<T, AutoflowError>;

/// Thread-safe shared lock wrapper using Arc<RwLock<T>>.
pub(crate) type ShareLock<T> = Arc<RwLock<T>>;
