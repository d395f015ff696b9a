use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use crate::{
    EngineConfig,
    common::{Queue, Vars},
    dispatcher::Dispatcher,
    runtime::{Channel, Context},
    services::Services,
    utils,
    workflow::Workflow,
};

const COMMAND_QUEUE_SIZE: usize = 16;

pub type ExecutionId = String;

/// Status of a stored execution.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumString, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Active)
    }
}

#[derive(Debug, Clone)]
pub enum ExecutionCommand {
    Start,
    Abort,
}

/// One run of a workflow.
#[derive(Clone)]
pub struct Execution {
    id: ExecutionId,
    wid: String,
    dispatcher: Arc<Dispatcher>,
    command_queue: Arc<Queue<ExecutionCommand>>,
}

impl Execution {
    /// Seeds the execution data with the workflow variables, the trigger
    /// data and the `workflow_id`, `execution_id`, `triggered_at` keys.
    pub(crate) fn new(
        workflow: Arc<Workflow>,
        trigger_data: Vars,
        services: Arc<Services>,
        channel: Arc<Channel>,
        handle: Handle,
        config: &EngineConfig,
    ) -> Arc<Self> {
        let eid = utils::longid();

        let mut data = workflow.variables.clone();
        data.merge(trigger_data);
        data.set("workflow_id", workflow.id.as_str());
        data.set("execution_id", eid.as_str());
        data.set("triggered_at", Utc::now().to_rfc3339());

        let command_queue = Queue::new(COMMAND_QUEUE_SIZE);
        let ctx = Arc::new(Context::new(eid.clone(), workflow.id.clone(), data, channel, services));
        let wid = workflow.id.clone();
        let dispatcher = Arc::new(Dispatcher::new(ctx, workflow, command_queue.clone(), handle, config));

        Arc::new(Self {
            id: eid,
            wid,
            dispatcher,
            command_queue,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn wid(&self) -> &str {
        &self.wid
    }

    pub fn start(&self) {
        self.dispatcher.start();
        let _ = self.command_queue.send(ExecutionCommand::Start);
    }

    /// Requests a stop; the execution ends `cancelled` unless it already
    /// reached a terminal state.
    pub fn abort(&self) {
        let _ = self.command_queue.send(ExecutionCommand::Abort);
    }

    /// Stops without publishing a terminal event, used on engine shutdown.
    pub(crate) fn stop(&self) {
        self.dispatcher.stop();
    }

    pub fn data(&self) -> Vars {
        self.dispatcher.data()
    }

    pub fn is_complete(&self) -> bool {
        self.dispatcher.is_complete()
    }
}
