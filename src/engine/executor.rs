use std::{collections::HashMap, sync::Arc};

use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::{
    AutoflowError, EngineConfig, Result, ShareLock,
    common::Vars,
    runtime::{Channel, Execution, ExecutionId, ExecutionStatus},
    services::Services,
    store::{Store, data},
    utils,
    workflow::Workflow,
};

/// Active workflows and the executions started from them.
///
/// Shared between the engine API and the cron schedulers.
pub struct Executor {
    store: Arc<Store>,
    services: Arc<Services>,
    channel: Arc<Channel>,
    config: EngineConfig,
    handle: Handle,

    workflows: ShareLock<HashMap<String, Arc<Workflow>>>,
    executions: ShareLock<HashMap<ExecutionId, Arc<Execution>>>,
}

impl Executor {
    pub fn new(
        store: Arc<Store>,
        services: Arc<Services>,
        channel: Arc<Channel>,
        config: EngineConfig,
        handle: Handle,
    ) -> Self {
        Self {
            executions: Default::default(),
            workflows: Default::default(),
            store,
            services,
            channel,
            config,
            handle,
        }
    }

    pub fn register(
        &self,
        workflow: Arc<Workflow>,
    ) {
        if let Ok(mut workflows) = self.workflows.write() {
            workflows.insert(workflow.id.clone(), workflow);
        }
    }

    pub fn unregister(
        &self,
        wid: &str,
    ) -> Option<Arc<Workflow>> {
        self.workflows.write().ok().and_then(|mut workflows| workflows.remove(wid))
    }

    pub fn workflow(
        &self,
        wid: &str,
    ) -> Option<Arc<Workflow>> {
        self.workflows.read().ok().and_then(|workflows| workflows.get(wid).cloned())
    }

    pub fn workflows(&self) -> Vec<Arc<Workflow>> {
        self.workflows.read().map(|workflows| workflows.values().cloned().collect()).unwrap_or_default()
    }

    /// Starts a run of an active workflow and returns its id without
    /// waiting for it. Fails when `max_running_executions` runs are live.
    pub fn execute(
        &self,
        wid: &str,
        trigger_data: Vars,
    ) -> Result<ExecutionId> {
        let workflow = self.workflow(wid).ok_or_else(|| AutoflowError::WorkflowNotFound(wid.to_string()))?;
        let execution = Execution::new(workflow, trigger_data, self.services.clone(), self.channel.clone(), self.handle.clone(), &self.config);
        let eid = execution.id().to_string();
        self.admit(execution.clone())?;

        let now = utils::time::time_millis();
        let created = self.store.executions()?.create(&data::Execution {
            id: eid.clone(),
            wid: wid.to_string(),
            status: ExecutionStatus::Active.to_string(),
            current_step: String::new(),
            data: serde_json::to_string(&execution.data())?,
            err: None,
            start_time: now,
            end_time: 0,
            timestamp: now,
        });
        if let Err(err) = created {
            self.release(&eid);
            return Err(err);
        }
        if let Err(err) = self.store.record_run(wid, now) {
            warn!("failed to count run of workflow {}: {}", wid, err);
        }

        execution.start();
        info!("workflow {} started execution {}", wid, eid);

        Ok(eid)
    }

    fn admit(
        &self,
        execution: Arc<Execution>,
    ) -> Result<()> {
        let mut executions = self.executions.write().map_err(|e| AutoflowError::Engine(e.to_string()))?;
        if executions.len() >= self.config.max_running_executions {
            executions.retain(|_, e| !e.is_complete());
        }
        if executions.len() >= self.config.max_running_executions {
            return Err(AutoflowError::Engine(format!("{} executions are already running", executions.len())));
        }
        executions.insert(execution.id().to_string(), execution);
        Ok(())
    }

    pub fn execution(
        &self,
        eid: &str,
    ) -> Option<Arc<Execution>> {
        self.executions.read().ok().and_then(|executions| executions.get(eid).cloned())
    }

    /// Forgets a finished execution.
    pub fn release(
        &self,
        eid: &str,
    ) {
        if let Ok(mut executions) = self.executions.write() {
            executions.remove(eid);
        }
    }

    /// Forgets every finished execution whose release notice was missed.
    pub fn release_completed(&self) -> usize {
        let Ok(mut executions) = self.executions.write() else {
            return 0;
        };
        let before = executions.len();
        executions.retain(|_, e| !e.is_complete());
        before - executions.len()
    }

    pub fn executions(&self) -> Vec<Arc<Execution>> {
        self.executions.read().map(|executions| executions.values().cloned().collect()).unwrap_or_default()
    }
}
