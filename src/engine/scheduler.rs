use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::Utc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::{
    AutoflowError, ShareLock,
    common::{Shutdown, Vars},
    engine::executor::Executor,
    workflow::{Workflow, trigger::CronSchedule},
};

/// One cron loop per scheduled workflow.
pub struct Scheduler {
    executor: Arc<Executor>,
    handle: Handle,

    tasks: ShareLock<HashMap<String, Arc<Shutdown>>>,
}

impl Scheduler {
    pub fn new(
        executor: Arc<Executor>,
        handle: Handle,
    ) -> Self {
        Self {
            executor,
            handle,
            tasks: Default::default(),
        }
    }

    /// Starts the cron loop of `workflow`, replacing a running one. Workflows
    /// without a schedule trigger are ignored.
    pub fn schedule(
        &self,
        workflow: &Workflow,
    ) {
        let Some(schedule) = workflow.trigger.schedule().cloned() else {
            return;
        };
        self.cancel(&workflow.id);

        let shutdown = Arc::new(Shutdown::new());
        if let Ok(mut tasks) = self.tasks.write() {
            tasks.insert(workflow.id.clone(), shutdown.clone());
        }

        info!("workflow {} scheduled at '{}'", workflow.id, schedule);
        self.handle.spawn(run(workflow.id.clone(), schedule, self.executor.clone(), shutdown));
    }

    pub fn cancel(
        &self,
        wid: &str,
    ) {
        let task = self.tasks.write().ok().and_then(|mut tasks| tasks.remove(wid));
        if let Some(shutdown) = task {
            debug!("workflow {} unscheduled", wid);
            shutdown.shutdown();
        }
    }

    pub fn cancel_all(&self) {
        let tasks = self.tasks.write().map(|mut tasks| tasks.drain().collect::<Vec<_>>()).unwrap_or_default();
        for (_, shutdown) in tasks {
            shutdown.shutdown();
        }
    }

    pub fn is_scheduled(
        &self,
        wid: &str,
    ) -> bool {
        self.tasks.read().map(|tasks| tasks.contains_key(wid)).unwrap_or(false)
    }
}

async fn run(
    wid: String,
    schedule: CronSchedule,
    executor: Arc<Executor>,
    shutdown: Arc<Shutdown>,
) {
    loop {
        let now = Utc::now();
        let Some(next) = schedule.next_after(now) else {
            info!("schedule '{}' of workflow {} has no further fire time", schedule, wid);
            break;
        };
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = shutdown.wait() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        let trigger_data = Vars::new().with("trigger", "schedule").with("scheduled_at", next.to_rfc3339());
        match executor.execute(&wid, trigger_data) {
            Ok(eid) => debug!("schedule fired execution {} of workflow {}", eid, wid),
            Err(AutoflowError::WorkflowNotFound(_)) => {
                debug!("workflow {} left the active set, schedule stops", wid);
                break;
            }
            Err(err) => warn!("scheduled run of workflow {} failed to start: {}", wid, err),
        }
    }
}
