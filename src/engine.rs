//! Workflow engine - the main entry point for Autoflow.
//!
//! The engine manages the lifecycle of workflows and executions, including:
//! - Validating, storing and registering workflow definitions
//! - Scheduling cron triggers and matching trigger signals
//! - Starting, observing and stopping executions
//! - Managing the event channel, the monitor and storage
//! - Graceful shutdown coordination

mod executor;
mod info;
mod monitor;
mod scheduler;
mod templates;

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::{
    AutoflowError, ChannelEvent, ChannelOptions, EngineConfig, Result,
    common::{Queue, Shutdown, Vars},
    model::{WorkflowModel, WorkflowStatus},
    runtime::{Channel, ExecutionId, ExecutionStatus},
    services::Services,
    store::{PageData, Store, data, query::Query},
    utils,
    workflow::{Workflow, trigger::TriggerSignal},
};

use executor::Executor;
use monitor::Monitor;
use scheduler::Scheduler;

pub use info::{ExecutionInfo, WorkflowInfo, WorkflowStats, WorkflowTemplate};

/// Size of the queue for finished execution notifications.
const EXECUTION_FINISH_QUEUE_SIZE: usize = 1024;
const RELEASE_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
/// Page size used when the engine walks a whole collection.
const SCAN_PAGE_SIZE: usize = 500;

/// The main workflow engine.
///
/// Engine is the central coordinator for Autoflow, responsible for:
/// - Managing the tokio runtime for async execution
/// - Coordinating the event channel for pub/sub messaging
/// - Storing workflow definitions and execution state
/// - Starting executions from the API, cron schedules and trigger signals
///
/// # Example
///
/// ```rust,ignore
/// let engine = EngineBuilder::new().build()?;
/// engine.launch()?;
///
/// let wid = engine.create_workflow(&workflow_model)?;
/// let eid = engine.execute_workflow(&wid, Vars::new().with("lead", lead))?;
///
/// // Shutdown when done
/// engine.shutdown();
/// ```
pub struct Engine {
    /// Event channel for broadcasting execution events.
    channel: Arc<Channel>,
    /// Persistent storage for workflows, executions and records.
    store: Arc<Store>,
    /// Background monitor for event persistence.
    monitor: Monitor,
    /// Active workflows and running executions.
    executor: Arc<Executor>,
    /// Cron loops of scheduled workflows.
    scheduler: Scheduler,
    /// Queue for receiving finished execution notifications.
    finished_queue: Arc<Queue<ExecutionId>>,
    config: EngineConfig,

    /// Flag indicating if the engine is running.
    running: Arc<AtomicBool>,
    /// Tokio runtime for async task execution.
    runtime: Arc<Runtime>,
    /// Shutdown coordinator for graceful termination.
    shutdown: Arc<Shutdown>,
}

impl Engine {
    /// Use [`EngineBuilder`](crate::EngineBuilder) to create an engine.
    pub(crate) fn new(
        store: Arc<Store>,
        services: Services,
        runtime: Arc<Runtime>,
        config: EngineConfig,
    ) -> Self {
        let channel = Arc::new(Channel::new(runtime.handle().clone()));
        let monitor = Monitor::new(store.clone(), channel.clone(), runtime.clone());
        let executor = Arc::new(Executor::new(store.clone(), Arc::new(services), channel.clone(), config.clone(), runtime.handle().clone()));
        let scheduler = Scheduler::new(executor.clone(), runtime.handle().clone());

        Self {
            channel,
            store,
            monitor,
            executor,
            scheduler,
            finished_queue: Queue::new(EXECUTION_FINISH_QUEUE_SIZE),
            config,
            running: Arc::new(AtomicBool::new(false)),
            runtime,
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    /// Starts the engine.
    ///
    /// This method:
    /// - Starts the event monitor for persistence
    /// - Begins listening on the event channel
    /// - Spawns a background task releasing finished executions
    /// - Fails executions a previous engine left behind
    /// - Reloads the stored active workflows
    /// - Schedules the cron triggers of every registered workflow
    pub fn launch(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Register handlers first, then start listening
        self.monitor.monitor();
        let finished_queue = self.finished_queue.clone();
        ChannelEvent::channel(self.channel.clone(), ChannelOptions::default()).on_finish(move |e| {
            if let Err(err) = finished_queue.send(e.eid.clone()) {
                warn!("execution {} finished but could not be released: {}", e.eid, err);
            }
        });
        self.channel.listen();

        let finished_queue = self.finished_queue.clone();
        let shutdown = self.shutdown.clone();
        let executor = self.executor.clone();
        self.runtime.spawn(async move {
            let mut sweep = tokio::time::interval(RELEASE_SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    Some(eid) = finished_queue.next_async() => executor.release(&eid),
                    _ = sweep.tick() => {
                        let released = executor.release_completed();
                        if released > 0 {
                            debug!("released {} finished execution(s) missed by the channel", released);
                        }
                    }
                }
            }
        });

        self.fail_interrupted()?;
        if self.config.load_on_launch {
            self.load_active()?;
        }
        for workflow in self.executor.workflows() {
            if !self.scheduler.is_scheduled(&workflow.id) {
                self.scheduler.schedule(&workflow);
            }
        }
        info!("engine launched");
        Ok(())
    }

    /// Gracefully shuts down the engine.
    ///
    /// This method:
    /// - Stops every cron schedule
    /// - Stops all running executions
    /// - Shuts down the monitor and the event channel
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        self.shutdown.shutdown();
        self.scheduler.cancel_all();
        for execution in self.executor.executions() {
            execution.stop();
        }
        self.monitor.shutdown();
        self.channel.shutdown();
        info!("engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Validates, stores and activates a workflow, scheduling its trigger.
    ///
    /// An empty id is replaced by a generated one; an existing workflow with
    /// the same id is replaced and keeps its counters.
    pub fn create_workflow(
        &self,
        model: &WorkflowModel,
    ) -> Result<String> {
        let mut model = model.clone();
        if model.id.is_empty() {
            model.id = uuid::Uuid::new_v4().to_string();
        }
        let workflow = Arc::new(Workflow::try_from(&model)?);

        self.store.deploy(&model, WorkflowStatus::Active)?;
        self.activate(workflow);
        info!("workflow {} ({}) created", model.id, model.name);
        Ok(model.id)
    }

    pub fn get_workflow(
        &self,
        wid: &str,
    ) -> Result<WorkflowInfo> {
        WorkflowInfo::try_from(self.find_workflow(wid)?)
    }

    /// Stored workflows, e.g. `Query::new().filter("owner", "u1")` or
    /// `.filter("status", "paused")`.
    pub fn list_workflows(
        &self,
        q: &Query,
    ) -> Result<PageData<WorkflowInfo>> {
        self.store.workflows()?.query(q)?.try_map(WorkflowInfo::try_from)
    }

    /// Starts a run of an active workflow and returns the execution id
    /// without waiting for it to finish.
    pub fn execute_workflow(
        &self,
        wid: &str,
        trigger_data: Vars,
    ) -> Result<ExecutionId> {
        self.ensure_running()?;
        self.executor.execute(wid, trigger_data)
    }

    pub fn get_execution(
        &self,
        eid: &str,
    ) -> Result<ExecutionInfo> {
        let execution = match self.store.executions()?.find(eid) {
            Ok(execution) => execution,
            Err(AutoflowError::NotFound(_)) => return Err(AutoflowError::ExecutionNotFound(eid.to_string())),
            Err(err) => return Err(err),
        };
        let steps = self.steps_of(eid)?;
        ExecutionInfo::new(execution, steps)
    }

    /// Executions of a workflow, newest first.
    pub fn list_executions(
        &self,
        wid: &str,
        limit: usize,
        offset: usize,
    ) -> Result<PageData<ExecutionInfo>> {
        let q = Query::new().filter("wid", wid).order("start_time", true).set_limit(limit).set_offset(offset);
        self.store.executions()?.query(&q)?.try_map(|e| {
            let steps = self.steps_of(&e.id)?;
            ExecutionInfo::new(e, steps)
        })
    }

    /// Stops a running execution; it ends `cancelled`.
    pub fn stop_execution(
        &self,
        eid: &str,
    ) -> Result<()> {
        if let Some(execution) = self.executor.execution(eid) {
            if !execution.is_complete() {
                execution.abort();
                return Ok(());
            }
        }
        match self.store.executions()?.find(eid) {
            Ok(e) => Err(AutoflowError::Execution(format!("execution {} already ended as {}", eid, e.status))),
            Err(AutoflowError::NotFound(_)) => Err(AutoflowError::ExecutionNotFound(eid.to_string())),
            Err(err) => Err(err),
        }
    }

    /// Takes a workflow out of the active set; running executions go on.
    pub fn pause_workflow(
        &self,
        wid: &str,
    ) -> Result<()> {
        self.find_workflow(wid)?;
        self.store.set_workflow_status(wid, WorkflowStatus::Paused)?;
        self.deactivate(wid);
        info!("workflow {} paused", wid);
        Ok(())
    }

    pub fn resume_workflow(
        &self,
        wid: &str,
    ) -> Result<()> {
        let stored = self.find_workflow(wid)?;
        let model = WorkflowModel::from_json(&stored.data)?;
        let workflow = Arc::new(Workflow::try_from(&model)?);

        self.store.set_workflow_status(wid, WorkflowStatus::Active)?;
        self.activate(workflow);
        info!("workflow {} resumed", wid);
        Ok(())
    }

    /// Unschedules and removes a workflow. Its executions stay stored.
    pub fn delete_workflow(
        &self,
        wid: &str,
    ) -> Result<()> {
        self.find_workflow(wid)?;
        self.deactivate(wid);
        self.store.workflows()?.delete(wid)?;
        info!("workflow {} deleted", wid);
        Ok(())
    }

    pub fn templates(&self) -> Vec<WorkflowTemplate> {
        templates::templates()
    }

    /// Totals over the workflows of `owner`, or of all workflows.
    pub fn stats(
        &self,
        owner: Option<&str>,
    ) -> Result<WorkflowStats> {
        let mut q = Query::new();
        if let Some(owner) = owner {
            q = q.filter("owner", owner);
        }
        let workflows = scan(&q, |q| self.store.workflows()?.query(q))?;

        let mut stats = WorkflowStats {
            total_workflows: workflows.len(),
            ..Default::default()
        };
        let mut executions = BTreeMap::new();
        for status in [ExecutionStatus::Active, ExecutionStatus::Completed, ExecutionStatus::Failed, ExecutionStatus::Cancelled] {
            executions.insert(status.to_string(), 0);
        }

        for w in workflows.iter() {
            if w.status == WorkflowStatus::Active.as_ref() {
                stats.active_workflows += 1;
            } else if w.status == WorkflowStatus::Paused.as_ref() {
                stats.paused_workflows += 1;
            }
            stats.total_runs += w.run_count;
            stats.successful_runs += w.success_count;

            for e in scan(&Query::new().filter("wid", w.id.as_str()), |q| self.store.executions()?.query(q))? {
                *executions.entry(e.status).or_insert(0) += 1;
            }
        }
        if stats.total_runs > 0 {
            stats.success_rate = stats.successful_runs as f64 * 100.0 / stats.total_runs as f64;
        }
        stats.executions = executions;
        Ok(stats)
    }

    /// Starts every active workflow whose trigger matches `signal`, with the
    /// signal payload as trigger data.
    pub fn fire(
        &self,
        signal: TriggerSignal,
    ) -> Result<Vec<ExecutionId>> {
        self.ensure_running()?;

        let mut started = Vec::new();
        for workflow in self.executor.workflows() {
            if !workflow.trigger.matches(&signal) {
                continue;
            }
            match self.executor.execute(&workflow.id, signal.payload.clone()) {
                Ok(eid) => started.push(eid),
                Err(err) => warn!("{} signal could not start workflow {}: {}", signal.trigger_type, workflow.id, err),
            }
        }
        debug!("{} signal {:?} started {} execution(s)", signal.trigger_type, signal.key, started.len());
        Ok(started)
    }

    /// Returns a reference to the event channel.
    pub fn channel(&self) -> Arc<Channel> {
        self.channel.clone()
    }

    fn ensure_running(&self) -> Result<()> {
        if !self.is_running() {
            return Err(AutoflowError::Engine("engine is not running".to_string()));
        }
        Ok(())
    }

    fn find_workflow(
        &self,
        wid: &str,
    ) -> Result<data::Workflow> {
        match self.store.workflows()?.find(wid) {
            Err(AutoflowError::NotFound(_)) => Err(AutoflowError::WorkflowNotFound(wid.to_string())),
            other => other,
        }
    }

    fn steps_of(
        &self,
        eid: &str,
    ) -> Result<Vec<data::Step>> {
        scan(&Query::new().filter("eid", eid).order("seq", false), |q| self.store.steps()?.query(q))
    }

    /// Registers `workflow`; its cron loop starts now when the engine runs,
    /// otherwise on launch.
    fn activate(
        &self,
        workflow: Arc<Workflow>,
    ) {
        if self.is_running() {
            self.scheduler.schedule(&workflow);
        }
        self.executor.register(workflow);
    }

    fn deactivate(
        &self,
        wid: &str,
    ) {
        self.scheduler.cancel(wid);
        self.executor.unregister(wid);
    }

    fn load_active(&self) -> Result<()> {
        let stored = scan(&Query::new().filter("status", WorkflowStatus::Active.as_ref()), |q| self.store.workflows()?.query(q))?;
        for w in stored {
            let workflow = WorkflowModel::from_json(&w.data).and_then(|model| Workflow::try_from(&model));
            match workflow {
                Ok(workflow) => self.activate(Arc::new(workflow)),
                Err(err) => warn!("stored workflow {} could not be loaded: {}", w.id, err),
            }
        }
        info!("{} active workflow(s) loaded", self.executor.workflows().len());
        Ok(())
    }

    /// Executions stored as active but not running here were cut off by a
    /// previous engine.
    fn fail_interrupted(&self) -> Result<()> {
        let executions = self.store.executions()?;
        let stale = scan(&Query::new().filter("status", ExecutionStatus::Active.as_ref()), |q| executions.query(q))?;

        let now = utils::time::time_millis();
        for mut e in stale.into_iter().filter(|e| self.executor.execution(&e.id).is_none()) {
            warn!("execution {} of workflow {} was interrupted", e.id, e.wid);
            e.status = ExecutionStatus::Failed.to_string();
            e.err = Some("interrupted by engine restart".to_string());
            e.current_step = String::new();
            e.end_time = now;
            e.timestamp = now;
            executions.update(&e)?;
        }
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Collects every row matching `q` page by page.
fn scan<T>(
    q: &Query,
    mut fetch: impl FnMut(&Query) -> Result<PageData<T>>,
) -> Result<Vec<T>> {
    let mut rows = Vec::new();
    let mut offset = 0;
    loop {
        let page = fetch(&q.clone().set_limit(SCAN_PAGE_SIZE).set_offset(offset))?;
        let fetched = page.rows.len();
        rows.extend(page.rows);
        offset += fetched;
        if fetched == 0 || offset >= page.count {
            return Ok(rows);
        }
    }
}
