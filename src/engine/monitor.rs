use std::sync::Arc;

use tokio::{runtime::Runtime, sync::broadcast::error::RecvError};
use tracing::{debug, warn};

use crate::{
    Result,
    common::Shutdown,
    events::{GraphEvent, Log, Message, StepEvent, WorkflowEvent},
    runtime::{Channel, ExecutionStatus},
    store::{Store, data},
    utils,
};

/// Persists what the event channel carries: raw events, logs, execution
/// state transitions, step results and workflow success counters.
pub struct Monitor {
    store: Arc<Store>,
    channel: Arc<Channel>,

    runtime: Arc<Runtime>,
    shutdown: Arc<Shutdown>,
}

impl Monitor {
    pub fn new(
        store: Arc<Store>,
        channel: Arc<Channel>,
        runtime: Arc<Runtime>,
    ) -> Self {
        Self {
            store,
            channel,
            runtime,
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    pub fn monitor(&self) {
        // subscribe before spawning so nothing emitted after this call is missed
        let mut event_queue = self.channel.event_queue().subscribe();
        let store = self.store.clone();
        let shutdown = self.shutdown.clone();
        self.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    msg = event_queue.recv() => match msg {
                        Ok(msg) => {
                            if let Err(err) = persist_event(&store, &msg) {
                                warn!("monitor failed to persist {} of execution {}: {}", msg.event.name(), msg.eid, err);
                            }
                        }
                        Err(RecvError::Lagged(n)) => warn!("monitor lagged behind, {} events dropped", n),
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        });

        let mut log_queue = self.channel.log_queue().subscribe();
        let store = self.store.clone();
        let shutdown = self.shutdown.clone();
        self.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    log = log_queue.recv() => match log {
                        Ok(log) => {
                            if let Err(err) = persist_log(&store, &log) {
                                warn!("monitor failed to persist log of execution {}: {}", log.eid, err);
                            }
                        }
                        Err(RecvError::Lagged(n)) => warn!("monitor lagged behind, {} logs dropped", n),
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        });
    }

    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }
}

fn persist_log(
    store: &Store,
    log: &Log,
) -> Result<()> {
    store.logs()?.create(&data::Log {
        id: utils::longid(),
        eid: log.eid.clone(),
        aid: log.aid.clone(),
        content: log.content.clone(),
        timestamp: log.timestamp,
    })?;
    Ok(())
}

fn persist_event(
    store: &Store,
    msg: &Message,
) -> Result<()> {
    let now = utils::time::time_millis();
    store.events()?.create(&data::Event {
        id: utils::longid(),
        eid: msg.eid.clone(),
        sid: msg.sid.clone(),
        name: msg.event.name().to_string(),
        message: format!("{:?}", msg.event),
        timestamp: now,
    })?;

    match &msg.event {
        GraphEvent::Workflow(e) => update_execution(store, msg, e, now),
        GraphEvent::Step(e) => update_step(store, msg, e, now),
        GraphEvent::Action(_) => Ok(()),
    }
}

fn update_execution(
    store: &Store,
    msg: &Message,
    event: &WorkflowEvent,
    now: i64,
) -> Result<()> {
    let executions = store.executions()?;
    let mut execution = executions.find(&msg.eid)?;

    let status = match event {
        WorkflowEvent::Start => {
            execution.status = ExecutionStatus::Active.to_string();
            execution.timestamp = now;
            executions.update(&execution)?;
            return Ok(());
        }
        WorkflowEvent::Succeeded {
            ..
        } => {
            // counted before the status becomes completed
            store.record_success(&msg.wid)?;
            ExecutionStatus::Completed
        }
        WorkflowEvent::Failed {
            error,
            ..
        } => {
            execution.err = Some(error.clone());
            ExecutionStatus::Failed
        }
        WorkflowEvent::Aborted {
            reason,
            ..
        } => {
            execution.err = Some(reason.clone());
            ExecutionStatus::Cancelled
        }
    };

    debug!("execution {} is {}", msg.eid, status);
    if let Some(data) = event.data() {
        execution.data = serde_json::to_string(data)?;
    }
    execution.status = status.to_string();
    execution.current_step = String::new();
    execution.end_time = now;
    execution.timestamp = now;
    executions.update(&execution)?;
    Ok(())
}

fn update_step(
    store: &Store,
    msg: &Message,
    event: &StepEvent,
    now: i64,
) -> Result<()> {
    let steps = store.steps()?;
    match event {
        StepEvent::Running {
            seq,
            name,
            timestamp,
        } => {
            steps.create(&data::Step {
                id: data::Step::key(&msg.eid, *seq),
                eid: msg.eid.clone(),
                sid: msg.sid.clone(),
                seq: *seq as i64,
                name: name.clone(),
                state: event.str().to_string(),
                data: String::new(),
                err: None,
                start_time: *timestamp,
                end_time: 0,
                timestamp: now,
            })?;

            let executions = store.executions()?;
            let mut execution = executions.find(&msg.eid)?;
            execution.current_step = msg.sid.clone();
            execution.timestamp = now;
            executions.update(&execution)?;
        }
        StepEvent::Succeeded(result) | StepEvent::Failed(result) => {
            let mut step = steps.find(&data::Step::key(&msg.eid, result.seq))?;
            step.state = event.str().to_string();
            step.data = serde_json::to_string(result)?;
            step.err = result.error();
            step.start_time = result.start_time;
            step.end_time = result.end_time;
            step.timestamp = now;
            steps.update(&step)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        WorkflowModel, WorkflowStatus,
        common::Vars,
        store::{DbStore, MemStore},
        workflow::{
            actions::{ActionStatus, ActionType},
            step::{ActionResult, StepResult},
        },
    };

    fn store() -> Store {
        let store = Store::new();
        MemStore::new().init(&store).unwrap();
        let model: WorkflowModel = serde_json::from_value(json!({
            "id": "wf1",
            "name": "test",
            "trigger": {"type": "user_action"},
            "steps": [{"id": "s1", "actions": [{"id": "a1", "type": "delay", "config": {"seconds": 1}}]}]
        }))
        .unwrap();
        store.deploy(&model, WorkflowStatus::Active).unwrap();
        store
            .executions()
            .unwrap()
            .create(&data::Execution {
                id: "e1".into(),
                wid: "wf1".into(),
                status: ExecutionStatus::Active.to_string(),
                current_step: String::new(),
                data: "{}".into(),
                err: None,
                start_time: 1,
                end_time: 0,
                timestamp: 1,
            })
            .unwrap();
        store
    }

    fn message(
        sid: &str,
        event: GraphEvent,
    ) -> Message {
        Message {
            eid: "e1".into(),
            wid: "wf1".into(),
            sid: sid.into(),
            event,
        }
    }

    fn result(success: bool) -> StepResult {
        StepResult {
            step_id: "s1".into(),
            name: "first".into(),
            seq: 0,
            success,
            parallel: false,
            action_results: vec![ActionResult {
                action_id: "a1".into(),
                action_type: ActionType::Delay,
                status: if success { ActionStatus::Succeeded } else { ActionStatus::Failed },
                attempts: 1,
                outputs: Vars::new(),
                error: (!success).then(|| "boom".to_string()),
            }],
            start_time: 10,
            end_time: 20,
        }
    }

    #[test]
    fn test_step_lifecycle() {
        let store = store();
        persist_event(&store, &message("s1", GraphEvent::Step(StepEvent::Running { seq: 0, name: "first".into(), timestamp: 10 }))).unwrap();
        assert_eq!(store.executions().unwrap().find("e1").unwrap().current_step, "s1");

        persist_event(&store, &message("s1", GraphEvent::Step(StepEvent::Failed(result(false))))).unwrap();
        let step = store.steps().unwrap().find(&data::Step::key("e1", 0)).unwrap();
        assert_eq!(step.state, "StepFailed");
        assert_eq!(step.err.as_deref(), Some("action 'a1' failed: boom"));
        assert_eq!(serde_json::from_str::<StepResult>(&step.data).unwrap(), result(false));
        assert_eq!(store.events().unwrap().query(&crate::Query::new()).unwrap().count, 2);
    }

    #[test]
    fn test_success_counts_before_completion() {
        let store = store();
        persist_event(&store, &message("", GraphEvent::Workflow(WorkflowEvent::Succeeded { data: Vars::new().with("k", 1) }))).unwrap();

        let execution = store.executions().unwrap().find("e1").unwrap();
        assert_eq!(execution.status, "completed");
        assert!(execution.end_time > 0);
        assert_eq!(serde_json::from_str::<serde_json::Value>(&execution.data).unwrap(), json!({"k": 1}));
        assert_eq!(store.workflows().unwrap().find("wf1").unwrap().success_count, 1);
    }

    #[test]
    fn test_abort_is_cancelled() {
        let store = store();
        persist_event(&store, &message("", GraphEvent::Workflow(WorkflowEvent::Aborted { reason: "stopped by user".into(), data: Vars::new() }))).unwrap();

        let execution = store.executions().unwrap().find("e1").unwrap();
        assert_eq!(execution.status, "cancelled");
        assert_eq!(execution.err.as_deref(), Some("stopped by user"));
        assert_eq!(store.workflows().unwrap().find("wf1").unwrap().success_count, 0);
    }
}
