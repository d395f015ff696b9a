//! Execution dispatcher.
//!
//! The dispatcher is responsible for:
//! - Processing execution commands (Start, Abort)
//! - Walking the step chain along `on_success` / `on_failure`
//! - Running a step's actions in parallel or in sequence
//! - Retrying failed attempts with exponential backoff and per-attempt timeouts

use std::sync::Arc;

use futures::future::join_all;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::{
    AutoflowError, EngineConfig,
    common::{Queue, Vars},
    dispatcher::RetryPolicy,
    events::{ActionEvent, ErrorReason, GraphEvent, StepEvent, WorkflowEvent},
    runtime::{Context, ExecutionCommand},
    utils,
    workflow::{
        Workflow,
        actions::{ActionOutput, ActionStatus},
        edge::Branch,
        step::{ActionNode, ActionResult, Step, StepResult},
    },
};

/// How a walk ended when nobody stopped it.
#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    Completed,
    Failed(String),
}

/// Execution dispatcher.
pub struct Dispatcher {
    /// Execution context with the execution data.
    ctx: Arc<Context>,
    /// The step graph to walk.
    workflow: Arc<Workflow>,
    /// Queue for receiving execution commands.
    command_queue: Arc<Queue<ExecutionCommand>>,
    handle: Handle,

    retry: RetryPolicy,
    max_step_transitions: usize,
}

impl Dispatcher {
    pub fn new(
        ctx: Arc<Context>,
        workflow: Arc<Workflow>,
        command_queue: Arc<Queue<ExecutionCommand>>,
        handle: Handle,
        config: &EngineConfig,
    ) -> Self {
        Self {
            ctx,
            workflow,
            command_queue,
            handle,
            retry: RetryPolicy::from(config),
            max_step_transitions: config.max_step_transitions,
        }
    }

    /// Starts the command loop. The walk itself runs in its own task so an
    /// abort is handled while a step is in flight.
    pub fn start(&self) {
        let ctx = self.ctx.clone();
        let workflow = self.workflow.clone();
        let command_queue = self.command_queue.clone();
        let handle = self.handle.clone();
        let retry = self.retry;
        let max_step_transitions = self.max_step_transitions;

        self.handle.spawn(async move {
            loop {
                tokio::select! {
                    _ = ctx.wait_shutdown() => break,

                    cmd = command_queue.next_async() => match cmd {
                        Some(ExecutionCommand::Start) => {
                            ctx.emit("", GraphEvent::Workflow(WorkflowEvent::Start));

                            let ctx = ctx.clone();
                            let workflow = workflow.clone();
                            handle.spawn(async move {
                                let outcome = tokio::select! {
                                    _ = ctx.wait_shutdown() => return,
                                    outcome = Self::walk(&ctx, &workflow, &retry, max_step_transitions) => outcome,
                                };
                                Self::finish(&ctx, outcome);
                            });
                        }
                        Some(ExecutionCommand::Abort) => {
                            if ctx.try_finish() {
                                info!("execution {} aborted", ctx.eid());
                                ctx.emit(
                                    "",
                                    GraphEvent::Workflow(WorkflowEvent::Aborted {
                                        reason: "stopped by user".to_string(),
                                        data: ctx.data(),
                                    }),
                                );
                                ctx.done();
                            }
                            break;
                        }
                        None => break,
                    }
                }
            }
        });
    }

    /// Stops the dispatcher without publishing a terminal event.
    pub fn stop(&self) {
        self.ctx.done();
    }

    pub fn data(&self) -> Vars {
        self.ctx.data()
    }

    pub fn is_complete(&self) -> bool {
        self.ctx.is_done()
    }

    fn finish(
        ctx: &Arc<Context>,
        outcome: Outcome,
    ) {
        if !ctx.try_finish() {
            return;
        }
        let data = ctx.data();
        let event = match outcome {
            Outcome::Completed => {
                info!("execution {} completed", ctx.eid());
                WorkflowEvent::Succeeded {
                    data,
                }
            }
            Outcome::Failed(error) => {
                warn!("execution {} failed: {}", ctx.eid(), error);
                WorkflowEvent::Failed {
                    error,
                    data,
                }
            }
        };
        ctx.emit("", GraphEvent::Workflow(event));
        ctx.done();
    }

    async fn walk(
        ctx: &Arc<Context>,
        workflow: &Workflow,
        retry: &RetryPolicy,
        max_step_transitions: usize,
    ) -> Outcome {
        let mut step = workflow.entry_step();
        let mut seq = 0;

        loop {
            if seq >= max_step_transitions {
                return Outcome::Failed(format!("step limit of {} reached at step '{}'", max_step_transitions, step.id));
            }

            debug!("execution {} enters step {} (#{})", ctx.eid(), step.id, seq);
            ctx.emit(
                &step.id,
                GraphEvent::Step(StepEvent::Running {
                    seq,
                    name: step.name.clone(),
                    timestamp: utils::time::time_millis(),
                }),
            );

            let result = Self::run_step(ctx, step, seq, retry).await;
            let success = result.success;
            let error = result.error();
            ctx.emit(&step.id, GraphEvent::Step(if success { StepEvent::Succeeded(result) } else { StepEvent::Failed(result) }));

            match workflow.next_step(&step.id, Branch::from_outcome(success)) {
                Some(next) => {
                    step = next;
                    seq += 1;
                }
                None if success => return Outcome::Completed,
                None => return Outcome::Failed(error.unwrap_or_else(|| format!("step '{}' failed", step.id))),
            }
        }
    }

    async fn run_step(
        ctx: &Arc<Context>,
        step: &Step,
        seq: usize,
        retry: &RetryPolicy,
    ) -> StepResult {
        let start_time = utils::time::time_millis();

        let action_results = if step.parallel {
            join_all(step.actions.iter().map(|node| Self::run_action(ctx, &step.id, node, retry))).await
        } else {
            let mut results = Vec::with_capacity(step.actions.len());
            for node in step.actions.iter() {
                let result = Self::run_action(ctx, &step.id, node, retry).await;
                let succeeded = result.succeeded();
                results.push(result);
                if !succeeded {
                    break;
                }
            }
            results
        };

        StepResult {
            step_id: step.id.clone(),
            name: step.name.clone(),
            seq,
            success: action_results.iter().all(|r| r.succeeded()),
            parallel: step.parallel,
            action_results,
            start_time,
            end_time: utils::time::time_millis(),
        }
    }

    /// Runs up to `retry_count + 1` attempts of one action.
    async fn run_action(
        ctx: &Arc<Context>,
        sid: &str,
        node: &ActionNode,
        retry: &RetryPolicy,
    ) -> ActionResult {
        let max_attempts = node.retry_count.saturating_add(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            ctx.emit(
                sid,
                GraphEvent::Action(ActionEvent::Running {
                    action_id: node.id.clone(),
                    attempt,
                }),
            );

            let output = Self::attempt(ctx, node).await;
            if output.status == ActionStatus::Succeeded {
                ctx.set_output(&node.id, output.outputs.clone());
                ctx.emit(
                    sid,
                    GraphEvent::Action(ActionEvent::Succeeded {
                        action_id: node.id.clone(),
                        attempts: attempt,
                    }),
                );
                return ActionResult {
                    action_id: node.id.clone(),
                    action_type: node.uses,
                    status: output.status,
                    attempts: attempt,
                    outputs: output.outputs,
                    error: None,
                };
            }

            let reason = match output.status {
                ActionStatus::Timeout => ErrorReason::Timeout,
                ActionStatus::Stopped => ErrorReason::Stopped,
                ActionStatus::Exception => ErrorReason::Exception(output.error.clone().unwrap_or_default()),
                _ => ErrorReason::Failed(output.error.clone().unwrap_or_default()),
            };

            if output.status.is_retryable() && attempt < max_attempts {
                let backoff = retry.backoff(attempt - 1);
                warn!("action {} attempt {}/{} failed ({}), retrying in {:?}", node.id, attempt, max_attempts, reason, backoff);
                ctx.emit(
                    sid,
                    GraphEvent::Action(ActionEvent::Retry {
                        action_id: node.id.clone(),
                        attempt,
                        reason,
                        backoff_ms: backoff.as_millis() as u64,
                    }),
                );
                tokio::time::sleep(backoff).await;
                continue;
            }

            warn!("action {} failed after {} attempt(s): {}", node.id, attempt, reason);
            ctx.emit(
                sid,
                GraphEvent::Action(ActionEvent::Failed {
                    action_id: node.id.clone(),
                    attempts: attempt,
                    reason,
                }),
            );
            return ActionResult {
                action_id: node.id.clone(),
                action_type: node.uses,
                status: output.status,
                attempts: attempt,
                outputs: Vars::new(),
                error: output.error,
            };
        }
    }

    /// One attempt bounded by the action's timeout. Errors returned by the
    /// action count as a failed attempt.
    async fn attempt(
        ctx: &Arc<Context>,
        node: &ActionNode,
    ) -> ActionOutput {
        let run = node.action.run(ctx.clone(), node.id.clone());
        let result = match node.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, run).await {
                Ok(result) => result,
                Err(_) => return ActionOutput::timeout(node.timeout_secs()),
            },
            None => run.await,
        };

        match result {
            Ok(output) => output,
            Err(AutoflowError::Exception {
                ecode,
                message,
            }) => ActionOutput::exception(format!("{}: {}", ecode, message)),
            Err(err) => ActionOutput::failed(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::{WorkflowModel, common::Vars};

    fn workflow(steps: serde_json::Value) -> Arc<Workflow> {
        let model: WorkflowModel = serde_json::from_value(json!({
            "id": "wf1",
            "name": "test",
            "trigger": {"type": "user_action"},
            "steps": steps
        }))
        .unwrap();
        Arc::new(Workflow::try_from(&model).unwrap())
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(1), Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_failing_action_is_attempted_retry_count_plus_one_times() {
        let wf = workflow(json!([{
            "id": "s1",
            "actions": [{"id": "bad", "type": "run_script", "retry_count": 2, "config": {"code": "function main() { throw new Error('no'); }"}}]
        }]));
        let ctx = Context::for_test(Vars::new());
        let result = Dispatcher::run_action(&ctx, "s1", &wf.entry_step().actions[0], &fast_retry()).await;
        assert_eq!(result.attempts, 3);
        assert_eq!(result.status, ActionStatus::Exception);
        assert!(result.error.unwrap().contains("no"));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failed_attempt() {
        let wf = workflow(json!([{
            "id": "s1",
            "actions": [{"id": "slow", "type": "delay", "retry_count": 0, "timeout_seconds": 1, "config": {"seconds": 5}}]
        }]));
        let ctx = Context::for_test(Vars::new());
        let result = Dispatcher::run_action(&ctx, "s1", &wf.entry_step().actions[0], &fast_retry()).await;
        assert_eq!(result.status, ActionStatus::Timeout);
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test]
    async fn test_sequential_step_short_circuits() {
        let wf = workflow(json!([{
            "id": "s1",
            "actions": [
                {"id": "bad", "type": "run_script", "retry_count": 0, "config": {"code": "function main() { throw new Error('x'); }"}},
                {"id": "never", "type": "delay", "config": {"milliseconds": 1}}
            ]
        }]));
        let ctx = Context::for_test(Vars::new());
        let result = Dispatcher::run_step(&ctx, wf.entry_step(), 0, &fast_retry()).await;
        assert!(!result.success);
        assert_eq!(result.action_results.len(), 1);
        assert!(ctx.data().get::<serde_json::Value>("never").is_none());
    }

    #[tokio::test]
    async fn test_parallel_step_needs_every_action() {
        let wf = workflow(json!([{
            "id": "s1",
            "parallel": true,
            "actions": [
                {"id": "ok", "type": "delay", "config": {"milliseconds": 1}},
                {"id": "bad", "type": "run_script", "retry_count": 0, "config": {"code": "function main() { throw new Error('x'); }"}}
            ]
        }]));
        let ctx = Context::for_test(Vars::new());
        let result = Dispatcher::run_step(&ctx, wf.entry_step(), 0, &fast_retry()).await;
        assert!(!result.success);
        assert_eq!(result.action_results.len(), 2);
        assert!(result.action_results[0].succeeded());
        assert!(result.error().unwrap().starts_with("action 'bad' exception"));
    }

    #[tokio::test]
    async fn test_outputs_feed_later_actions() {
        let wf = workflow(json!([{
            "id": "s1",
            "actions": [
                {"id": "score", "type": "run_script", "config": {"code": "function main() { return { value: 42 }; }"}},
                {"id": "echo", "type": "run_script", "config": {
                    "code": "function main({ v }) { return { got: v }; }",
                    "variables": {"v": "{score.value}"}
                }}
            ]
        }]));
        let ctx = Context::for_test(Vars::new());
        let result = Dispatcher::run_step(&ctx, wf.entry_step(), 0, &fast_retry()).await;
        assert!(result.success);
        assert_eq!(ctx.data().lookup("echo.got"), Some(&json!(42)));
    }

    #[tokio::test]
    async fn test_walk_stops_at_step_limit() {
        let wf = workflow(json!([
            {"id": "poll", "actions": [{"id": "wait", "type": "delay", "config": {"milliseconds": 1}}], "on_success": "poll"}
        ]));
        let ctx = Context::for_test(Vars::new());
        let outcome = Dispatcher::walk(&ctx, &wf, &fast_retry(), 5).await;
        assert_eq!(outcome, Outcome::Failed("step limit of 5 reached at step 'poll'".to_string()));
    }

    #[tokio::test]
    async fn test_walk_follows_failure_branch() {
        let wf = workflow(json!([
            {"id": "try", "actions": [{"id": "bad", "type": "run_script", "retry_count": 0, "config": {"code": "function main() { throw new Error('x'); }"}}], "on_failure": "recover"},
            {"id": "recover", "actions": [{"id": "fix", "type": "delay", "config": {"milliseconds": 1}}]}
        ]));
        let ctx = Context::for_test(Vars::new());
        assert_eq!(Dispatcher::walk(&ctx, &wf, &fast_retry(), 10).await, Outcome::Completed);
        assert!(ctx.data().get::<serde_json::Value>("fix").is_some());
    }
}
