//! Read models returned by the engine API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    AutoflowError, Result,
    common::Vars,
    model::{WorkflowModel, WorkflowStatus},
    runtime::{ExecutionId, ExecutionStatus},
    store::data,
    utils,
    workflow::step::StepResult,
};

/// A stored workflow with its lifecycle status and run counters.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WorkflowInfo {
    pub id: String,
    pub name: String,
    pub desc: String,
    pub owner: String,
    pub status: WorkflowStatus,
    pub trigger_type: String,
    pub tags: Vec<String>,
    pub run_count: i64,
    pub success_count: i64,
    /// RFC 3339, `None` before the first run
    pub last_run: Option<String>,
    pub create_time: i64,
    pub update_time: i64,
    pub model: WorkflowModel,
}

impl TryFrom<data::Workflow> for WorkflowInfo {
    type Error = AutoflowError;

    fn try_from(w: data::Workflow) -> Result<Self> {
        let status = w.status.parse::<WorkflowStatus>().map_err(|_| AutoflowError::Store(format!("workflow {} has unknown status '{}'", w.id, w.status)))?;
        let model = WorkflowModel::from_json(&w.data)?;
        Ok(Self {
            status,
            tags: w.tags.split(',').filter(|t| !t.is_empty()).map(str::to_string).collect(),
            last_run: utils::time::millis_to_rfc3339(w.last_run),
            model,
            id: w.id,
            name: w.name,
            desc: w.desc,
            owner: w.owner,
            trigger_type: w.trigger_type,
            run_count: w.run_count,
            success_count: w.success_count,
            create_time: w.create_time,
            update_time: w.update_time,
        })
    }
}

/// An execution record with its step results in walk order.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExecutionInfo {
    pub id: ExecutionId,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub current_step: Option<String>,
    /// the data placeholders resolved against, including action outputs
    pub data: Vars,
    pub step_results: Vec<StepResult>,
    pub error: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl ExecutionInfo {
    pub(crate) fn new(
        e: data::Execution,
        steps: Vec<data::Step>,
    ) -> Result<Self> {
        let status = e.status.parse::<ExecutionStatus>().map_err(|_| AutoflowError::Store(format!("execution {} has unknown status '{}'", e.id, e.status)))?;
        let data = if e.data.is_empty() { Vars::new() } else { Vars::from(serde_json::from_str::<serde_json::Value>(&e.data)?) };

        // a step still running has no result yet
        let step_results = steps.iter().filter(|s| !s.data.is_empty()).map(|s| serde_json::from_str::<StepResult>(&s.data)).collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            status,
            current_step: Some(e.current_step).filter(|s| !s.is_empty()),
            data,
            step_results,
            error: e.err,
            start_time: utils::time::millis_to_rfc3339(e.start_time),
            end_time: utils::time::millis_to_rfc3339(e.end_time),
            id: e.id,
            workflow_id: e.wid,
        })
    }
}

/// Totals over the workflows of one owner, or of everyone.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct WorkflowStats {
    pub total_workflows: usize,
    pub active_workflows: usize,
    pub paused_workflows: usize,
    pub total_runs: i64,
    pub successful_runs: i64,
    /// percent of runs that completed, 0 without runs
    pub success_rate: f64,
    /// stored executions keyed by status name
    pub executions: BTreeMap<String, usize>,
}

/// A ready-made workflow to customize before creating it.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WorkflowTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub workflow: WorkflowModel,
}
