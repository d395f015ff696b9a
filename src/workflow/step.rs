use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    AutoflowError, Result,
    common::Vars,
    model::{ActionModel, StepModel},
    workflow::actions::{Action, ActionStatus, ActionType, create_action},
};

pub type StepId = String;
pub type ActionId = String;

/// An action bound to its retry and timeout policy.
pub struct ActionNode {
    pub id: ActionId,
    pub uses: ActionType,
    pub retry_count: u32,
    /// `None` runs without a deadline
    pub timeout: Option<Duration>,
    pub action: Box<dyn Action>,
}

impl ActionNode {
    pub fn timeout_secs(&self) -> u64 {
        self.timeout.map(|t| t.as_secs()).unwrap_or(0)
    }
}

impl TryFrom<&ActionModel> for ActionNode {
    type Error = AutoflowError;

    fn try_from(model: &ActionModel) -> Result<Self> {
        if model.id.is_empty() {
            return Err(AutoflowError::Action("action id must not be empty".to_string()));
        }
        let uses = model.uses.parse::<ActionType>().map_err(|_| AutoflowError::Action(format!("action '{}' has unknown type '{}'", model.id, model.uses)))?;
        let action = create_action(uses, model.config.clone()).map_err(|e| AutoflowError::Action(format!("action '{}' has invalid config: {}", model.id, e)))?;

        Ok(Self {
            id: model.id.clone(),
            uses,
            retry_count: model.retry_count,
            timeout: (model.timeout_seconds > 0).then(|| Duration::from_secs(model.timeout_seconds)),
            action,
        })
    }
}

pub struct Step {
    pub id: StepId,
    pub name: String,
    pub parallel: bool,
    pub actions: Vec<ActionNode>,
    pub on_success: Option<StepId>,
    pub on_failure: Option<StepId>,
}

impl TryFrom<&StepModel> for Step {
    type Error = AutoflowError;

    fn try_from(model: &StepModel) -> Result<Self> {
        if model.id.is_empty() {
            return Err(AutoflowError::Step("step id must not be empty".to_string()));
        }
        if model.actions.is_empty() {
            return Err(AutoflowError::Step(format!("step '{}' has no actions", model.id)));
        }
        let actions = model.actions.iter().map(ActionNode::try_from).collect::<Result<Vec<_>>>()?;
        let pointer = |p: &Option<String>| p.as_ref().filter(|s| !s.is_empty()).cloned();

        Ok(Self {
            id: model.id.clone(),
            name: if model.name.is_empty() { model.id.clone() } else { model.name.clone() },
            parallel: model.parallel,
            actions,
            on_success: pointer(&model.on_success),
            on_failure: pointer(&model.on_failure),
        })
    }
}

/// Final state of one action within a step run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ActionResult {
    pub action_id: ActionId,
    pub action_type: ActionType,
    pub status: ActionStatus,
    /// attempts made, retries included
    pub attempts: u32,
    pub outputs: Vars,
    pub error: Option<String>,
}

impl ActionResult {
    pub fn succeeded(&self) -> bool {
        self.status == ActionStatus::Succeeded
    }
}

/// Result of one pass through a step.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StepResult {
    pub step_id: StepId,
    pub name: String,
    /// position in the execution's walk, starting at 0
    pub seq: usize,
    pub success: bool,
    pub parallel: bool,
    pub action_results: Vec<ActionResult>,
    pub start_time: i64,
    pub end_time: i64,
}

impl StepResult {
    /// First failure message among the actions.
    pub fn error(&self) -> Option<String> {
        self.action_results.iter().find(|r| !r.succeeded()).map(|r| format!("action '{}' {}: {}", r.action_id, r.status, r.error.clone().unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_timeout_zero_disables_deadline() {
        let model = ActionModel::new("a1", "delay", json!({"seconds": 1})).with_timeout_seconds(0);
        let node = ActionNode::try_from(&model).unwrap();
        assert!(node.timeout.is_none());
        assert_eq!(node.retry_count, 3);

        let node = ActionNode::try_from(&ActionModel::new("a2", "delay", json!({"seconds": 1}))).unwrap();
        assert_eq!(node.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_unknown_action_type() {
        let err = ActionNode::try_from(&ActionModel::new("a1", "fax", json!({}))).err().unwrap();
        assert!(err.to_string().contains("unknown type 'fax'"));
    }

    #[test]
    fn test_step_without_actions() {
        let model: StepModel = serde_json::from_value(json!({"id": "s1", "name": "empty", "actions": []})).unwrap();
        assert!(Step::try_from(&model).is_err());
    }

    #[test]
    fn test_step_result_error_names_failed_action() {
        let result = StepResult {
            step_id: "s1".into(),
            name: "notify".into(),
            seq: 0,
            success: false,
            parallel: true,
            action_results: vec![
                ActionResult {
                    action_id: "ok".into(),
                    action_type: ActionType::Delay,
                    status: ActionStatus::Succeeded,
                    attempts: 1,
                    outputs: Vars::new(),
                    error: None,
                },
                ActionResult {
                    action_id: "mail".into(),
                    action_type: ActionType::SendEmail,
                    status: ActionStatus::Failed,
                    attempts: 4,
                    outputs: Vars::new(),
                    error: Some("smtp down".into()),
                },
            ],
            start_time: 0,
            end_time: 1,
        };
        assert_eq!(result.error().unwrap(), "action 'mail' failed: smtp down");
    }
}
