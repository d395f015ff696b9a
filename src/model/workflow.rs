use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    AutoflowError, Result,
    model::{StepModel, TriggerModel},
};

/// Lifecycle status of a stored workflow.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Active,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowModel {
    /// generated when empty
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// seed values for every execution's data
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
    pub trigger: TriggerModel,
    pub steps: Vec<StepModel>,
}

impl WorkflowModel {
    pub fn from_json(s: &str) -> Result<Self> {
        let workflow = serde_json::from_str::<WorkflowModel>(s);
        match workflow {
            Ok(v) => Ok(v),
            Err(e) => Err(AutoflowError::Workflow(format!("{}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_applies_defaults() {
        let model = WorkflowModel::from_json(
            r#"{
                "name": "welcome",
                "trigger": {"type": "event", "config": {"event": "user.signup"}},
                "steps": [{
                    "id": "s1",
                    "actions": [{"id": "a1", "type": "send_email", "config": {"to": "{email}"}}]
                }]
            }"#,
        )
        .unwrap();

        assert!(model.id.is_empty());
        assert_eq!(model.trigger.trigger_type, "event");
        assert!(!model.steps[0].parallel);
        assert_eq!(model.steps[0].on_success, None);
        assert_eq!(model.steps[0].actions[0].retry_count, 3);
        assert_eq!(model.steps[0].actions[0].timeout_seconds, 30);
    }

    #[test]
    fn test_from_json_requires_steps() {
        let err = WorkflowModel::from_json(r#"{"name": "x", "trigger": {"type": "schedule"}}"#).unwrap_err();
        assert!(matches!(err, AutoflowError::Workflow(_)));
    }

    #[test]
    fn test_status_names() {
        assert_eq!(WorkflowStatus::Paused.as_ref(), "paused");
        assert_eq!("cancelled".parse::<WorkflowStatus>().unwrap(), WorkflowStatus::Cancelled);
    }
}
