use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerModel {
    /// one of the `TriggerType` names, e.g. `schedule`
    #[serde(rename = "type")]
    pub trigger_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub conditions: Vec<ConditionModel>,
}

impl Default for TriggerModel {
    fn default() -> Self {
        Self {
            trigger_type: "user_action".to_string(),
            config: serde_json::Value::Null,
            conditions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionModel {
    pub field: String,
    pub operator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}
