use serde::{Deserialize, Serialize};

use crate::model::ActionModel;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepModel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub actions: Vec<ActionModel>,
    /// next step id after success; none ends the execution as completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<String>,
    /// next step id after failure; none ends the execution as failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<String>,
    #[serde(default)]
    pub parallel: bool,
}
