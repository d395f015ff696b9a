pub mod analysis;
pub mod data;
pub mod delay;
pub mod email;
pub mod http_request;
pub mod notification;
pub mod report;
pub mod script;
pub mod slack;
pub mod social;
pub mod task;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Result, common::Vars, runtime::Context, workflow::step::ActionId};

pub use analysis::AiAnalysisAction;
pub use data::UpdateDataAction;
pub use delay::DelayAction;
pub use email::SendEmailAction;
pub use http_request::HttpRequestAction;
pub use notification::SendNotificationAction;
pub use report::GenerateReportAction;
pub use script::RunScriptAction;
pub use slack::SlackMessageAction;
pub use social::SocialPostAction;
pub use task::CreateTaskAction;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumString, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActionType {
    SendEmail,
    SendNotification,
    CreateTask,
    UpdateData,
    HttpRequest,
    RunScript,
    GenerateReport,
    AiAnalysis,
    SocialPost,
    SlackMessage,
    Delay,
}

#[async_trait]
#[typetag::serde(tag = "type")]
pub trait Action: Send + Sync {
    /// Creates a new instance of the action from its configuration.
    ///
    /// The configuration is validated against [`Action::schema`] first.
    fn create(params: serde_json::Value) -> Result<Self>
    where
        Self: Sized;

    /// JSON schema of the action configuration.
    fn schema() -> serde_json::Value
    where
        Self: Sized;

    fn action_type(&self) -> ActionType;

    /// Runs one attempt of the action.
    ///
    /// Placeholders in the configuration are resolved against the current
    /// execution data. An `Err` counts as an exception of this attempt.
    async fn run(
        &self,
        ctx: Arc<Context>,
        aid: ActionId,
    ) -> Result<ActionOutput>;
}

/// Builds the action implementing `uses` from a raw configuration.
pub fn create_action(
    uses: ActionType,
    params: serde_json::Value,
) -> Result<Box<dyn Action>> {
    let action: Box<dyn Action> = match uses {
        ActionType::SendEmail => Box::new(SendEmailAction::create(params)?),
        ActionType::SendNotification => Box::new(SendNotificationAction::create(params)?),
        ActionType::CreateTask => Box::new(CreateTaskAction::create(params)?),
        ActionType::UpdateData => Box::new(UpdateDataAction::create(params)?),
        ActionType::HttpRequest => Box::new(HttpRequestAction::create(params)?),
        ActionType::RunScript => Box::new(RunScriptAction::create(params)?),
        ActionType::GenerateReport => Box::new(GenerateReportAction::create(params)?),
        ActionType::AiAnalysis => Box::new(AiAnalysisAction::create(params)?),
        ActionType::SocialPost => Box::new(SocialPostAction::create(params)?),
        ActionType::SlackMessage => Box::new(SlackMessageAction::create(params)?),
        ActionType::Delay => Box::new(DelayAction::create(params)?),
    };
    Ok(action)
}

/// Outcome of a single action attempt.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActionStatus {
    Succeeded,
    Failed,
    Exception,
    Timeout,
    Stopped,
}

impl ActionStatus {
    /// Failed, exception and timeout attempts are retried; a stop is final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ActionStatus::Failed | ActionStatus::Exception | ActionStatus::Timeout)
    }
}

/// Output returned by an action's run method
#[derive(Debug, Clone)]
pub struct ActionOutput {
    pub status: ActionStatus,
    pub outputs: Vars,
    pub error: Option<String>,
}

impl ActionOutput {
    pub fn success(outputs: Vars) -> Self {
        Self {
            status: ActionStatus::Succeeded,
            outputs,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Failed,
            outputs: Vars::new(),
            error: Some(error.into()),
        }
    }

    pub fn exception(message: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Exception,
            outputs: Vars::new(),
            error: Some(message.into()),
        }
    }

    pub fn timeout(after_secs: u64) -> Self {
        Self {
            status: ActionStatus::Timeout,
            outputs: Vars::new(),
            error: Some(format!("timed out after {}s", after_secs)),
        }
    }

    pub fn stopped() -> Self {
        Self {
            status: ActionStatus::Stopped,
            outputs: Vars::new(),
            error: Some("stopped".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_every_action_type_is_constructible() {
        let cases = [
            (ActionType::SendEmail, json!({"to": "a@b.c", "subject": "s", "body": "b"})),
            (ActionType::SendNotification, json!({"user_id": "u1", "title": "t", "message": "m"})),
            (ActionType::CreateTask, json!({"title": "call back"})),
            (ActionType::UpdateData, json!({"collection": "leads", "data": {"stage": "mql"}})),
            (ActionType::HttpRequest, json!({"url": "http://localhost/x"})),
            (ActionType::RunScript, json!({"code": "function main() { return {}; }"})),
            (ActionType::GenerateReport, json!({"report_type": "sales"})),
            (ActionType::AiAnalysis, json!({"analysis_type": "sentiment"})),
            (ActionType::SocialPost, json!({"platforms": ["linkedin"], "content": "hi"})),
            (ActionType::SlackMessage, json!({"webhook_url": "http://localhost/hook", "text": "hi"})),
            (ActionType::Delay, json!({"seconds": 1})),
        ];
        for (uses, params) in cases {
            let action = create_action(uses, params).unwrap();
            assert_eq!(action.action_type(), uses);
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(create_action(ActionType::SendEmail, json!({"subject": "no recipient"})).is_err());
        assert!(create_action(ActionType::Delay, json!({})).is_err());
        assert!(create_action(ActionType::SocialPost, json!({"platforms": [], "content": "x"})).is_err());
    }

    #[test]
    fn test_action_type_names() {
        assert_eq!(ActionType::SendEmail.as_ref(), "send_email");
        assert_eq!("ai_analysis".parse::<ActionType>().unwrap(), ActionType::AiAnalysis);
        assert!(ActionStatus::Timeout.is_retryable());
        assert!(!ActionStatus::Stopped.is_retryable());
    }
}
