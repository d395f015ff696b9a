use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    Result,
    common::Vars,
    runtime::Context,
    services::Notification,
    workflow::{
        actions::{Action, ActionOutput, ActionType},
        step::ActionId,
        template,
    },
};

fn default_kind() -> String {
    "info".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SendNotificationAction {
    user_id: String,
    title: String,
    #[serde(default)]
    message: String,
    #[serde(rename = "type", default = "default_kind")]
    kind: String,
}

#[async_trait]
#[typetag::serde]
impl Action for SendNotificationAction {
    fn create(params: serde_json::Value) -> Result<Self> {
        jsonschema::validate(&Self::schema(), &params)?;
        let action = serde_json::from_value::<Self>(params)?;
        Ok(action)
    }

    fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["user_id", "title"],
            "properties": {
                "user_id": { "type": "string", "minLength": 1 },
                "title": { "type": "string" },
                "message": { "type": "string" },
                "type": { "type": "string", "enum": ["info", "success", "warning", "error"] }
            }
        })
    }

    fn action_type(&self) -> ActionType {
        ActionType::SendNotification
    }

    async fn run(
        &self,
        ctx: Arc<Context>,
        _aid: ActionId,
    ) -> Result<ActionOutput> {
        let data = ctx.data();
        let notification = Notification {
            user_id: template::resolve_template(&data, &self.user_id),
            title: template::resolve_template(&data, &self.title),
            message: template::resolve_template(&data, &self.message),
            kind: self.kind.clone(),
            execution_id: ctx.eid().to_string(),
            workflow_id: ctx.wid().to_string(),
        };

        match ctx.services().notifier.notify(&notification).await {
            Ok(id) => Ok(ActionOutput::success(Vars::new().with("notification_id", id).with("user_id", notification.user_id))),
            Err(err) => Ok(ActionOutput::failed(format!("failed to notify {}: {}", notification.user_id, err))),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{store::query::Query, workflow::actions::ActionStatus};

    #[tokio::test]
    async fn test_writes_notification_record() {
        let ctx = Context::for_test(Vars::new().with("owner", "u-9").with("deal", "Acme"));
        let action = SendNotificationAction::create(json!({"user_id": "{owner}", "title": "{deal} closed", "type": "success"})).unwrap();

        let output = action.run(ctx.clone(), "ping".to_string()).await.unwrap();
        assert_eq!(output.status, ActionStatus::Succeeded);
        assert_eq!(output.outputs.get::<String>("user_id"), Some("u-9".to_string()));

        let records = ctx.services().store.records().unwrap().query(&Query::new().filter("kind", "notification")).unwrap();
        assert_eq!(records.count, 1);
        let record = &records.rows[0];
        assert_eq!(Some(record.id.clone()), output.outputs.get::<String>("notification_id"));
        assert_eq!((record.eid.as_str(), record.wid.as_str()), (ctx.eid(), ctx.wid()));
        assert_eq!(record.data()["title"], json!("Acme closed"));
        assert_eq!(record.data()["read"], json!(false));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(SendNotificationAction::create(json!({"user_id": "u", "title": "t", "type": "shout"})).is_err());
    }
}
