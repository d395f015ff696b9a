use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    Result,
    common::Vars,
    runtime::Context,
    services::Email,
    workflow::{
        actions::{Action, ActionOutput, ActionType},
        step::ActionId,
        template,
    },
};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SendEmailAction {
    to: String,
    subject: String,
    #[serde(default)]
    body: String,
}

#[async_trait]
#[typetag::serde]
impl Action for SendEmailAction {
    fn create(params: serde_json::Value) -> Result<Self> {
        jsonschema::validate(&Self::schema(), &params)?;
        let action = serde_json::from_value::<Self>(params)?;
        Ok(action)
    }

    fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["to", "subject"],
            "properties": {
                "to": { "type": "string", "minLength": 1, "description": "Recipient address, supports {placeholders}" },
                "subject": { "type": "string" },
                "body": { "type": "string" }
            }
        })
    }

    fn action_type(&self) -> ActionType {
        ActionType::SendEmail
    }

    async fn run(
        &self,
        ctx: Arc<Context>,
        aid: ActionId,
    ) -> Result<ActionOutput> {
        let data = ctx.data();
        let email = Email {
            to: template::resolve_template(&data, &self.to),
            subject: template::resolve_template(&data, &self.subject),
            body: template::resolve_template(&data, &self.body),
            execution_id: ctx.eid().to_string(),
            workflow_id: ctx.wid().to_string(),
        };
        if email.to.trim().is_empty() {
            return Ok(ActionOutput::failed("email recipient resolved to an empty address"));
        }

        match ctx.services().mailer.send(&email).await {
            Ok(message_id) => {
                ctx.emit_log(&aid, format!("email '{}' sent to {}", email.subject, email.to));
                Ok(ActionOutput::success(Vars::new().with("message_id", message_id).with("to", email.to).with("subject", email.subject)))
            }
            Err(err) => Ok(ActionOutput::failed(format!("failed to send email to {}: {}", email.to, err))),
        }
    }
}
