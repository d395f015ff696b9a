use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    Result,
    common::Vars,
    runtime::Context,
    workflow::{
        actions::{Action, ActionOutput, ActionType},
        step::ActionId,
        template,
    },
};

/// Posts to a Slack incoming webhook.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SlackMessageAction {
    webhook_url: String,
    #[serde(alias = "message")]
    text: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

#[async_trait]
#[typetag::serde]
impl Action for SlackMessageAction {
    fn create(params: serde_json::Value) -> Result<Self> {
        jsonschema::validate(&Self::schema(), &params)?;
        let action = serde_json::from_value::<Self>(params)?;
        Ok(action)
    }

    fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["webhook_url"],
            "anyOf": [{ "required": ["text"] }, { "required": ["message"] }],
            "properties": {
                "webhook_url": { "type": "string", "minLength": 1 },
                "text": { "type": "string" },
                "message": { "type": "string" },
                "channel": { "type": ["string", "null"] },
                "username": { "type": ["string", "null"] }
            }
        })
    }

    fn action_type(&self) -> ActionType {
        ActionType::SlackMessage
    }

    async fn run(
        &self,
        ctx: Arc<Context>,
        _aid: ActionId,
    ) -> Result<ActionOutput> {
        let data = ctx.data();
        let mut payload = serde_json::json!({ "text": template::resolve_template(&data, &self.text) });
        if let Some(channel) = &self.channel {
            payload["channel"] = template::resolve_template(&data, channel).into();
        }
        if let Some(username) = &self.username {
            payload["username"] = username.as_str().into();
        }

        let url = template::resolve_template(&data, &self.webhook_url);
        let res = match ctx.services().http.post(&url).json(&payload).send().await {
            Ok(res) => res,
            Err(err) => return Ok(ActionOutput::failed(format!("slack webhook error: {}", err))),
        };
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Ok(ActionOutput::failed(format!("slack webhook returned {}: {}", status.as_u16(), body)));
        }
        Ok(ActionOutput::success(Vars::new().with("status_code", status.as_u16()).with("text", payload["text"].clone())))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;
    use crate::workflow::actions::ActionStatus;

    /// Answers one webhook call with `status`, returning the raw request.
    async fn webhook(status: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = socket.read(&mut buf).await.unwrap();
            let response = format!("HTTP/1.1 {}\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok", status);
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });
        (format!("http://{}/hook", addr), handle)
    }

    #[tokio::test]
    async fn test_posts_resolved_text() {
        let (url, server) = webhook("200 OK").await;
        let ctx = Context::for_test(Vars::new().with("hook", url).with("deal", json!({"name": "Acme"})));
        let action = SlackMessageAction::create(json!({"webhook_url": "{hook}", "text": "Won {deal.name}", "channel": "#sales"})).unwrap();

        let output = action.run(ctx, "announce".to_string()).await.unwrap();
        assert_eq!(output.status, ActionStatus::Succeeded);
        assert_eq!(output.outputs.get::<String>("text"), Some("Won Acme".to_string()));

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /hook "));
        assert!(raw.contains(r##""channel":"#sales""##));
    }

    #[tokio::test]
    async fn test_non_success_status_fails() {
        let (url, server) = webhook("404 Not Found").await;
        let action = SlackMessageAction::create(json!({"webhook_url": url, "message": "hi"})).unwrap();

        let output = action.run(Context::for_test(Vars::new()), "announce".to_string()).await.unwrap();
        assert_eq!(output.status, ActionStatus::Failed);
        assert!(output.error.unwrap().contains("404"));
        server.await.unwrap();
    }

    #[test]
    fn test_text_or_message_is_required() {
        assert!(SlackMessageAction::create(json!({"webhook_url": "http://x"})).is_err());
    }
}
