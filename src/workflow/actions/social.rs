use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
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

const SOCIAL_POST_KIND: &str = "social_post";

/// Queues a post for the publishing side; with `schedule_at` it is held until then.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SocialPostAction {
    platforms: Vec<String>,
    content: String,
    #[serde(default)]
    media_urls: Vec<String>,
    #[serde(default)]
    schedule_at: Option<String>,
}

#[async_trait]
#[typetag::serde]
impl Action for SocialPostAction {
    fn create(params: serde_json::Value) -> Result<Self> {
        jsonschema::validate(&Self::schema(), &params)?;
        let action = serde_json::from_value::<Self>(params)?;
        Ok(action)
    }

    fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["platforms", "content"],
            "properties": {
                "platforms": {
                    "type": "array",
                    "minItems": 1,
                    "items": { "type": "string", "enum": ["twitter", "linkedin", "facebook", "instagram"] }
                },
                "content": { "type": "string", "minLength": 1 },
                "media_urls": { "type": "array", "items": { "type": "string" } },
                "schedule_at": { "type": ["string", "null"], "description": "RFC 3339 timestamp" }
            }
        })
    }

    fn action_type(&self) -> ActionType {
        ActionType::SocialPost
    }

    async fn run(
        &self,
        ctx: Arc<Context>,
        _aid: ActionId,
    ) -> Result<ActionOutput> {
        let data = ctx.data();
        let schedule_at = match &self.schedule_at {
            Some(raw) => {
                let resolved = template::resolve_template(&data, raw);
                match DateTime::parse_from_rfc3339(&resolved) {
                    Ok(at) => Some(at.with_timezone(&Utc)),
                    Err(err) => return Ok(ActionOutput::failed(format!("invalid schedule_at '{}': {}", resolved, err))),
                }
            }
            None => None,
        };
        let status = if schedule_at.is_some_and(|at| at > Utc::now()) { "scheduled" } else { "queued" };

        let mut post = Vars::new()
            .with("platforms", self.platforms.clone())
            .with("content", template::resolve_template(&data, &self.content))
            .with("media_urls", self.media_urls.iter().map(|u| template::resolve_template(&data, u)).collect::<Vec<_>>())
            .with("status", status);
        if let Some(at) = schedule_at {
            post.set("schedule_at", at.to_rfc3339());
        }

        let id = ctx.services().store.put_record(SOCIAL_POST_KIND, ctx.eid(), ctx.wid(), post)?;
        Ok(ActionOutput::success(Vars::new().with("post_id", id).with("status", status).with("platforms", self.platforms.clone())))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{store::query::Query, workflow::actions::ActionStatus};

    #[tokio::test]
    async fn test_post_without_schedule_is_queued() {
        let ctx = Context::for_test(Vars::new().with("post", json!({"body": "Launch day"})));
        let action = SocialPostAction::create(json!({"platforms": ["twitter", "linkedin"], "content": "{post.body}"})).unwrap();

        let output = action.run(ctx.clone(), "publish".to_string()).await.unwrap();
        assert_eq!(output.status, ActionStatus::Succeeded);
        assert_eq!(output.outputs.get::<String>("status"), Some("queued".to_string()));

        let records = ctx.services().store.records().unwrap().query(&Query::new().filter("kind", SOCIAL_POST_KIND)).unwrap();
        assert_eq!(records.count, 1);
        let post = records.rows[0].data();
        assert_eq!(post["content"], json!("Launch day"));
        assert_eq!(records.rows[0].eid, ctx.eid());
    }

    #[tokio::test]
    async fn test_future_schedule_is_scheduled() {
        let at = (Utc::now() + chrono::Duration::days(1)).to_rfc3339();
        let action = SocialPostAction::create(json!({"platforms": ["facebook"], "content": "soon", "schedule_at": at})).unwrap();

        let output = action.run(Context::for_test(Vars::new()), "publish".to_string()).await.unwrap();
        assert_eq!(output.outputs.get::<String>("status"), Some("scheduled".to_string()));
    }

    #[tokio::test]
    async fn test_past_schedule_is_queued() {
        let action = SocialPostAction::create(json!({"platforms": ["facebook"], "content": "late", "schedule_at": "2020-01-01T00:00:00Z"})).unwrap();
        let output = action.run(Context::for_test(Vars::new()), "publish".to_string()).await.unwrap();
        assert_eq!(output.outputs.get::<String>("status"), Some("queued".to_string()));
    }

    #[tokio::test]
    async fn test_bad_schedule_fails() {
        let action = SocialPostAction::create(json!({"platforms": ["twitter"], "content": "x", "schedule_at": "next tuesday"})).unwrap();
        let output = action.run(Context::for_test(Vars::new()), "publish".to_string()).await.unwrap();
        assert_eq!(output.status, ActionStatus::Failed);
        assert!(output.error.unwrap().contains("next tuesday"));
    }

    #[test]
    fn test_unknown_platform_is_rejected() {
        assert!(SocialPostAction::create(json!({"platforms": ["myspace"], "content": "x"})).is_err());
    }
}
