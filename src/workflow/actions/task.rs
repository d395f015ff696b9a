use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
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

const TASK_KIND: &str = "task";

fn default_priority() -> String {
    "medium".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateTaskAction {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    assignee: Option<String>,
    #[serde(default = "default_priority")]
    priority: String,
    /// due date relative to the run
    #[serde(default)]
    due_in_days: Option<u32>,
}

#[async_trait]
#[typetag::serde]
impl Action for CreateTaskAction {
    fn create(params: serde_json::Value) -> Result<Self> {
        jsonschema::validate(&Self::schema(), &params)?;
        let action = serde_json::from_value::<Self>(params)?;
        Ok(action)
    }

    fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["title"],
            "properties": {
                "title": { "type": "string", "minLength": 1 },
                "description": { "type": "string" },
                "assignee": { "type": ["string", "null"] },
                "priority": { "type": "string", "enum": ["low", "medium", "high", "urgent"] },
                "due_in_days": { "type": ["integer", "null"], "minimum": 0 }
            }
        })
    }

    fn action_type(&self) -> ActionType {
        ActionType::CreateTask
    }

    async fn run(
        &self,
        ctx: Arc<Context>,
        _aid: ActionId,
    ) -> Result<ActionOutput> {
        let data = ctx.data();
        let due_date = self.due_in_days.map(|days| (Utc::now() + Duration::days(days as i64)).to_rfc3339());

        let mut task = Vars::new()
            .with("title", template::resolve_template(&data, &self.title))
            .with("description", template::resolve_template(&data, &self.description))
            .with("priority", self.priority.as_str())
            .with("status", "open");
        if let Some(assignee) = &self.assignee {
            task.set("assignee", template::resolve_template(&data, assignee));
        }
        if let Some(due) = &due_date {
            task.set("due_date", due.as_str());
        }

        let id = ctx.services().store.put_record(TASK_KIND, ctx.eid(), ctx.wid(), task)?;
        let mut outputs = Vars::new().with("task_id", id);
        if let Some(due) = due_date {
            outputs.set("due_date", due);
        }
        Ok(ActionOutput::success(outputs))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{store::query::Query, workflow::actions::ActionStatus};

    #[tokio::test]
    async fn test_writes_task_record() {
        let ctx = Context::for_test(Vars::new().with("lead", json!({"name": "Ann", "rep": "bob"})));
        let action = CreateTaskAction::create(json!({
            "title": "Call {lead.name}",
            "assignee": "{lead.rep}",
            "priority": "high",
            "due_in_days": 2
        }))
        .unwrap();

        let output = action.run(ctx.clone(), "call".to_string()).await.unwrap();
        assert_eq!(output.status, ActionStatus::Succeeded);
        assert!(output.outputs.get::<String>("due_date").is_some());

        let records = ctx.services().store.records().unwrap().query(&Query::new().filter("kind", TASK_KIND)).unwrap();
        assert_eq!(records.count, 1);
        let task = records.rows[0].data();
        assert_eq!(task["title"], json!("Call Ann"));
        assert_eq!(task["assignee"], json!("bob"));
        assert_eq!(task["priority"], json!("high"));
        assert_eq!(task["status"], json!("open"));
        assert_eq!(records.rows[0].eid, ctx.eid());
    }

    #[tokio::test]
    async fn test_defaults_without_due_date() {
        let ctx = Context::for_test(Vars::new());
        let output = CreateTaskAction::create(json!({"title": "Tidy up"})).unwrap().run(ctx.clone(), "t".to_string()).await.unwrap();
        assert!(output.outputs.get::<String>("due_date").is_none());

        let records = ctx.services().store.records().unwrap().query(&Query::new().filter("kind", TASK_KIND)).unwrap();
        assert_eq!(records.rows[0].data()["priority"], json!("medium"));
    }
}
