use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
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

const REPORT_KIND: &str = "report";

fn default_period() -> String {
    "weekly".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GenerateReportAction {
    report_type: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default = "default_period")]
    period: String,
    #[serde(default)]
    parameters: serde_json::Value,
}

#[async_trait]
#[typetag::serde]
impl Action for GenerateReportAction {
    fn create(params: serde_json::Value) -> Result<Self> {
        jsonschema::validate(&Self::schema(), &params)?;
        let action = serde_json::from_value::<Self>(params)?;
        Ok(action)
    }

    fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["report_type"],
            "properties": {
                "report_type": { "type": "string", "minLength": 1 },
                "title": { "type": ["string", "null"] },
                "period": { "type": "string", "enum": ["daily", "weekly", "monthly", "quarterly", "yearly"] },
                "parameters": { "type": ["object", "null"] }
            }
        })
    }

    fn action_type(&self) -> ActionType {
        ActionType::GenerateReport
    }

    async fn run(
        &self,
        ctx: Arc<Context>,
        _aid: ActionId,
    ) -> Result<ActionOutput> {
        let data = ctx.data();
        let title = match &self.title {
            Some(title) => template::resolve_template(&data, title),
            None => format!("{} report ({})", self.report_type, self.period),
        };
        let generated_at = Utc::now().to_rfc3339();
        let report = Vars::new()
            .with("report_type", self.report_type.as_str())
            .with("title", title.as_str())
            .with("period", self.period.as_str())
            .with("parameters", template::resolve_json_value(&data, &self.parameters))
            .with("status", "generated")
            .with("generated_at", generated_at.as_str());

        let id = ctx.services().store.put_record(REPORT_KIND, ctx.eid(), ctx.wid(), report)?;
        Ok(ActionOutput::success(
            Vars::new().with("report_id", id).with("report_type", self.report_type.as_str()).with("title", title).with("generated_at", generated_at),
        ))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{store::query::Query, workflow::actions::ActionStatus};

    #[tokio::test]
    async fn test_writes_report_record() {
        let ctx = Context::for_test(Vars::new().with("region", "emea"));
        let action = GenerateReportAction::create(json!({
            "report_type": "sales",
            "period": "monthly",
            "parameters": {"region": "{region}"}
        }))
        .unwrap();

        let output = action.run(ctx.clone(), "report".to_string()).await.unwrap();
        assert_eq!(output.status, ActionStatus::Succeeded);
        assert_eq!(output.outputs.get::<String>("title"), Some("sales report (monthly)".to_string()));

        let records = ctx.services().store.records().unwrap().query(&Query::new().filter("kind", REPORT_KIND)).unwrap();
        assert_eq!(records.count, 1);
        assert_eq!(Some(records.rows[0].id.clone()), output.outputs.get::<String>("report_id"));
        let report = records.rows[0].data();
        assert_eq!(report["parameters"], json!({"region": "emea"}));
        assert_eq!(report["status"], json!("generated"));
    }

    #[test]
    fn test_unknown_period_is_rejected() {
        assert!(GenerateReportAction::create(json!({"report_type": "sales", "period": "hourly"})).is_err());
    }
}
