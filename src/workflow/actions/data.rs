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

/// Upserts a document in a named collection of the record store.
///
/// Without `record_id` a new record is created; otherwise `data` is merged
/// into the existing record (or a record with that id is created).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpdateDataAction {
    collection: String,
    #[serde(default)]
    record_id: Option<String>,
    data: serde_json::Value,
}

#[async_trait]
#[typetag::serde]
impl Action for UpdateDataAction {
    fn create(params: serde_json::Value) -> Result<Self> {
        jsonschema::validate(&Self::schema(), &params)?;
        let action = serde_json::from_value::<Self>(params)?;
        Ok(action)
    }

    fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["collection", "data"],
            "properties": {
                "collection": { "type": "string", "minLength": 1 },
                "record_id": { "type": ["string", "null"] },
                "data": { "type": "object" }
            }
        })
    }

    fn action_type(&self) -> ActionType {
        ActionType::UpdateData
    }

    async fn run(
        &self,
        ctx: Arc<Context>,
        _aid: ActionId,
    ) -> Result<ActionOutput> {
        let vars = ctx.data();
        let collection = template::resolve_template(&vars, &self.collection);
        let record_id = self.record_id.as_ref().map(|id| template::resolve_template(&vars, id)).filter(|id| !id.is_empty());
        let patch = Vars::from(template::resolve_json_value(&vars, &self.data));

        let record = ctx.services().store.upsert_record(&collection, record_id.as_deref(), ctx.eid(), ctx.wid(), patch)?;
        Ok(ActionOutput::success(
            Vars::new().with("record_id", record.id.as_str()).with("collection", collection).with("data", record.data()),
        ))
    }
}
