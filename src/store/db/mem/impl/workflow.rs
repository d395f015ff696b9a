use std::collections::HashMap;

use serde_json::{Value as JsonValue, json};

use crate::{
    Result,
    store::{data::Workflow, db::mem::DbDocument},
};

impl DbDocument for Workflow {
    fn id(&self) -> &str {
        &self.id
    }

    fn doc(&self) -> Result<HashMap<String, JsonValue>> {
        let mut map = HashMap::new();
        map.insert("id".to_string(), json!(self.id.clone()));
        map.insert("name".to_string(), json!(self.name.clone()));
        map.insert("owner".to_string(), json!(self.owner.clone()));
        map.insert("status".to_string(), json!(self.status.clone()));
        map.insert("trigger_type".to_string(), json!(self.trigger_type.clone()));
        map.insert("run_count".to_string(), json!(self.run_count));
        map.insert("success_count".to_string(), json!(self.success_count));
        map.insert("last_run".to_string(), json!(self.last_run));
        map.insert("create_time".to_string(), json!(self.create_time));
        map.insert("update_time".to_string(), json!(self.update_time));
        Ok(map)
    }
}
