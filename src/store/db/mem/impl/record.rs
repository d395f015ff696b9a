use std::collections::HashMap;

use serde_json::{Value as JsonValue, json};

use crate::{
    Result,
    store::{data::Record, db::mem::DbDocument},
};

impl DbDocument for Record {
    fn id(&self) -> &str {
        &self.id
    }

    fn doc(&self) -> Result<HashMap<String, JsonValue>> {
        let mut map = HashMap::new();
        map.insert("id".to_string(), json!(self.id.clone()));
        map.insert("kind".to_string(), json!(self.kind.clone()));
        map.insert("eid".to_string(), json!(self.eid.clone()));
        map.insert("wid".to_string(), json!(self.wid.clone()));
        map.insert("create_time".to_string(), json!(self.create_time));
        map.insert("update_time".to_string(), json!(self.update_time));
        Ok(map)
    }
}
