use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::{DbCollectionIden, StoreIden};

/// Document written by an action, e.g. a task or a report.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Record {
    pub id: String,
    /// `task`, `report`, `email`, or the collection named by `update_data`
    pub kind: String,
    pub eid: String,
    pub wid: String,
    /// JSON object text
    pub data: String,
    pub create_time: i64,
    pub update_time: i64,
}

impl Record {
    pub fn data(&self) -> Value {
        serde_json::from_str(&self.data).unwrap_or(Value::Null)
    }
}

impl DbCollectionIden for Record {
    fn iden() -> StoreIden {
        StoreIden::Records
    }
}
