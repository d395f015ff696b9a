use serde::{Deserialize, Serialize};

use crate::store::{DbCollectionIden, StoreIden};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub desc: String,
    pub owner: String,
    pub status: String,
    pub trigger_type: String,
    /// comma separated
    pub tags: String,
    /// the workflow model as JSON text
    pub data: String,
    pub run_count: i64,
    pub success_count: i64,
    pub last_run: i64,
    pub create_time: i64,
    pub update_time: i64,
}

impl DbCollectionIden for Workflow {
    fn iden() -> StoreIden {
        StoreIden::Workflows
    }
}
