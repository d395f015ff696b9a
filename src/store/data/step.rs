use serde::{Deserialize, Serialize};

use crate::store::{DbCollectionIden, StoreIden};

/// One pass of an execution through a step; a looping execution stores one
/// row per pass, told apart by `seq`.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Step {
    pub id: String,
    pub eid: String,
    pub sid: String,
    pub seq: i64,

    pub name: String,
    pub state: String,
    /// step result as JSON text, empty while running
    pub data: String,
    pub err: Option<String>,
    pub start_time: i64,
    pub end_time: i64,
    pub timestamp: i64,
}

impl Step {
    pub fn key(
        eid: &str,
        seq: usize,
    ) -> String {
        format!("{}-{:05}", eid, seq)
    }
}

impl DbCollectionIden for Step {
    fn iden() -> StoreIden {
        StoreIden::Steps
    }
}
