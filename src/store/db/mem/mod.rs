mod collect;
mod r#impl;

use std::{collections::HashMap, sync::Arc};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value as JsonValue;

use crate::{
    Result,
    store::{DbCollection, DbStore, Store, data::*},
};
use collect::Collect;

#[derive(Debug, Clone)]
pub struct MemStore {
    workflows: Arc<Collect<Workflow>>,
    executions: Arc<Collect<Execution>>,
    steps: Arc<Collect<Step>>,
    logs: Arc<Collect<Log>>,
    events: Arc<Collect<Event>>,
    records: Arc<Collect<Record>>,
}

/// A row of an in-memory collection. `doc` exposes the fields queries may
/// filter and sort on.
pub(crate) trait DbDocument: Serialize + DeserializeOwned {
    fn id(&self) -> &str;
    fn doc(&self) -> Result<HashMap<String, JsonValue>>;
}

impl DbStore for MemStore {
    fn init(
        &self,
        s: &Store,
    ) -> Result<()> {
        s.register(self.workflows());
        s.register(self.executions());
        s.register(self.steps());
        s.register(self.logs());
        s.register(self.events());
        s.register(self.records());
        Ok(())
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            workflows: Arc::new(Collect::new("workflows")),
            executions: Arc::new(Collect::new("executions")),
            steps: Arc::new(Collect::new("steps")),
            logs: Arc::new(Collect::new("logs")),
            events: Arc::new(Collect::new("events")),
            records: Arc::new(Collect::new("records")),
        }
    }

    pub fn workflows(&self) -> Arc<dyn DbCollection<Item = Workflow> + Send + Sync> {
        self.workflows.clone()
    }

    pub fn executions(&self) -> Arc<dyn DbCollection<Item = Execution> + Send + Sync> {
        self.executions.clone()
    }

    pub fn steps(&self) -> Arc<dyn DbCollection<Item = Step> + Send + Sync> {
        self.steps.clone()
    }

    pub fn logs(&self) -> Arc<dyn DbCollection<Item = Log> + Send + Sync> {
        self.logs.clone()
    }

    pub fn events(&self) -> Arc<dyn DbCollection<Item = Event> + Send + Sync> {
        self.events.clone()
    }

    pub fn records(&self) -> Arc<dyn DbCollection<Item = Record> + Send + Sync> {
        self.records.clone()
    }
}
