use std::sync::Arc;

use tokio::runtime::Runtime;
use tracing::info;

use crate::{
    Result,
    store::{DbCollection, DbStore, Store, data::*},
};

use super::{
    DbInit,
    collection::{self, *},
    synclient::SynClient,
};

pub struct PostgresStore {
    workflows: Arc<WorkflowCollection>,
    executions: Arc<ExecutionCollection>,
    steps: Arc<StepCollection>,
    logs: Arc<LogCollection>,
    events: Arc<EventCollection>,
    records: Arc<RecordCollection>,
}

impl DbStore for PostgresStore {
    fn init(
        &self,
        s: &Store,
    ) -> Result<()> {
        self.workflows.init()?;
        self.executions.init()?;
        self.steps.init()?;
        self.logs.init()?;
        self.events.init()?;
        self.records.init()?;
        info!("postgres tables ready");

        s.register(self.workflows());
        s.register(self.executions());
        s.register(self.steps());
        s.register(self.logs());
        s.register(self.events());
        s.register(self.records());
        Ok(())
    }
}

impl PostgresStore {
    pub fn new(
        db_url: &str,
        runtime: Arc<Runtime>,
    ) -> Result<Self> {
        let conn = Arc::new(SynClient::connect(db_url, runtime.clone()).map_err(collection::map_db_err)?);

        Ok(Self {
            workflows: Arc::new(WorkflowCollection::new(&conn)),
            executions: Arc::new(ExecutionCollection::new(&conn)),
            steps: Arc::new(StepCollection::new(&conn)),
            logs: Arc::new(LogCollection::new(&conn, &runtime)),
            events: Arc::new(EventCollection::new(&conn, &runtime)),
            records: Arc::new(RecordCollection::new(&conn)),
        })
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
