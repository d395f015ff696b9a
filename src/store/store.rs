use std::{
    any::Any,
    collections::HashMap,
    convert::AsRef,
    sync::{Arc, Mutex, RwLock},
};

use tracing::trace;

use crate::{
    AutoflowError, Result, ShareLock,
    common::Vars,
    model::{WorkflowModel, WorkflowStatus},
    utils,
};

use super::{DbCollection, DbCollectionIden, StoreIden, data::*};

#[derive(Clone)]
pub struct DynDbSetRef<T>(Arc<dyn DbCollection<Item = T>>);

pub struct Store {
    collections: ShareLock<HashMap<StoreIden, Arc<dyn Any + Send + Sync + 'static>>>,
    /// serializes read-modify-write of workflow counters
    counters: Mutex<()>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            counters: Mutex::new(()),
        }
    }

    pub fn collection<DATA>(&self) -> Result<Arc<dyn DbCollection<Item = DATA>>>
    where
        DATA: DbCollectionIden + Send + Sync + 'static,
    {
        let missing = || AutoflowError::Store(format!("collection {} is not registered", DATA::iden().as_ref()));
        let collections = self.collections.read().map_err(|_| AutoflowError::Store("store lock poisoned".to_string()))?;
        let collection = collections.get(&DATA::iden()).ok_or_else(missing)?;

        collection.downcast_ref::<DynDbSetRef<DATA>>().map(|v| v.0.clone()).ok_or_else(missing)
    }

    pub fn register<DATA>(
        &self,
        collection: Arc<dyn DbCollection<Item = DATA> + Send + Sync + 'static>,
    ) where
        DATA: DbCollectionIden + 'static,
    {
        if let Ok(mut collections) = self.collections.write() {
            collections.insert(DATA::iden(), Arc::new(DynDbSetRef::<DATA>(collection)));
        }
    }

    pub fn workflows(&self) -> Result<Arc<dyn DbCollection<Item = Workflow>>> {
        self.collection()
    }

    pub fn executions(&self) -> Result<Arc<dyn DbCollection<Item = Execution>>> {
        self.collection()
    }

    pub fn steps(&self) -> Result<Arc<dyn DbCollection<Item = Step>>> {
        self.collection()
    }

    pub fn logs(&self) -> Result<Arc<dyn DbCollection<Item = Log>>> {
        self.collection()
    }

    pub fn events(&self) -> Result<Arc<dyn DbCollection<Item = Event>>> {
        self.collection()
    }

    pub fn records(&self) -> Result<Arc<dyn DbCollection<Item = Record>>> {
        self.collection()
    }

    /// Upserts the workflow definition. Counters and creation time of an
    /// existing record are kept.
    pub fn deploy(
        &self,
        workflow: &WorkflowModel,
        status: WorkflowStatus,
    ) -> Result<bool> {
        trace!("store::deploy({})", workflow.id);
        if workflow.id.is_empty() {
            return Err(AutoflowError::Workflow("missing id in workflow".into()));
        }
        let _guard = self.lock_counters()?;
        let workflows = self.workflows()?;
        let now = utils::time::time_millis();
        let mut data = Workflow {
            id: workflow.id.clone(),
            name: workflow.name.clone(),
            desc: workflow.desc.clone(),
            owner: workflow.owner.clone(),
            status: status.to_string(),
            trigger_type: workflow.trigger.trigger_type.clone(),
            tags: workflow.tags.join(","),
            data: serde_json::to_string(workflow)?,
            run_count: 0,
            success_count: 0,
            last_run: 0,
            create_time: now,
            update_time: 0,
        };
        match workflows.find(&workflow.id) {
            Ok(m) => {
                data.run_count = m.run_count;
                data.success_count = m.success_count;
                data.last_run = m.last_run;
                data.create_time = m.create_time;
                data.update_time = now;
                workflows.update(&data)
            }
            Err(AutoflowError::NotFound(_)) => workflows.create(&data),
            Err(err) => Err(err),
        }
    }

    pub fn set_workflow_status(
        &self,
        wid: &str,
        status: WorkflowStatus,
    ) -> Result<()> {
        let _guard = self.lock_counters()?;
        let workflows = self.workflows()?;
        let mut workflow = workflows.find(wid)?;
        workflow.status = status.to_string();
        workflow.update_time = utils::time::time_millis();
        workflows.update(&workflow)?;
        Ok(())
    }

    /// Counts a started run.
    pub fn record_run(
        &self,
        wid: &str,
        at: i64,
    ) -> Result<()> {
        self.bump(wid, |w| {
            w.run_count += 1;
            w.last_run = at;
        })
    }

    /// Counts a run that completed.
    pub fn record_success(
        &self,
        wid: &str,
    ) -> Result<()> {
        self.bump(wid, |w| w.success_count += 1)
    }

    fn bump(
        &self,
        wid: &str,
        f: impl FnOnce(&mut Workflow),
    ) -> Result<()> {
        let _guard = self.lock_counters()?;
        let workflows = self.workflows()?;
        let mut workflow = workflows.find(wid)?;
        f(&mut workflow);
        workflows.update(&workflow)?;
        Ok(())
    }

    fn lock_counters(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.counters.lock().map_err(|_| AutoflowError::Store("counter lock poisoned".to_string()))
    }

    /// Stores a new record of `kind` and returns its id.
    pub fn put_record(
        &self,
        kind: &str,
        eid: &str,
        wid: &str,
        data: Vars,
    ) -> Result<String> {
        let now = utils::time::time_millis();
        let record = Record {
            id: utils::longid(),
            kind: kind.to_string(),
            eid: eid.to_string(),
            wid: wid.to_string(),
            data: serde_json::to_string(&data)?,
            create_time: now,
            update_time: 0,
        };
        self.records()?.create(&record)?;
        Ok(record.id)
    }

    /// Merges `patch` into the record `id` of `kind`, creating it when
    /// absent. Without an id a new record is always created.
    pub fn upsert_record(
        &self,
        kind: &str,
        id: Option<&str>,
        eid: &str,
        wid: &str,
        patch: Vars,
    ) -> Result<Record> {
        let records = self.records()?;
        let now = utils::time::time_millis();

        if let Some(id) = id {
            match records.find(id) {
                Ok(mut record) if record.kind == kind => {
                    let mut data = Vars::from(record.data());
                    data.merge(patch.clone());
                    record.data = serde_json::to_string(&data)?;
                    record.eid = eid.to_string();
                    record.update_time = now;
                    records.update(&record)?;
                    return Ok(record);
                }
                Ok(record) => {
                    return Err(AutoflowError::Store(format!("record {} belongs to {}, not {}", id, record.kind, kind)));
                }
                Err(AutoflowError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }

        let record = Record {
            id: id.map(str::to_string).unwrap_or_else(utils::longid),
            kind: kind.to_string(),
            eid: eid.to_string(),
            wid: wid.to_string(),
            data: serde_json::to_string(&patch)?,
            create_time: now,
            update_time: 0,
        };
        records.create(&record)?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::{DbStore, MemStore, query::Query};

    fn store() -> Store {
        let store = Store::new();
        MemStore::new().init(&store).unwrap();
        store
    }

    fn model(id: &str) -> WorkflowModel {
        serde_json::from_value(json!({
            "id": id,
            "name": "nurture",
            "owner": "u1",
            "tags": ["sales", "email"],
            "trigger": {"type": "user_action"},
            "steps": [{"id": "s1", "actions": [{"id": "a1", "type": "delay", "config": {"seconds": 0}}]}]
        }))
        .unwrap()
    }

    #[test]
    fn test_unregistered_collection_is_an_error() {
        let store = Store::new();
        assert!(matches!(store.workflows().err(), Some(AutoflowError::Store(_))));
    }

    #[test]
    fn test_redeploy_keeps_counters() {
        let store = store();
        store.deploy(&model("wf1"), WorkflowStatus::Active).unwrap();
        store.record_run("wf1", 42).unwrap();
        store.record_success("wf1").unwrap();

        let mut changed = model("wf1");
        changed.name = "renamed".into();
        store.deploy(&changed, WorkflowStatus::Active).unwrap();

        let w = store.workflows().unwrap().find("wf1").unwrap();
        assert_eq!(w.name, "renamed");
        assert_eq!(w.run_count, 1);
        assert_eq!(w.success_count, 1);
        assert_eq!(w.last_run, 42);
        assert_eq!(w.tags, "sales,email");
        assert!(w.update_time > 0);
    }

    #[test]
    fn test_concurrent_runs_keep_every_increment() {
        let store = Arc::new(store());
        store.deploy(&model("wf1"), WorkflowStatus::Active).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        store.record_run("wf1", 1).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.workflows().unwrap().find("wf1").unwrap().run_count, 200);
    }

    #[test]
    fn test_status_change() {
        let store = store();
        store.deploy(&model("wf1"), WorkflowStatus::Active).unwrap();
        store.set_workflow_status("wf1", WorkflowStatus::Paused).unwrap();
        let page = store.workflows().unwrap().query(&Query::new().filter("status", "paused")).unwrap();
        assert_eq!(page.count, 1);
        assert!(store.set_workflow_status("nope", WorkflowStatus::Paused).is_err());
    }

    #[test]
    fn test_upsert_record_merges() {
        let store = store();
        let created = store.upsert_record("contacts", Some("c1"), "e1", "wf1", Vars::new().with("name", "Ada").with("stage", "lead")).unwrap();
        assert_eq!(created.id, "c1");

        let updated = store.upsert_record("contacts", Some("c1"), "e2", "wf1", Vars::new().with("stage", "customer")).unwrap();
        assert_eq!(updated.data(), json!({"name": "Ada", "stage": "customer"}));
        assert_eq!(updated.eid, "e2");

        let other = store.upsert_record("contacts", None, "e3", "wf1", Vars::new().with("name", "Bob")).unwrap();
        assert_ne!(other.id, "c1");
        assert!(store.upsert_record("tasks", Some("c1"), "e4", "wf1", Vars::new()).is_err());
    }

    #[test]
    fn test_put_record() {
        let store = store();
        let id = store.put_record("task", "e1", "wf1", Vars::new().with("title", "Call")).unwrap();
        let record = store.records().unwrap().find(&id).unwrap();
        assert_eq!(record.kind, "task");
        assert_eq!(record.data()["title"], json!("Call"));
    }
}
