use std::sync::{
    Arc, RwLock,
    atomic::{AtomicBool, Ordering},
};

use crate::{
    ShareLock,
    common::{Shutdown, Vars},
    events::{GraphEvent, Log, Message},
    runtime::{Channel, ExecutionId},
    services::Services,
    utils,
    workflow::step::ActionId,
};

/// State shared by every action of one execution.
pub struct Context {
    eid: ExecutionId,
    wid: String,
    /// the execution data placeholders resolve against
    data: ShareLock<Vars>,
    channel: Arc<Channel>,
    services: Arc<Services>,

    finished: AtomicBool,
    shutdown: Arc<Shutdown>,
}

impl Context {
    pub(crate) fn new(
        eid: ExecutionId,
        wid: String,
        data: Vars,
        channel: Arc<Channel>,
        services: Arc<Services>,
    ) -> Self {
        Self {
            eid,
            wid,
            data: Arc::new(RwLock::new(data)),
            channel,
            services,
            finished: AtomicBool::new(false),
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    pub fn eid(&self) -> &str {
        &self.eid
    }

    pub fn wid(&self) -> &str {
        &self.wid
    }

    /// Snapshot of the execution data.
    pub fn data(&self) -> Vars {
        self.data.read().map(|d| d.clone()).unwrap_or_default()
    }

    /// Stores an action's outputs under its id.
    pub fn set_output(
        &self,
        aid: &str,
        outputs: Vars,
    ) {
        if let Ok(mut data) = self.data.write() {
            data.set(aid, outputs);
        }
    }

    pub(crate) fn services(&self) -> &Services {
        &self.services
    }

    /// Publishes an event of this execution; `sid` is empty for
    /// execution-level events.
    pub(crate) fn emit(
        &self,
        sid: &str,
        event: GraphEvent,
    ) {
        self.channel.emit(Message {
            eid: self.eid.clone(),
            wid: self.wid.clone(),
            sid: sid.to_string(),
            event,
        });
    }

    pub fn emit_log(
        &self,
        aid: &str,
        content: String,
    ) {
        self.channel.emit_log(Log {
            eid: self.eid.clone(),
            aid: ActionId::from(aid),
            content,
            timestamp: utils::time::time_millis(),
        });
    }

    /// True for exactly one caller; that caller publishes the terminal event.
    pub(crate) fn try_finish(&self) -> bool {
        !self.finished.swap(true, Ordering::SeqCst)
    }

    /// Stops the execution; running actions observe it through
    /// [`Context::wait_shutdown`].
    pub fn done(&self) {
        self.shutdown.shutdown();
    }

    pub fn is_done(&self) -> bool {
        self.shutdown.is_terminated()
    }

    pub fn wait_shutdown(&self) -> impl Future<Output = ()> + Send + 'static {
        self.shutdown.wait()
    }
}

#[cfg(test)]
impl Context {
    /// Context over an in-memory store, for exercising actions directly.
    pub(crate) fn for_test(data: Vars) -> Arc<Self> {
        use crate::store::{DbStore, MemStore, Store};

        let store = Arc::new(Store::new());
        MemStore::new().init(&store).unwrap();
        Self::for_test_with(data, Services::new(store))
    }

    pub(crate) fn for_test_with(
        data: Vars,
        services: Services,
    ) -> Arc<Self> {
        let channel = Arc::new(Channel::new(tokio::runtime::Handle::current()));
        Arc::new(Self::new("test-exec".to_string(), "test-wf".to_string(), data, channel, Arc::new(services)))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_outputs_are_visible_to_later_reads() {
        let ctx = Context::for_test(Vars::new().with("name", "Ada"));
        let before = ctx.data();
        ctx.set_output("a1", Vars::new().with("status_code", 200));

        assert!(before.get::<serde_json::Value>("a1").is_none());
        assert_eq!(ctx.data().lookup("a1.status_code"), Some(&json!(200)));
        assert_eq!(ctx.data().get::<String>("name"), Some("Ada".to_string()));
    }

    #[tokio::test]
    async fn test_only_first_finish_wins() {
        let ctx = Context::for_test(Vars::new());
        assert!(ctx.try_finish());
        assert!(!ctx.try_finish());
    }

    #[tokio::test]
    async fn test_done_releases_waiters() {
        let ctx = Context::for_test(Vars::new());
        let wait = ctx.wait_shutdown();
        assert!(!ctx.is_done());
        ctx.done();
        wait.await;
        assert!(ctx.is_done());
    }
}
