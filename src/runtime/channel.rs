use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use globset::{Glob, GlobMatcher};
use tokio::runtime::Handle;
use tracing::warn;

use crate::{
    ShareLock,
    common::{BroadcastQueue, Shutdown},
    events::{Event, Log, Message},
    runtime::ExecutionId,
};

macro_rules! dispatch_event {
    ($handles:expr, $(&$item:ident), +) => {
        let handlers = $handles.read().map(|h| h.clone()).unwrap_or_default();
        for handle in handlers.iter() {
            (handle)($(&$item),+);
        }
    };
}

macro_rules! dispatch_event_async {
    ($handles:expr, $(&$item:ident), +) => {
        let handles = $handles.clone();

        tokio::spawn(async move {
            let handlers = handles.read().map(|h| h.clone()).unwrap_or_default();
            for handle in handlers.iter() {
                (handle)($(&$item),+).await;
            }
        });
    };
}

const EVENT_QUEUE_SIZE: usize = 2048;
const LOG_QUEUE_SIZE: usize = 4096;

pub type WorkflowEventHandle = Arc<dyn Fn(&Event<Message>) + Send + Sync>;
pub type WorkflowLogHandle = Arc<dyn Fn(&Event<Log>) + Send + Sync>;
pub type WorkflowEventHandleAsync = Arc<dyn Fn(&Event<Message>) -> BoxFuture<'static, ()> + Send + Sync>;
pub type WorkflowLogHandleAsync = Arc<dyn Fn(&Event<Log>) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// glob over the execution id, eg. `V1StGX*`
    pub eid: String,

    /// glob over the step id of events, eg. `notify_*`; logs carry no step
    /// and are matched on `eid` alone
    pub sid: String,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            eid: "*".to_string(),
            sid: "*".to_string(),
        }
    }
}

impl ChannelOptions {
    pub fn new(
        eid: &str,
        sid: &str,
    ) -> Self {
        Self {
            eid: eid.to_string(),
            sid: sid.to_string(),
        }
    }

    pub fn with_eid(eid: &str) -> Self {
        Self::new(eid, "*")
    }

    pub fn with_sid(sid: &str) -> Self {
        Self::new("*", sid)
    }
}

#[derive(Clone)]
pub struct Channel {
    event_queue: Arc<BroadcastQueue<Event<Message>>>,
    log_queue: Arc<BroadcastQueue<Event<Log>>>,

    events: ShareLock<Vec<WorkflowEventHandle>>,
    logs: ShareLock<Vec<WorkflowLogHandle>>,
    events_async: ShareLock<Vec<WorkflowEventHandleAsync>>,
    logs_async: ShareLock<Vec<WorkflowLogHandleAsync>>,

    handle: Handle,
    shutdown: Arc<Shutdown>,
}

impl Channel {
    pub(crate) fn new(handle: Handle) -> Self {
        Self {
            event_queue: BroadcastQueue::new(EVENT_QUEUE_SIZE),
            log_queue: BroadcastQueue::new(LOG_QUEUE_SIZE),
            events: Arc::new(RwLock::new(Vec::new())),
            logs: Arc::new(RwLock::new(Vec::new())),
            events_async: Arc::new(RwLock::new(Vec::new())),
            logs_async: Arc::new(RwLock::new(Vec::new())),
            handle,
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    pub(crate) fn emit(
        &self,
        message: Message,
    ) {
        let _ = self.event_queue.send(Event::new(&message));
    }

    pub(crate) fn emit_log(
        &self,
        log: Log,
    ) {
        let _ = self.log_queue.send(Event::new(&log));
    }

    pub(crate) fn log_queue(&self) -> Arc<BroadcastQueue<Event<Log>>> {
        self.log_queue.clone()
    }

    pub(crate) fn event_queue(&self) -> Arc<BroadcastQueue<Event<Message>>> {
        self.event_queue.clone()
    }

    pub(crate) fn listen(&self) {
        let mut event_queue = self.event_queue.subscribe();
        let mut log_queue = self.log_queue.subscribe();
        let events = self.events.clone();
        let logs = self.logs.clone();
        let events_async = self.events_async.clone();
        let logs_async = self.logs_async.clone();

        let shutdown = self.shutdown.clone();
        self.handle.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    Ok(e) = event_queue.recv() => {
                        let evt = e.clone();
                        dispatch_event!(events, &evt);
                        dispatch_event_async!(events_async, &e);
                    }
                    Ok(log) = log_queue.recv() => {
                        let l = log.clone();
                        dispatch_event!(logs, &l);
                        dispatch_event_async!(logs_async, &log);
                    }
                }
            }
        });
    }

    pub(crate) fn shutdown(&self) {
        self.shutdown.shutdown();
    }
}

/// Glob pattern, or the literal text when the pattern does not compile.
#[derive(Clone, Debug)]
enum Pattern {
    Glob(GlobMatcher),
    Exact(String),
}

impl Pattern {
    fn new(pattern: &str) -> Self {
        match Glob::new(pattern) {
            Ok(glob) => Pattern::Glob(glob.compile_matcher()),
            Err(err) => {
                warn!("invalid channel pattern '{}', matching literally: {}", pattern, err);
                Pattern::Exact(pattern.to_string())
            }
        }
    }

    fn is_match(
        &self,
        value: &str,
    ) -> bool {
        match self {
            Pattern::Glob(glob) => glob.is_match(value),
            Pattern::Exact(text) => text == value,
        }
    }
}

#[derive(Clone)]
pub struct ChannelEvent {
    channel: Arc<Channel>,

    patterns: (Pattern, Pattern),
}

impl ChannelEvent {
    pub fn channel(
        channel: Arc<Channel>,
        options: ChannelOptions,
    ) -> Self {
        Self {
            channel,
            patterns: (Pattern::new(&options.eid), Pattern::new(&options.sid)),
        }
    }

    fn push_event(
        &self,
        handle: WorkflowEventHandle,
    ) {
        if let Ok(mut events) = self.channel.events.write() {
            events.push(handle);
        }
    }

    /// Called with the execution id when an execution succeeds.
    pub fn on_complete(
        &self,
        f: impl Fn(ExecutionId) + Send + Sync + 'static,
    ) {
        let patterns = self.patterns.clone();
        self.push_event(Arc::new(move |e| {
            if e.event.is_complete() && is_match(&patterns, e) {
                f(e.eid.clone());
            }
        }));
    }

    pub fn on_error(
        &self,
        f: impl Fn(&Event<Message>) + Send + Sync + 'static,
    ) {
        let patterns = self.patterns.clone();
        self.push_event(Arc::new(move |e| {
            if e.event.is_error() && is_match(&patterns, e) {
                f(e);
            }
        }));
    }

    /// Called once per execution when it succeeds, fails or is aborted.
    pub fn on_finish(
        &self,
        f: impl Fn(&Event<Message>) + Send + Sync + 'static,
    ) {
        let patterns = self.patterns.clone();
        self.push_event(Arc::new(move |e| {
            if e.event.is_terminal() && is_match(&patterns, e) {
                f(e);
            }
        }));
    }

    pub fn on_event(
        &self,
        f: impl Fn(&Event<Message>) + Send + Sync + 'static,
    ) {
        let patterns = self.patterns.clone();
        self.push_event(Arc::new(move |e| {
            if is_match(&patterns, e) {
                f(e);
            }
        }));
    }

    pub fn on_log(
        &self,
        f: impl Fn(&Event<Log>) + Send + Sync + 'static,
    ) {
        let patterns = self.patterns.clone();
        if let Ok(mut logs) = self.channel.logs.write() {
            logs.push(Arc::new(move |e| {
                if patterns.0.is_match(&e.eid) {
                    f(e);
                }
            }));
        }
    }

    pub fn on_event_async<F>(
        &self,
        f: F,
    ) where
        F: Fn(&Event<Message>) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let patterns = self.patterns.clone();
        if let Ok(mut events) = self.channel.events_async.write() {
            events.push(Arc::new(move |e| {
                if is_match(&patterns, e) {
                    f(e)
                } else {
                    Box::pin(async {})
                }
            }));
        }
    }

    pub fn on_log_async<F>(
        &self,
        f: F,
    ) where
        F: Fn(&Event<Log>) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let patterns = self.patterns.clone();
        if let Ok(mut logs) = self.channel.logs_async.write() {
            logs.push(Arc::new(move |e| {
                if patterns.0.is_match(&e.eid) {
                    f(e)
                } else {
                    Box::pin(async {})
                }
            }));
        }
    }
}

fn is_match(
    patterns: &(Pattern, Pattern),
    e: &Event<Message>,
) -> bool {
    let (pat_eid, pat_sid) = patterns;
    pat_eid.is_match(&e.eid) && pat_sid.is_match(&e.sid)
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;
    use crate::{common::Vars, events::GraphEvent, events::WorkflowEvent};

    fn message(
        eid: &str,
        sid: &str,
        event: WorkflowEvent,
    ) -> Message {
        Message {
            eid: eid.to_string(),
            wid: "wf".to_string(),
            sid: sid.to_string(),
            event: GraphEvent::Workflow(event),
        }
    }

    #[test]
    fn test_pattern_falls_back_to_literal() {
        let pattern = Pattern::new("a[b");
        assert!(pattern.is_match("a[b"));
        assert!(!pattern.is_match("ab"));
        assert!(Pattern::new("exe*").is_match("exe-42"));
    }

    #[tokio::test]
    async fn test_handlers_filter_by_execution() {
        let channel = Arc::new(Channel::new(Handle::current()));
        let finished = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));

        let f = finished.clone();
        ChannelEvent::channel(channel.clone(), ChannelOptions::with_eid("e1")).on_finish(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });
        let c = completed.clone();
        ChannelEvent::channel(channel.clone(), ChannelOptions::default()).on_complete(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        channel.listen();

        channel.emit(message("e1", "", WorkflowEvent::Start));
        channel.emit(message("e1", "", WorkflowEvent::Succeeded { data: Vars::new() }));
        channel.emit(message("e2", "", WorkflowEvent::Aborted { reason: "stop".into(), data: Vars::new() }));
        channel.emit(message("e3", "", WorkflowEvent::Succeeded { data: Vars::new() }));

        tokio::time::sleep(Duration::from_millis(100)).await;
        channel.shutdown();
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(completed.load(Ordering::SeqCst), 2);
    }
}
