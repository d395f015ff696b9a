//! Integrations the actions talk to.
//!
//! Mail, in-app notifications and AI analysis are traits so an embedder can
//! plug in a real provider. The defaults write what they would have sent to
//! the record store.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{Result, common::Vars, store::Store};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// execution and workflow that sent it
    #[serde(default)]
    pub execution_id: String,
    #[serde(default)]
    pub workflow_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Notification {
    pub user_id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub execution_id: String,
    #[serde(default)]
    pub workflow_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub analysis_type: String,
    pub data: serde_json::Value,
    pub prompt: Option<String>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Delivers `email`, returning a provider message id.
    async fn send(
        &self,
        email: &Email,
    ) -> Result<String>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers `notification`, returning its id.
    async fn notify(
        &self,
        notification: &Notification,
    ) -> Result<String>;
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Runs the analysis; the returned values become the action outputs.
    async fn analyze(
        &self,
        request: &AnalysisRequest,
    ) -> Result<Vars>;
}

/// Logs each email and keeps it as an `email` record.
pub(crate) struct StoreMailer {
    store: Arc<Store>,
}

impl StoreMailer {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
        }
    }
}

#[async_trait]
impl Mailer for StoreMailer {
    async fn send(
        &self,
        email: &Email,
    ) -> Result<String> {
        info!(to = %email.to, subject = %email.subject, "email queued");
        let data = Vars::from(serde_json::to_value(email)?).with("status", "logged");
        self.store.put_record("email", &email.execution_id, &email.workflow_id, data)
    }
}

/// Keeps each notification as a `notification` record.
pub(crate) struct StoreNotifier {
    store: Arc<Store>,
}

impl StoreNotifier {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
        }
    }
}

#[async_trait]
impl Notifier for StoreNotifier {
    async fn notify(
        &self,
        notification: &Notification,
    ) -> Result<String> {
        let data = Vars::from(serde_json::to_value(notification)?).with("read", false);
        self.store.put_record("notification", &notification.execution_id, &notification.workflow_id, data)
    }
}

/// Everything an action may reach while it runs.
pub(crate) struct Services {
    pub store: Arc<Store>,
    pub mailer: Arc<dyn Mailer>,
    pub notifier: Arc<dyn Notifier>,
    pub analyzer: Option<Arc<dyn Analyzer>>,
    pub http: reqwest::Client,
}

impl Services {
    /// Store-backed mailer and notifier, no analyzer.
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            mailer: Arc::new(StoreMailer::new(store.clone())),
            notifier: Arc::new(StoreNotifier::new(store.clone())),
            analyzer: None,
            http: reqwest::Client::new(),
            store,
        }
    }
}
