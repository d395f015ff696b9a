use std::{sync::Arc, time::Duration};

use tokio::runtime::{Builder, Runtime};

use crate::{
    AutoflowError, Config, Engine, Result, StoreType,
    services::{Analyzer, Mailer, Notifier, Services},
    store::{DbStore, MemStore, PostgresStore, Store},
};

/// Configures and builds an [`Engine`].
///
/// ```rust,ignore
/// let engine = EngineBuilder::new()
///     .config(Config::create("autoflow.toml")?)
///     .mailer(Arc::new(SmtpMailer::new(..)))
///     .build()?;
/// ```
#[derive(Default)]
pub struct EngineBuilder {
    config: Config,
    rt: Option<Arc<Runtime>>,
    store: Option<Arc<Store>>,

    mailer: Option<Arc<dyn Mailer>>,
    notifier: Option<Arc<dyn Notifier>>,
    analyzer: Option<Arc<dyn Analyzer>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every setting made so far by `config`.
    pub fn config(
        mut self,
        config: Config,
    ) -> Self {
        self.config = config;
        self
    }

    pub fn async_worker_thread_number(
        mut self,
        n: u16,
    ) -> Self {
        self.config.async_worker_thread_number = n;
        self
    }

    pub fn runtime(
        mut self,
        runtime: Arc<Runtime>,
    ) -> Self {
        self.rt = Some(runtime);
        self
    }

    /// Uses an already initialized store instead of the configured one.
    pub fn store(
        mut self,
        store: Arc<Store>,
    ) -> Self {
        self.store = Some(store);
        self
    }

    pub fn postgres(
        mut self,
        database_url: &str,
    ) -> Self {
        self.config.store.store_type = StoreType::Postgres;
        self.config.store.postgres = Some(crate::PostgresConfig {
            database_url: database_url.to_string(),
        });
        self
    }

    pub fn retry_backoff(
        mut self,
        base: Duration,
        max: Duration,
    ) -> Self {
        self.config.engine.retry_backoff_base_ms = base.as_millis() as u64;
        self.config.engine.retry_backoff_max_ms = max.as_millis() as u64;
        self
    }

    pub fn max_step_transitions(
        mut self,
        n: usize,
    ) -> Self {
        self.config.engine.max_step_transitions = n;
        self
    }

    pub fn max_running_executions(
        mut self,
        n: usize,
    ) -> Self {
        self.config.engine.max_running_executions = n;
        self
    }

    pub fn load_on_launch(
        mut self,
        load: bool,
    ) -> Self {
        self.config.engine.load_on_launch = load;
        self
    }

    pub fn mailer(
        mut self,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn notifier(
        mut self,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn analyzer(
        mut self,
        analyzer: Arc<dyn Analyzer>,
    ) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn build(self) -> Result<Engine> {
        let runtime = match self.rt {
            Some(rt) => rt,
            None => {
                if self.config.async_worker_thread_number == 0 {
                    return Err(AutoflowError::Config("async_worker_thread_number must be at least 1".to_string()));
                }
                Arc::new(Builder::new_multi_thread().worker_threads(self.config.async_worker_thread_number.into()).enable_all().build()?)
            }
        };

        let store = match self.store {
            Some(store) => store,
            None => {
                let store = Store::new();
                let db: Box<dyn DbStore> = match self.config.store.store_type {
                    StoreType::Mem => Box::new(MemStore::new()),
                    StoreType::Postgres => {
                        let postgres = self
                            .config
                            .store
                            .postgres
                            .as_ref()
                            .ok_or_else(|| AutoflowError::Config("[store.postgres] is required when store_type is postgres".to_string()))?;
                        Box::new(PostgresStore::new(&postgres.database_url, runtime.clone())?)
                    }
                };
                db.init(&store)?;
                Arc::new(store)
            }
        };

        let mut services = Services::new(store.clone());
        if let Some(mailer) = self.mailer {
            services.mailer = mailer;
        }
        if let Some(notifier) = self.notifier {
            services.notifier = notifier;
        }
        services.analyzer = self.analyzer;

        Ok(Engine::new(store, services, runtime, self.config.engine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_without_url_is_rejected() {
        let mut config = Config::default();
        config.store.store_type = StoreType::Postgres;
        let err = EngineBuilder::new().config(config).build().err().unwrap();
        assert!(matches!(err, AutoflowError::Config(_)));
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        assert!(EngineBuilder::new().async_worker_thread_number(0).build().is_err());
    }
}
