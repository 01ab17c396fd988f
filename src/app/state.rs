use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::adapter::sqlite::SqliteStore;
use crate::classifier::{Classifier, Rules};
use crate::config::Settings;
use crate::error::ScribeError;
use crate::governor::RateGovernor;
use crate::hub::EventHub;
use crate::metrics::MetricsCollector;
use crate::port::LogStore;
use crate::service::{LogService, RetentionManager, RetentionWorker};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub logs: LogService,
    pub retention: RetentionManager,
    pub store: Arc<dyn LogStore>,
    pub hub: Arc<EventHub>,
    pub governor: Arc<RateGovernor>,
    pub metrics: Arc<MetricsCollector>,
    pub settings: Arc<Settings>,
    background: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl AppState {
    /// Wires the services around `store` and spawns the background tasks
    /// (hub coordinator, token refill, optional retention worker). All of
    /// them stop when `shutdown_token` is cancelled.
    pub fn new(
        store: Arc<dyn LogStore>,
        settings: Settings,
        shutdown_token: CancellationToken,
    ) -> Result<Self, ScribeError> {
        let rules = Arc::new(Rules::builtin()?);
        let classifier = Classifier::new(rules);

        let (hub, hub_handle) =
            EventHub::spawn(settings.subscriber_capacity, shutdown_token.clone());
        let hub = Arc::new(hub);

        let governor = Arc::new(RateGovernor::new(settings.rate_limit, settings.rate_window()));
        let refill_handle = governor.spawn_refill(shutdown_token.clone());

        let logs = LogService::new(store.clone(), classifier, hub.clone());
        let retention = RetentionManager::new(store.clone(), hub.clone());

        let mut background = vec![hub_handle, refill_handle];
        if let Some(interval) = settings.retention_interval() {
            let worker =
                RetentionWorker::new(retention.clone(), i64::from(settings.retention_days), interval);
            background.push(worker.spawn(shutdown_token));
        }

        Ok(Self {
            logs,
            retention,
            store,
            hub,
            governor,
            metrics: Arc::new(MetricsCollector::new()),
            settings: Arc::new(settings),
            background: Arc::new(Mutex::new(background)),
        })
    }

    /// Opens the SQLite store named in `settings` and builds the state on it.
    pub async fn from_settings(
        settings: &Settings,
        shutdown_token: CancellationToken,
    ) -> Result<Self, ScribeError> {
        let store = SqliteStore::open(&settings.db_path, settings.read_pool_size).await?;
        info!(path = %settings.db_path.display(), "store opened");
        Self::new(Arc::new(store), settings.clone(), shutdown_token)
    }

    /// Waits for the background tasks. Only returns once the shutdown token
    /// they were spawned with has been cancelled.
    pub async fn join_background(&self) {
        let handles = std::mem::take(&mut *self.background.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                error!("background task failed: {e}");
            }
        }
    }
}
